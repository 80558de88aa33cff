//! Fixed windows and the time-bucketed storage keys derived from them.
//!
//! Buckets are aligned to the wall clock: bucket `n` of a window with duration
//! `d` covers `[n * d, (n + 1) * d)` seconds since the Unix epoch. Two processes
//! reading the same time therefore compute the same key for the same caller,
//! which is what lets them share one counter store.

use crate::error::ConfigError;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Extra lifetime given to stored counters beyond the window duration so a
/// counter outlives its bucket even when process clocks disagree slightly.
pub const CLOCK_SKEW_SLACK: Duration = Duration::from_secs(5);

/// A named fixed window with its base (normal-tier) limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    name: Arc<str>,
    duration_secs: u64,
    base_limit: u64,
}

impl WindowSpec {
    /// Create a validated window.
    ///
    /// # Errors
    /// Rejects empty names or names containing `:`, durations under one second or
    /// with a fractional part, and a zero `base_limit`.
    pub fn new(
        name: impl Into<String>,
        duration: Duration,
        base_limit: u64,
    ) -> Result<Self, ConfigError> {
        let name: String = name.into();
        if name.is_empty() || name.contains(':') {
            return Err(ConfigError::InvalidWindowName(name));
        }
        if duration.as_secs() == 0 {
            return Err(ConfigError::NonPositiveDuration { window: name, duration });
        }
        if duration.subsec_nanos() != 0 {
            return Err(ConfigError::FractionalDuration { window: name, duration });
        }
        if base_limit == 0 {
            return Err(ConfigError::NonPositiveLimit { window: name });
        }
        Ok(Self { name: name.into(), duration_secs: duration.as_secs(), base_limit })
    }

    /// `minute` window: 60 seconds.
    pub fn minute(base_limit: u64) -> Result<Self, ConfigError> {
        Self::new("minute", Duration::from_secs(60), base_limit)
    }

    /// `hour` window: 3600 seconds.
    pub fn hour(base_limit: u64) -> Result<Self, ConfigError> {
        Self::new("hour", Duration::from_secs(3_600), base_limit)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn base_limit(&self) -> u64 {
        self.base_limit
    }

    /// `floor(now / duration)`.
    pub fn bucket_id(&self, now_secs: u64) -> u64 {
        now_secs / self.duration_secs
    }

    /// First second of the bucket containing `now_secs`.
    pub fn bucket_start(&self, now_secs: u64) -> u64 {
        self.bucket_id(now_secs) * self.duration_secs
    }

    /// Epoch second at which the next bucket begins.
    pub fn reset_at(&self, now_secs: u64) -> u64 {
        self.bucket_start(now_secs).saturating_add(self.duration_secs)
    }

    /// Lifetime of a freshly created counter for this window.
    pub fn counter_ttl(&self) -> Duration {
        self.duration() + CLOCK_SKEW_SLACK
    }
}

/// Storage key of one caller's counter in one bucket of one window.
///
/// Renders as `<prefix>:<identity>:<window>:<bucket>`. Window names and the
/// prefix never contain `:` and the bucket is numeric, so splitting from the
/// right recovers every component: distinct triples never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    prefix: Arc<str>,
    identity: String,
    window: Arc<str>,
    bucket: u64,
}

impl CounterKey {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn window(&self) -> &str {
        &self.window
    }

    pub fn bucket(&self) -> u64 {
        self.bucket
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.prefix, self.identity, self.window, self.bucket)
    }
}

/// Key scheme: `(identity, window, now) -> key`. Pure; depends only on its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: Arc<str>,
}

impl KeyScheme {
    /// Caller must ensure the prefix is non-empty and free of `:`; `LimiterConfig` validates this.
    pub(crate) fn new(prefix: &str) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn key(&self, identity: &str, window: &WindowSpec, now: SystemTime) -> CounterKey {
        self.key_at(identity, window, crate::clock::unix_secs(now))
    }

    pub fn key_at(&self, identity: &str, window: &WindowSpec, now_secs: u64) -> CounterKey {
        CounterKey {
            prefix: self.prefix.clone(),
            identity: identity.to_owned(),
            window: window.name.clone(),
            bucket: window.bucket_id(now_secs),
        }
    }
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_KEY_PREFIX)
    }
}
