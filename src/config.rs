//! Limiter configuration, read once at process start.
//!
//! ```rust
//! use tierguard::config::LimiterConfig;
//! use tierguard::window::WindowSpec;
//! use std::time::Duration;
//!
//! let config = LimiterConfig::builder()
//!     .window(WindowSpec::minute(60).unwrap())
//!     .window(WindowSpec::hour(1_000).unwrap())
//!     .privileged_multiplier(5)
//!     .store_timeout(Duration::from_millis(25))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.windows().len(), 2);
//! ```

use crate::deadline::DEFAULT_STORE_TIMEOUT;
use crate::error::ConfigError;
use crate::tier::DEFAULT_PRIVILEGED_MULTIPLIER;
use crate::window::WindowSpec;
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_KEY_PREFIX: &str = "rate_limit";
pub const DEFAULT_PER_MINUTE: u64 = 60;
pub const DEFAULT_PER_HOUR: u64 = 1_000;
/// Paths that bypass rate limiting entirely.
pub const DEFAULT_EXEMPT_PATHS: [&str; 4] = ["/health", "/docs", "/openapi.json", "/redoc"];

pub const ENV_ENABLED: &str = "RATE_LIMIT_ENABLED";
pub const ENV_PER_MINUTE: &str = "RATE_LIMIT_PER_MINUTE";
pub const ENV_PER_HOUR: &str = "RATE_LIMIT_PER_HOUR";
pub const ENV_ADMIN_MULTIPLIER: &str = "RATE_LIMIT_ADMIN_MULTIPLIER";
pub const ENV_KEY_PREFIX: &str = "RATE_LIMIT_KEY_PREFIX";
pub const ENV_STORE_TIMEOUT_MS: &str = "RATE_LIMIT_STORE_TIMEOUT_MS";

/// Validated limiter configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    enabled: bool,
    windows: Vec<WindowSpec>,
    privileged_multiplier: u32,
    key_prefix: String,
    store_timeout: Duration,
    exempt_paths: Vec<String>,
}

impl LimiterConfig {
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::new()
    }

    /// Read the `RATE_LIMIT_*` environment variables, defaulting any that are unset.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values and any
    /// validation error for parsable but invalid ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok()).map_err(|e| {
            tracing::error!(error = %e, "invalid rate limit configuration");
            e
        })
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let per_minute = parse_var(&lookup, ENV_PER_MINUTE, DEFAULT_PER_MINUTE)?;
        let per_hour = parse_var(&lookup, ENV_PER_HOUR, DEFAULT_PER_HOUR)?;
        let multiplier =
            parse_var(&lookup, ENV_ADMIN_MULTIPLIER, DEFAULT_PRIVILEGED_MULTIPLIER)?;
        let timeout_ms = parse_var(
            &lookup,
            ENV_STORE_TIMEOUT_MS,
            u64::try_from(DEFAULT_STORE_TIMEOUT.as_millis()).unwrap_or(25),
        )?;
        let enabled = match lookup(ENV_ENABLED) {
            None => true,
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidEnv {
                var: ENV_ENABLED,
                value: raw.clone(),
                reason: "expected true/false".into(),
            })?,
        };

        let mut builder = Self::builder()
            .enabled(enabled)
            .window(WindowSpec::minute(per_minute)?)
            .window(WindowSpec::hour(per_hour)?)
            .privileged_multiplier(multiplier)
            .store_timeout(Duration::from_millis(timeout_ms));
        if let Some(prefix) = lookup(ENV_KEY_PREFIX) {
            builder = builder.key_prefix(prefix);
        }
        builder.build()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn windows(&self) -> &[WindowSpec] {
        &self.windows
    }

    pub fn privileged_multiplier(&self) -> u32 {
        self.privileged_multiplier
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub fn exempt_paths(&self) -> &[String] {
        &self.exempt_paths
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        path_is_exempt(&self.exempt_paths, path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.windows.is_empty() {
            return Err(ConfigError::NoWindows);
        }
        let mut seen = HashSet::new();
        for window in &self.windows {
            if !seen.insert(window.name()) {
                return Err(ConfigError::DuplicateWindow(window.name().to_owned()));
            }
        }
        if self.privileged_multiplier == 0 {
            return Err(ConfigError::InvalidMultiplier(0));
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::InvalidStoreTimeout);
        }
        if self.key_prefix.is_empty() || self.key_prefix.contains(':') {
            return Err(ConfigError::InvalidKeyPrefix(self.key_prefix.clone()));
        }
        Ok(())
    }
}

impl Default for LimiterConfig {
    /// `minute`/60 and `hour`/1000, 5x for privileged callers.
    fn default() -> Self {
        Self {
            enabled: true,
            windows: default_windows(),
            privileged_multiplier: DEFAULT_PRIVILEGED_MULTIPLIER,
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(|p| (*p).to_owned()).collect(),
        }
    }
}

fn default_windows() -> Vec<WindowSpec> {
    // Both constants are non-zero, so construction cannot fail.
    [WindowSpec::minute(DEFAULT_PER_MINUTE), WindowSpec::hour(DEFAULT_PER_HOUR)]
        .into_iter()
        .flatten()
        .collect()
}

/// Builder for [`LimiterConfig`]. Windows added here replace the defaults.
#[derive(Debug, Clone)]
pub struct LimiterConfigBuilder {
    config: LimiterConfig,
    custom_windows: bool,
}

impl LimiterConfigBuilder {
    /// Create a builder seeded with the defaults.
    pub fn new() -> Self {
        Self { config: LimiterConfig::default(), custom_windows: false }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Add a window. The first call discards the default windows.
    pub fn window(mut self, window: WindowSpec) -> Self {
        if !self.custom_windows {
            self.config.windows.clear();
            self.custom_windows = true;
        }
        self.config.windows.push(window);
        self
    }

    pub fn privileged_multiplier(mut self, multiplier: u32) -> Self {
        self.config.privileged_multiplier = multiplier;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout = timeout;
        self
    }

    pub fn exempt_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.config.exempt_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn build(self) -> Result<LimiterConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for LimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Plain-value settings as they appear in a config file.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub enabled: bool,
    pub windows: Vec<WindowSettings>,
    pub privileged_multiplier: u32,
    pub key_prefix: String,
    pub store_timeout_ms: u64,
    pub exempt_paths: Vec<String>,
}

#[cfg(feature = "serde")]
#[derive(Debug, Clone, serde::Deserialize)]
pub struct WindowSettings {
    pub name: String,
    pub duration_secs: u64,
    pub base_limit: u64,
}

#[cfg(feature = "serde")]
impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            windows: vec![
                WindowSettings {
                    name: "minute".into(),
                    duration_secs: 60,
                    base_limit: DEFAULT_PER_MINUTE,
                },
                WindowSettings {
                    name: "hour".into(),
                    duration_secs: 3_600,
                    base_limit: DEFAULT_PER_HOUR,
                },
            ],
            privileged_multiplier: DEFAULT_PRIVILEGED_MULTIPLIER,
            key_prefix: DEFAULT_KEY_PREFIX.into(),
            store_timeout_ms: 25,
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(|p| (*p).to_owned()).collect(),
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<LimiterSettings> for LimiterConfig {
    type Error = ConfigError;

    fn try_from(settings: LimiterSettings) -> Result<Self, Self::Error> {
        let windows = settings
            .windows
            .into_iter()
            .map(|w| WindowSpec::new(w.name, Duration::from_secs(w.duration_secs), w.base_limit))
            .collect::<Result<Vec<_>, _>>()?;
        let config = LimiterConfig {
            enabled: settings.enabled,
            windows,
            privileged_multiplier: settings.privileged_multiplier,
            key_prefix: settings.key_prefix,
            store_timeout: Duration::from_millis(settings.store_timeout_ms),
            exempt_paths: settings.exempt_paths,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Exact-match lookup shared by the config and the middleware.
pub(crate) fn path_is_exempt(exempt_paths: &[String], path: &str) -> bool {
    exempt_paths.iter().any(|p| p == path)
}
