//! Error types for the limiter, its configuration, and its counter stores.
use std::fmt;
use std::time::Duration;

/// Rejected configuration. Only produced while building a limiter, never on a request path.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window `{window}` must have a limit > 0")]
    NonPositiveLimit { window: String },
    #[error("window `{window}` must have a duration of at least one second (got {duration:?})")]
    NonPositiveDuration { window: String, duration: Duration },
    #[error("window `{window}` duration must be a whole number of seconds (got {duration:?})")]
    FractionalDuration { window: String, duration: Duration },
    #[error("window name `{0}` must be non-empty and must not contain ':'")]
    InvalidWindowName(String),
    #[error("window `{0}` is configured more than once")]
    DuplicateWindow(String),
    #[error("at least one window must be configured")]
    NoWindows,
    #[error("privileged multiplier must be > 0 (got {0})")]
    InvalidMultiplier(u32),
    #[error("store timeout must be > 0")]
    InvalidStoreTimeout,
    #[error("key prefix `{0}` must be non-empty and must not contain ':'")]
    InvalidKeyPrefix(String),
    #[error("environment variable {var}={value:?} is not valid: {reason}")]
    InvalidEnv { var: &'static str, value: String, reason: String },
}

/// The shared counter store could not produce a count.
///
/// Never surfaced to callers of the limiter: the evaluator absorbs it by
/// switching the affected window to in-process counting.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreUnavailable {
    /// The local call deadline elapsed.
    #[error("store call exceeded its {0:?} deadline")]
    Timeout(Duration),
    /// The store client reported a timeout of its own.
    #[error("store call timed out: {0}")]
    TimedOut(String),
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store returned an unusable reply: {0}")]
    Protocol(String),
}

impl StoreUnavailable {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) | Self::TimedOut(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// Request-path error of the quota evaluator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuotaError {
    /// The authentication layer did not supply a caller identity.
    #[error("caller identity missing")]
    IdentityMissing,
}

/// Error type of [`RateLimitService`](crate::rate_limit::RateLimitService).
#[derive(Debug, Clone)]
pub enum LimitError<E> {
    /// No caller identity on the request; the HTTP layer should answer 401.
    IdentityMissing,
    /// The wrapped service failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for LimitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityMissing => write!(f, "rate limiting requires a caller identity"),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for LimitError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::IdentityMissing => None,
        }
    }
}

impl<E> From<QuotaError> for LimitError<E> {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::IdentityMissing => Self::IdentityMissing,
        }
    }
}

impl<E> LimitError<E> {
    /// Check if the request was missing a caller identity.
    pub fn is_identity_missing(&self) -> bool {
        matches!(self, Self::IdentityMissing)
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::IdentityMissing => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::IdentityMissing => None,
        }
    }
}
