//! Convenient re-exports for common tierguard types.
pub use crate::{
    config::LimiterConfig,
    error::{ConfigError, LimitError, QuotaError, StoreUnavailable},
    rate_limit::{
        Caller, CounterStore, Decision, RateLimitHeaders, RateLimitLayer, RateLimiter,
        TieredRateLimiter,
    },
    telemetry::{LimitEvent, LogSink, MemorySink, NullSink, TelemetrySink},
    tier::Tier,
    window::WindowSpec,
};
