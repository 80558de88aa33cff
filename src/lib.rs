#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # tierguard
//!
//! Multi-tier fixed-window rate limiting for HTTP APIs.
//!
//! ## Features
//!
//! - **Fixed windows** (per-minute and per-hour by default) counted together on every request
//! - **Tiers**: privileged callers get a multiplied limit (5x by default)
//! - **Atomic counting** through a single increment-with-expiry store call per window
//! - **Standard headers**: `X-RateLimit-Limit`, `X-RateLimit-Remaining`,
//!   `X-RateLimit-Reset` and `Retry-After`
//! - **Degraded mode**: per-process counting while the shared store is unreachable
//! - **Tower middleware** over `http` requests and responses
//!
//! ## Quick Start
//!
//! ```rust
//! use tierguard::{InMemoryCounterStore, LimiterConfig, RateLimiter, TieredRateLimiter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LimiterConfig::default();
//!     let limiter = TieredRateLimiter::new(InMemoryCounterStore::new(), &config);
//!
//!     let (decision, headers) = limiter.check_and_consume("user-42", false).await.unwrap();
//!     assert!(decision.is_allowed());
//!     for (name, value) in headers.pairs() {
//!         println!("{name}: {value}");
//!     }
//! }
//! ```
//!
//! Production deployments share counters through Redis with the
//! `tierguard-redis` crate.

pub mod clock;
pub mod config;
pub mod deadline;
pub mod error;
pub mod fallback;
pub mod prelude;
pub mod rate_limit;
pub mod telemetry;
pub mod tier;
pub mod window;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LimiterConfig, LimiterConfigBuilder};
pub use deadline::StoreDeadline;
pub use error::{ConfigError, LimitError, QuotaError, StoreUnavailable};
pub use fallback::{DegradedFallback, StoreState};
pub use rate_limit::{
    Caller, CountSource, CounterStore, Decision, InMemoryCounterStore, QuotaEvaluator,
    RateLimitHeaders, RateLimitLayer, RateLimitService, RateLimiter, TieredRateLimiter,
    WindowOutcome,
};
pub use tier::{Tier, TierPolicy};
pub use window::{CounterKey, KeyScheme, WindowSpec};

#[cfg(feature = "serde")]
pub use config::{LimiterSettings, WindowSettings};
