//! Rate limiting primitives.
//!
//! This module provides the building blocks for multi-window rate limiting:
//! - [`RateLimiter`]: The per-request entry point (`check_and_consume`).
//! - [`QuotaEvaluator`]: Counts a request against every window and decides.
//! - [`RateLimitHeaders`]: The `X-RateLimit-*` / `Retry-After` contract.
//! - [`RateLimitLayer`]: Tower middleware that enforces the limit over HTTP.
//!
//! # Architecture
//!
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how*
//!   limiting works, only that it should ask a `RateLimiter`.
//! - **Logic**: `QuotaEvaluator` (in `strategies`) handles fixed-window math,
//!   tier multipliers and degraded-mode fallback.
//! - **Storage**: `CounterStore` (in `store`) is a single atomic
//!   increment-with-expiry, enabling in-memory or distributed backends
//!   (see the `tierguard-redis` crate).

use crate::error::QuotaError;
use crate::tier::Tier;

pub mod headers;
pub mod limiter;
pub mod middleware;
pub mod store;
pub mod strategies;

pub use headers::RateLimitHeaders;
pub use limiter::TieredRateLimiter;
pub use middleware::{Caller, RateLimitLayer, RateLimitService};
pub use store::{CounterStore, InMemoryCounterStore};
pub use strategies::QuotaEvaluator;

/// Where a window's count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    /// The shared counter store.
    Store,
    /// The in-process degraded-mode counters.
    Local,
}

/// Post-increment state of one window for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOutcome {
    pub window: String,
    pub duration_secs: u64,
    /// Tier-adjusted limit.
    pub limit: u64,
    /// Count including this request.
    pub count: u64,
    /// Epoch seconds at which the window's next bucket begins.
    pub reset_at: u64,
    pub source: CountSource,
}

impl WindowOutcome {
    /// `max(0, limit - count)`.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    pub fn is_violated(&self) -> bool {
        self.count > self.limit
    }

    fn margin(&self) -> i128 {
        i128::from(self.limit) - i128::from(self.count)
    }
}

/// Aggregate verdict for one request.
///
/// `limit`, `remaining` and `reset_at` describe the most restrictive window:
/// the one with the smallest `limit - count`, ties going to the earliest reset
/// and then to the shorter window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub tier: Tier,
    /// Name of the most restrictive window.
    pub window: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
    /// Whole seconds until `reset_at`, at least 1. Set only on denial.
    pub retry_after: Option<u64>,
    /// Every window, in configuration order.
    pub windows: Vec<WindowOutcome>,
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Aggregate per-window outcomes observed at `now_secs`.
    pub fn from_outcomes(tier: Tier, windows: Vec<WindowOutcome>, now_secs: u64) -> Self {
        let allowed = !windows.iter().any(WindowOutcome::is_violated);
        let tightest = windows
            .iter()
            .min_by(|a, b| {
                a.margin()
                    .cmp(&b.margin())
                    .then(a.reset_at.cmp(&b.reset_at))
                    .then(a.duration_secs.cmp(&b.duration_secs))
            })
            .cloned();

        let (window, limit, remaining, reset_at) = match tightest {
            Some(w) => {
                let remaining = w.remaining();
                (w.window, w.limit, remaining, w.reset_at)
            }
            None => (String::new(), 0, 0, now_secs),
        };
        let retry_after = (!allowed).then(|| reset_at.saturating_sub(now_secs).max(1));

        Self { allowed, tier, window, limit, remaining, reset_at, retry_after, windows }
    }

    /// Outcome for the window named `name`.
    pub fn window(&self, name: &str) -> Option<&WindowOutcome> {
        self.windows.iter().find(|w| w.window == name)
    }

    /// True when any window was counted in-process because the store failed.
    pub fn is_degraded(&self) -> bool {
        self.windows.iter().any(|w| w.source == CountSource::Local)
    }
}

/// Core interface for rate limiting logic.
///
/// Decouples the middleware (and any other caller) from the counting strategy
/// and storage.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `identity` and decide whether it may proceed.
    ///
    /// # Errors
    /// Only [`QuotaError::IdentityMissing`]; store failures degrade to local
    /// counting and still yield a decision.
    async fn check_and_consume(
        &self,
        identity: &str,
        is_privileged: bool,
    ) -> Result<(Decision, RateLimitHeaders), QuotaError>;
}

#[async_trait::async_trait]
impl<L: RateLimiter + ?Sized> RateLimiter for std::sync::Arc<L> {
    async fn check_and_consume(
        &self,
        identity: &str,
        is_privileged: bool,
    ) -> Result<(Decision, RateLimitHeaders), QuotaError> {
        (**self).check_and_consume(identity, is_privileged).await
    }
}
