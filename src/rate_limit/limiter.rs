use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::QuotaError;
use crate::rate_limit::store::CounterStore;
use crate::rate_limit::{Decision, QuotaEvaluator, RateLimitHeaders, RateLimiter};
use crate::telemetry::{NullSink, TelemetrySink};
use async_trait::async_trait;
use std::sync::Arc;

/// [`RateLimiter`] that evaluates every configured window at the clock's current time.
///
/// ```rust
/// use tierguard::config::LimiterConfig;
/// use tierguard::rate_limit::{InMemoryCounterStore, RateLimiter, TieredRateLimiter};
///
/// # async fn run() {
/// let limiter = TieredRateLimiter::new(InMemoryCounterStore::new(), &LimiterConfig::default());
/// let (decision, headers) = limiter.check_and_consume("user-1", false).await.unwrap();
/// assert!(decision.is_allowed());
/// assert_eq!(headers.limit, 60);
/// assert_eq!(headers.remaining, 59);
/// # }
/// ```
#[derive(Debug)]
pub struct TieredRateLimiter<S, K = NullSink> {
    evaluator: QuotaEvaluator<S, K>,
    clock: Arc<dyn Clock>,
}

impl<S> TieredRateLimiter<S, NullSink>
where
    S: CounterStore + 'static,
{
    pub fn new(store: S, config: &LimiterConfig) -> Self {
        Self::from_evaluator(QuotaEvaluator::from_config(store, config))
    }
}

impl<S, K> TieredRateLimiter<S, K>
where
    S: CounterStore + 'static,
    K: TelemetrySink + Sync,
    K::Future: Send + 'static,
{
    pub fn from_evaluator(evaluator: QuotaEvaluator<S, K>) -> Self {
        Self { evaluator, clock: Arc::new(SystemClock) }
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replace the telemetry sink.
    pub fn with_sink<K2>(self, sink: K2) -> TieredRateLimiter<S, K2>
    where
        K2: TelemetrySink + Sync,
        K2::Future: Send + 'static,
    {
        TieredRateLimiter { evaluator: self.evaluator.with_sink(sink), clock: self.clock }
    }

    pub fn evaluator(&self) -> &QuotaEvaluator<S, K> {
        &self.evaluator
    }
}

#[async_trait]
impl<S, K> RateLimiter for TieredRateLimiter<S, K>
where
    S: CounterStore + 'static,
    K: TelemetrySink + Sync,
    K::Future: Send + 'static,
{
    async fn check_and_consume(
        &self,
        identity: &str,
        is_privileged: bool,
    ) -> Result<(Decision, RateLimitHeaders), QuotaError> {
        let decision = self.evaluator.evaluate(identity, is_privileged, self.clock.now()).await?;
        let headers = RateLimitHeaders::from_decision(&decision);
        Ok((decision, headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::InMemoryCounterStore;
    use std::time::Duration;

    #[tokio::test]
    async fn headers_follow_the_clock() {
        let clock = ManualClock::at_secs(1_700_000_000);
        let limiter = TieredRateLimiter::new(InMemoryCounterStore::new(), &LimiterConfig::default())
            .with_clock(clock.clone());

        let (_, headers) = limiter.check_and_consume("u", false).await.unwrap();
        assert_eq!(headers.reset, 1_700_000_040);

        clock.advance(Duration::from_secs(40));
        let (decision, headers) = limiter.check_and_consume("u", false).await.unwrap();
        assert_eq!(headers.reset, 1_700_000_100);
        assert_eq!(headers.remaining, 59);
        assert_eq!(decision.window("hour").map(|w| w.count), Some(2));
    }

    #[tokio::test]
    async fn missing_identity_propagates() {
        let limiter = TieredRateLimiter::new(InMemoryCounterStore::new(), &LimiterConfig::default());
        let err = limiter.check_and_consume("", true).await.unwrap_err();
        assert_eq!(err, QuotaError::IdentityMissing);
    }
}
