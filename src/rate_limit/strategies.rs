use crate::clock::{unix_millis, unix_secs};
use crate::config::LimiterConfig;
use crate::deadline::StoreDeadline;
use crate::error::{ConfigError, QuotaError};
use crate::fallback::{DegradedFallback, StoreState, Transition};
use crate::rate_limit::store::CounterStore;
use crate::rate_limit::{CountSource, Decision, WindowOutcome};
use crate::telemetry::{emit_best_effort, DecisionEvent, LimitEvent, NullSink, StoreEvent, TelemetrySink};
use crate::tier::{Tier, TierPolicy};
use crate::window::{KeyScheme, WindowSpec};
use futures::future::join_all;
use std::sync::Arc;
use std::time::SystemTime;

/// Fixed-window quota evaluator.
///
/// Every request increments every configured window, whatever the other
/// windows decide, and a denied request keeps the unit it consumed. Store
/// failures are absorbed per window by the degraded-mode fallback.
pub struct QuotaEvaluator<S, K = NullSink> {
    store: Arc<S>,
    windows: Arc<[WindowSpec]>,
    tiers: TierPolicy,
    keys: KeyScheme,
    deadline: StoreDeadline,
    fallback: Arc<DegradedFallback>,
    sink: K,
}

impl<S> QuotaEvaluator<S, NullSink>
where
    S: CounterStore + 'static,
{
    /// Evaluator over `windows` with every other setting at its default.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for an empty or duplicated window list.
    pub fn new(store: S, windows: Vec<WindowSpec>) -> Result<Self, ConfigError> {
        let config = windows
            .into_iter()
            .fold(LimiterConfig::builder(), |builder, window| builder.window(window))
            .build()?;
        Ok(Self::from_config(store, &config))
    }

    pub fn from_config(store: S, config: &LimiterConfig) -> Self {
        Self {
            store: Arc::new(store),
            windows: config.windows().into(),
            tiers: TierPolicy::new(config.privileged_multiplier()),
            keys: KeyScheme::new(config.key_prefix()),
            deadline: StoreDeadline::new(config.store_timeout()),
            fallback: Arc::new(DegradedFallback::new()),
            sink: NullSink,
        }
    }
}

impl<S, K> QuotaEvaluator<S, K>
where
    S: CounterStore + 'static,
    K: TelemetrySink + Sync,
    K::Future: Send + 'static,
{
    /// Replace the telemetry sink.
    pub fn with_sink<K2>(self, sink: K2) -> QuotaEvaluator<S, K2>
    where
        K2: TelemetrySink + Sync,
        K2::Future: Send + 'static,
    {
        QuotaEvaluator {
            store: self.store,
            windows: self.windows,
            tiers: self.tiers,
            keys: self.keys,
            deadline: self.deadline,
            fallback: self.fallback,
            sink,
        }
    }

    /// Sweep expired degraded-mode counters every `ops` local increments.
    pub fn with_sweep_interval(mut self, ops: u64) -> Self {
        self.fallback = Arc::new(DegradedFallback::with_sweep_interval(ops));
        self
    }

    pub fn windows(&self) -> &[WindowSpec] {
        &self.windows
    }

    pub fn tiers(&self) -> TierPolicy {
        self.tiers
    }

    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn fallback(&self) -> &DegradedFallback {
        &self.fallback
    }

    pub fn store_state(&self) -> StoreState {
        self.fallback.state()
    }

    /// Count one request for `identity` at `now` against every window.
    ///
    /// # Errors
    /// [`QuotaError::IdentityMissing`] for an empty identity. Nothing is
    /// counted in that case.
    pub async fn evaluate(
        &self,
        identity: &str,
        is_privileged: bool,
        now: SystemTime,
    ) -> Result<Decision, QuotaError> {
        if identity.is_empty() {
            return Err(QuotaError::IdentityMissing);
        }
        let tier = Tier::from_privileged(is_privileged);
        let now_secs = unix_secs(now);
        let now_millis = unix_millis(now);

        let counted = join_all(
            self.windows
                .iter()
                .map(|window| self.count_window(identity, tier, window, now_secs, now_millis)),
        )
        .await;

        // One transition per request: any failed window keeps the store degraded.
        let failure = counted.iter().find_map(|(_, failure)| *failure);
        let (outcomes, _): (Vec<_>, Vec<_>) = counted.into_iter().unzip();
        self.record_store_health(failure, now_millis).await;

        let decision = Decision::from_outcomes(tier, outcomes, now_secs);

        tracing::debug!(
            identity,
            tier = %tier,
            allowed = decision.allowed,
            window = %decision.window,
            limit = decision.limit,
            remaining = decision.remaining,
            "quota decision"
        );
        let event = if decision.allowed {
            DecisionEvent::Allowed {
                identity: identity.to_owned(),
                tier,
                window: decision.window.clone(),
                limit: decision.limit,
                remaining: decision.remaining,
            }
        } else {
            DecisionEvent::Denied {
                identity: identity.to_owned(),
                tier,
                window: decision.window.clone(),
                limit: decision.limit,
                retry_after_secs: decision.retry_after.unwrap_or(1),
            }
        };
        self.emit(LimitEvent::Decision(event)).await;

        Ok(decision)
    }

    async fn record_store_health(&self, failure: Option<&'static str>, now_millis: u64) {
        let transition = match failure {
            Some(reason) => self.fallback.on_store_failure(now_millis, reason),
            None => self.fallback.on_store_success(),
        };
        match transition {
            Some(Transition::EnteredDegraded) => self.emit(LimitEvent::Store(StoreEvent::Degraded)).await,
            Some(Transition::Recovered) => self.emit(LimitEvent::Store(StoreEvent::Recovered)).await,
            None => {}
        }
    }

    /// Count one window. The second value is the failure kind when the
    /// store could not be used.
    async fn count_window(
        &self,
        identity: &str,
        tier: Tier,
        window: &WindowSpec,
        now_secs: u64,
        now_millis: u64,
    ) -> (WindowOutcome, Option<&'static str>) {
        let key = self.keys.key_at(identity, window, now_secs).to_string();
        let ttl = window.counter_ttl();

        let (count, source, failure) =
            match self.deadline.run(self.store.increment_with_expiry(&key, ttl)).await {
                Ok(count) => (count, CountSource::Store, None),
                Err(err) => {
                    tracing::debug!(key = %key, error = %err, "store increment failed, counting locally");
                    self.emit(LimitEvent::Store(StoreEvent::Unavailable {
                        window: window.name().to_owned(),
                        reason: err.kind(),
                    }))
                    .await;
                    let count = self.fallback.increment(&key, ttl, now_millis);
                    (count, CountSource::Local, Some(err.kind()))
                }
            };

        let outcome = WindowOutcome {
            window: window.name().to_owned(),
            duration_secs: window.duration_secs(),
            limit: self.tiers.effective_limit(window.base_limit(), tier),
            count,
            reset_at: window.reset_at(now_secs),
            source,
        };
        (outcome, failure)
    }

    async fn emit(&self, event: LimitEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}

impl<S, K: std::fmt::Debug> std::fmt::Debug for QuotaEvaluator<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaEvaluator")
            .field("windows", &self.windows)
            .field("tiers", &self.tiers)
            .field("keys", &self.keys)
            .field("deadline", &self.deadline)
            .field("state", &self.fallback.state())
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}
