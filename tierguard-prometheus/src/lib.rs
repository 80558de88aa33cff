//! Prometheus metrics sink for `tierguard`.
//! Bring your own `prometheus::Registry`; metrics are registered and updated.
//!
//! Identities are never used as labels: decisions are counted per tier and
//! window only, so cardinality stays bounded by configuration.

use prometheus::{IntCounterVec, IntGauge, Registry};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use tierguard::telemetry::{DecisionEvent, LimitEvent, StoreEvent, TelemetrySink};

#[derive(Clone, Debug)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    events: IntCounterVec,
    degraded: IntGauge,
}

impl PrometheusSink {
    /// Create a sink and register its metrics into the provided registry.
    ///
    /// Registers `tierguard_events_total{event, tier, window}` and the
    /// `tierguard_store_degraded` gauge (1 while counting locally).
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let events = IntCounterVec::new(
            prometheus::Opts::new("tierguard_events_total", "Rate limiter events"),
            &["event", "tier", "window"],
        )?;
        let degraded = IntGauge::new(
            "tierguard_store_degraded",
            "1 while the shared counter store is unreachable",
        )?;
        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(degraded.clone()))?;
        Ok(Self { registry, events, degraded })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl tower_service::Service<LimitEvent> for PrometheusSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: LimitEvent) -> Self::Future {
        let (tier, window) = match &event {
            LimitEvent::Decision(
                DecisionEvent::Allowed { tier, window, .. }
                | DecisionEvent::Denied { tier, window, .. },
            ) => (tier.as_str(), window.as_str()),
            LimitEvent::Store(StoreEvent::Unavailable { window, .. }) => ("", window.as_str()),
            LimitEvent::Store(StoreEvent::Degraded) => {
                self.degraded.set(1);
                ("", "")
            }
            LimitEvent::Store(StoreEvent::Recovered) => {
                self.degraded.set(0);
                ("", "")
            }
        };
        self.events.with_label_values(&[event.kind(), tier, window]).inc();
        tracing::trace!(event = event.kind(), "recorded limiter metric");
        ready(Ok(()))
    }
}

impl TelemetrySink for PrometheusSink {
    type SinkError = Infallible;
}
