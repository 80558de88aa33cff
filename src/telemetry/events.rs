use crate::tier::Tier;
use std::fmt;

/// Events emitted by the limiter.
///
/// Decision events are emitted once per evaluated request; store events
/// describe the shared counter store as seen by this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitEvent {
    /// Per-request verdict
    Decision(DecisionEvent),
    /// Counter store health
    Store(StoreEvent),
}

/// Verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionEvent {
    /// Every window stayed within its effective limit.
    Allowed {
        identity: String,
        tier: Tier,
        /// Window reported in the response headers (most restrictive)
        window: String,
        limit: u64,
        remaining: u64,
    },
    /// At least one window exceeded its effective limit.
    Denied {
        identity: String,
        tier: Tier,
        /// Window that decided `Retry-After`
        window: String,
        limit: u64,
        retry_after_secs: u64,
    },
}

/// Counter store health as observed on the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A store call failed; the window was counted locally instead.
    Unavailable {
        window: String,
        /// `timeout`, `connection` or `protocol`
        reason: &'static str,
    },
    /// Transitioned to degraded mode (first failure after a healthy period).
    Degraded,
    /// Transitioned back to store-backed counting.
    Recovered,
}

impl LimitEvent {
    /// Stable snake_case name, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            LimitEvent::Decision(DecisionEvent::Allowed { .. }) => "allowed",
            LimitEvent::Decision(DecisionEvent::Denied { .. }) => "denied",
            LimitEvent::Store(StoreEvent::Unavailable { .. }) => "store_unavailable",
            LimitEvent::Store(StoreEvent::Degraded) => "store_degraded",
            LimitEvent::Store(StoreEvent::Recovered) => "store_recovered",
        }
    }
}

impl fmt::Display for LimitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitEvent::Decision(event) => write!(f, "Decision::{}", event),
            LimitEvent::Store(event) => write!(f, "Store::{}", event),
        }
    }
}

impl fmt::Display for DecisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionEvent::Allowed { identity, tier, window, limit, remaining } => write!(
                f,
                "Allowed({}/{}, {} {}/{} remaining)",
                identity, tier, window, remaining, limit
            ),
            DecisionEvent::Denied { identity, tier, window, limit, retry_after_secs } => write!(
                f,
                "Denied({}/{}, {} limit={}, retry_after={}s)",
                identity, tier, window, limit, retry_after_secs
            ),
        }
    }
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreEvent::Unavailable { window, reason } => {
                write!(f, "Unavailable(window={}, reason={})", window, reason)
            }
            StoreEvent::Degraded => write!(f, "Degraded"),
            StoreEvent::Recovered => write!(f, "Recovered"),
        }
    }
}
