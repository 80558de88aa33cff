//! Degraded-mode fallback used while the shared counter store is unreachable.
//!
//! Two states: `Normal` (store reachable) and `Degraded` (store unreachable).
//! A request with any failed window moves to `Degraded`; the next request
//! whose every window reached the store moves back to `Normal`. There is no
//! cooldown: every request probes the store.
//!
//! While degraded, counting continues in a per-process map keyed exactly like
//! the store. In a multi-instance deployment each process enforces the limit
//! on its own share of traffic, so limits are under-enforced for the duration
//! of an outage. Requests are neither all allowed nor all denied.

use crate::rate_limit::store::LocalCounters;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

const STATE_NORMAL: u8 = 0;
const STATE_DEGRADED: u8 = 1;

/// Reachability of the shared counter store as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Counting against the shared store.
    Normal,
    /// Counting in-process until the store answers again.
    Degraded,
}

impl StoreState {
    fn to_u8(self) -> u8 {
        match self {
            StoreState::Normal => STATE_NORMAL,
            StoreState::Degraded => STATE_DEGRADED,
        }
    }

    fn from_u8(v: u8) -> Self {
        if v == STATE_DEGRADED {
            StoreState::Degraded
        } else {
            StoreState::Normal
        }
    }
}

/// State transition caused by a store call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    EnteredDegraded,
    Recovered,
}

#[derive(Debug)]
pub struct DegradedFallback {
    state: AtomicU8,
    counters: LocalCounters,
    degraded_since_millis: AtomicU64,
}

impl DegradedFallback {
    pub fn new() -> Self {
        Self::with_sweep_interval(LocalCounters::DEFAULT_SWEEP_EVERY)
    }

    /// Sweep expired local counters every `ops` increments.
    pub fn with_sweep_interval(ops: u64) -> Self {
        Self {
            state: AtomicU8::new(StoreState::Normal.to_u8()),
            counters: LocalCounters::new(ops),
            degraded_since_millis: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> StoreState {
        StoreState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Wall-clock millis of the last Normal → Degraded transition, if degraded.
    pub fn degraded_since_millis(&self) -> Option<u64> {
        match self.state() {
            StoreState::Degraded => Some(self.degraded_since_millis.load(Ordering::Acquire)),
            StoreState::Normal => None,
        }
    }

    /// Record a successful store call. Returns `Some` only for the caller that
    /// performed the Degraded → Normal transition.
    pub fn on_store_success(&self) -> Option<Transition> {
        if self.state.load(Ordering::Acquire) == STATE_NORMAL {
            return None;
        }
        match self.state.compare_exchange(
            STATE_DEGRADED,
            STATE_NORMAL,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let since = self.degraded_since_millis.swap(0, Ordering::AcqRel);
                tracing::info!(degraded_since_millis = since, "counter store recovered → normal");
                Some(Transition::Recovered)
            }
            Err(_) => None,
        }
    }

    /// Record a failed store call. Returns `Some` only for the caller that
    /// performed the Normal → Degraded transition.
    pub fn on_store_failure(&self, now_millis: u64, reason: &str) -> Option<Transition> {
        match self.state.compare_exchange(
            STATE_NORMAL,
            STATE_DEGRADED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.degraded_since_millis.store(now_millis, Ordering::Release);
                tracing::warn!(reason, "counter store unavailable → degraded (local counting)");
                Some(Transition::EnteredDegraded)
            }
            Err(_) => None,
        }
    }

    /// Count one request against the in-process counter for `key`.
    pub fn increment(&self, key: &str, ttl: Duration, now_millis: u64) -> u64 {
        self.counters.increment(key, ttl, now_millis)
    }

    /// Current unexpired local count for `key`.
    pub fn local_count(&self, key: &str, now_millis: u64) -> Option<u64> {
        self.counters.get(key, now_millis)
    }

    /// Number of local counters currently held, expired or not.
    pub fn tracked_keys(&self) -> usize {
        self.counters.len()
    }
}

impl Default for DegradedFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn starts_normal() {
        let fallback = DegradedFallback::new();
        assert_eq!(fallback.state(), StoreState::Normal);
        assert_eq!(fallback.degraded_since_millis(), None);
        assert_eq!(fallback.on_store_success(), None);
    }

    #[test]
    fn failure_then_success_round_trips() {
        let fallback = DegradedFallback::new();
        assert_eq!(fallback.on_store_failure(1_000, "timeout"), Some(Transition::EnteredDegraded));
        assert_eq!(fallback.state(), StoreState::Degraded);
        assert_eq!(fallback.degraded_since_millis(), Some(1_000));

        // Repeated failures do not re-announce the transition.
        assert_eq!(fallback.on_store_failure(2_000, "timeout"), None);
        assert_eq!(fallback.degraded_since_millis(), Some(1_000));

        assert_eq!(fallback.on_store_success(), Some(Transition::Recovered));
        assert_eq!(fallback.state(), StoreState::Normal);
    }

    #[test]
    fn local_counts_respect_ttl() {
        let fallback = DegradedFallback::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(fallback.increment("k", ttl, 0), 1);
        assert_eq!(fallback.increment("k", ttl, 59_999), 2);
        assert_eq!(fallback.local_count("k", 59_999), Some(2));
        assert_eq!(fallback.increment("k", ttl, 60_000), 1);
    }

    #[test]
    fn concurrent_transitions_announce_once() {
        let fallback = Arc::new(DegradedFallback::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fallback = fallback.clone();
                std::thread::spawn(move || fallback.on_store_failure(5, "connection").is_some())
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1);
        assert_eq!(fallback.state(), StoreState::Degraded);
    }

    #[test]
    fn transitions_are_logged_once() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fallback = DegradedFallback::new();
        fallback.on_store_failure(1, "timeout");
        fallback.on_store_failure(2, "timeout");
        fallback.on_store_success();

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(logs.matches("counter store unavailable").count(), 1);
        assert!(logs.contains("counter store recovered"));
    }
}
