use crate::clock::{Clock, SystemClock};
use crate::error::StoreUnavailable;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Shared counting store (Redis or equivalent).
///
/// Implementations must perform the whole operation as one atomic round trip:
/// increment the counter, set `ttl` only when this call created the key, and
/// return the post-increment value. A separate read followed by a write loses
/// updates under concurrency and is not an acceptable implementation.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the new count.
    ///
    /// # Errors
    /// Any failure to obtain a count (timeout, refused connection, malformed
    /// reply) is reported as [`StoreUnavailable`], never as a guessed count.
    async fn increment_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<u64, StoreUnavailable>;
}

#[async_trait]
impl<S: CounterStore + ?Sized> CounterStore for Arc<S> {
    async fn increment_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<u64, StoreUnavailable> {
        (**self).increment_with_expiry(key, ttl).await
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at_millis: u64,
}

/// Counters with lazy TTL eviction, safe for concurrent increment.
///
/// Expired entries are replaced on access and swept in bulk every
/// `sweep_every` operations; there is no background task.
#[derive(Debug)]
pub(crate) struct LocalCounters {
    slots: Mutex<HashMap<String, Slot>>,
    ops: AtomicU64,
    sweep_every: u64,
}

impl LocalCounters {
    pub(crate) const DEFAULT_SWEEP_EVERY: u64 = 1_024;

    pub(crate) fn new(sweep_every: u64) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ops: AtomicU64::new(0),
            sweep_every: sweep_every.max(1),
        }
    }

    pub(crate) fn increment(&self, key: &str, ttl: Duration, now_millis: u64) -> u64 {
        let sweep = (self.ops.fetch_add(1, Ordering::Relaxed) + 1) % self.sweep_every == 0;
        // Counts stay valid integers even if another holder panicked.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if sweep {
            slots.retain(|_, slot| slot.expires_at_millis > now_millis);
        }
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let slot = slots
            .entry(key.to_owned())
            .or_insert(Slot { count: 0, expires_at_millis: 0 });
        if slot.expires_at_millis <= now_millis {
            *slot = Slot { count: 0, expires_at_millis: now_millis.saturating_add(ttl_millis) };
        }
        slot.count += 1;
        slot.count
    }

    pub(crate) fn get(&self, key: &str, now_millis: u64) -> Option<u64> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).filter(|slot| slot.expires_at_millis > now_millis).map(|slot| slot.count)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// In-process counter store for tests and single-instance deployments.
///
/// Can be switched unreachable to exercise degraded-mode handling.
#[derive(Debug, Clone)]
pub struct InMemoryCounterStore {
    counters: Arc<LocalCounters>,
    clock: Arc<dyn Clock>,
    reachable: Arc<AtomicBool>,
    calls: Arc<AtomicU64>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Expire counters against `clock` instead of the system clock.
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self {
            counters: Arc::new(LocalCounters::new(LocalCounters::DEFAULT_SWEEP_EVERY)),
            clock: Arc::new(clock),
            reachable: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`). Shared by all clones.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Current unexpired count for `key`.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.counters.get(key, self.clock.now_millis())
    }

    /// Number of increment calls received, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<u64, StoreUnavailable> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreUnavailable::Connection("in-memory store marked unreachable".into()));
        }
        Ok(self.counters.increment(key, ttl, self.clock.now_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn increments_and_expires() {
        let clock = ManualClock::at_secs(1_000);
        let store = InMemoryCounterStore::with_clock(clock.clone());
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 1);
        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 2);
        assert_eq!(store.count("k"), Some(2));

        clock.advance(Duration::from_secs(60));
        assert_eq!(store.count("k"), None);
        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ttl_is_fixed_by_first_write() {
        let clock = ManualClock::at_secs(0);
        let store = InMemoryCounterStore::with_clock(clock.clone());
        let ttl = Duration::from_secs(10);

        store.increment_with_expiry("k", ttl).await.unwrap();
        clock.advance(Duration::from_secs(9));
        assert_eq!(store.increment_with_expiry("k", ttl).await.unwrap(), 2);
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.count("k"), None);
    }

    #[tokio::test]
    async fn unreachable_store_reports_unavailable() {
        let store = InMemoryCounterStore::new();
        store.set_reachable(false);
        let err = store.increment_with_expiry("k", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, StoreUnavailable::Connection(_)));
        assert_eq!(store.calls(), 1);

        store.set_reachable(true);
        assert_eq!(store.increment_with_expiry("k", Duration::from_secs(1)).await.unwrap(), 1);
    }

    #[test]
    fn sweep_evicts_expired_entries() {
        let counters = LocalCounters::new(4);
        let ttl = Duration::from_millis(100);
        counters.increment("a", ttl, 0);
        counters.increment("b", ttl, 0);
        counters.increment("c", ttl, 0);
        assert_eq!(counters.len(), 3);
        // Fourth operation triggers a sweep after the others expired.
        counters.increment("d", ttl, 500);
        assert_eq!(counters.len(), 1);
        assert_eq!(counters.get("d", 500), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = InMemoryCounterStore::new();
        let mut handles = Vec::new();
        for _ in 0..500 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_with_expiry("shared", Duration::from_secs(60)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.count("shared"), Some(500));
    }
}
