use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tierguard::{CounterStore, InMemoryCounterStore, LimiterConfig, StoreUnavailable, WindowSpec};

/// Start of a minute bucket (also the start of an hour bucket).
pub const ALIGNED_SECS: u64 = 1_700_002_800;

pub fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

pub fn config(per_minute: u64, per_hour: u64) -> LimiterConfig {
    LimiterConfig::builder()
        .window(WindowSpec::minute(per_minute).unwrap())
        .window(WindowSpec::hour(per_hour).unwrap())
        .build()
        .unwrap()
}

/// Store that sleeps before answering, optionally only while `slow` is set.
#[derive(Debug, Clone)]
pub struct SlowStore {
    inner: InMemoryCounterStore,
    delay: Duration,
    slow: Arc<AtomicBool>,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self { inner: InMemoryCounterStore::new(), delay, slow: Arc::new(AtomicBool::new(true)) }
    }

    pub fn set_slow(&self, slow: bool) {
        self.slow.store(slow, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryCounterStore {
        &self.inner
    }
}

#[async_trait]
impl CounterStore for SlowStore {
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreUnavailable> {
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.increment_with_expiry(key, ttl).await
    }
}

/// Store that answers with a protocol error for the first `failures` calls.
#[derive(Debug, Clone)]
pub struct FlakyStore {
    inner: InMemoryCounterStore,
    remaining_failures: Arc<AtomicU64>,
}

impl FlakyStore {
    pub fn failing(failures: u64) -> Self {
        Self { inner: InMemoryCounterStore::new(), remaining_failures: Arc::new(AtomicU64::new(failures)) }
    }
}

#[async_trait]
impl CounterStore for FlakyStore {
    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, StoreUnavailable> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreUnavailable::Protocol("unexpected reply".into()));
        }
        self.inner.increment_with_expiry(key, ttl).await
    }
}
