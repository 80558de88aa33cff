//! Redis counter store for `tierguard` (companion crate).
//! Bring your own `redis::aio::ConnectionManager`, or connect from a URL.
//!
//! Every increment is one `EVALSHA` round trip of a short Lua script, which
//! Redis runs atomically: concurrent callers never lose an update and the TTL
//! is set exactly once, by the call that created the key.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError, Script};
use std::sync::Arc;
use std::time::Duration;
use tierguard::{CounterStore, StoreUnavailable};

/// `INCR`, then `PEXPIRE` only on the first write of the bucket.
pub const INCREMENT_WITH_EXPIRY_LUA: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

#[derive(Clone)]
pub struct RedisCounterStore {
    manager: ConnectionManager,
    script: Arc<Script>,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("manager", &"<redis::aio::ConnectionManager>")
            .field("script", &self.script.get_hash())
            .finish()
    }
}

impl RedisCounterStore {
    /// Use an existing connection manager (it reconnects on its own).
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager, script: Arc::new(Script::new(INCREMENT_WITH_EXPIRY_LUA)) }
    }

    /// Open a client for `url` (e.g. `redis://127.0.0.1:6379`) and connect.
    ///
    /// # Errors
    /// Returns the `redis` error if the URL is invalid or the first
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        tracing::debug!(target: "tierguard::redis", "connected counter store");
        Ok(Self::new(manager))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<u64, StoreUnavailable> {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.manager.clone();
        let count: i64 = self
            .script
            .key(key)
            .arg(ttl_millis)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(target: "tierguard::redis", key = %key, error = %e, "increment failed");
                classify(&e)
            })?;
        u64::try_from(count)
            .map_err(|_| StoreUnavailable::Protocol(format!("negative counter value {count}")))
    }
}

/// Map a `redis` error onto the store failure taxonomy.
pub fn classify(err: &RedisError) -> StoreUnavailable {
    if err.is_timeout() {
        StoreUnavailable::TimedOut(err.to_string())
    } else if err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_io_error()
        || err.kind() == ErrorKind::ClusterDown
    {
        StoreUnavailable::Connection(err.to_string())
    } else {
        StoreUnavailable::Protocol(err.to_string())
    }
}
