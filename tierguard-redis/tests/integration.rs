use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tierguard::{CounterStore, LimiterConfig, QuotaEvaluator, StoreState};
use tierguard_redis::RedisCounterStore;

// Requires Redis running. If TIERGUARD_TEST_REDIS_URL is unset, the tests skip.
fn redis_url() -> Option<String> {
    match std::env::var("TIERGUARD_TEST_REDIS_URL") {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("skipping: set TIERGUARD_TEST_REDIS_URL (e.g. redis://127.0.0.1:6379)");
            None
        }
    }
}

async fn store(url: &str) -> RedisCounterStore {
    RedisCounterStore::connect(url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to redis at '{}': {}", url, e))
}

#[tokio::test]
async fn increments_and_sets_ttl_once() {
    let Some(url) = redis_url() else { return };
    let store = store(&url).await;
    let key = format!("tierguard_test:{}", uuid::Uuid::new_v4());

    assert_eq!(store.increment_with_expiry(&key, Duration::from_secs(2)).await.unwrap(), 1);
    assert_eq!(store.increment_with_expiry(&key, Duration::from_secs(60)).await.unwrap(), 2);

    let client = redis::Client::open(url.as_str()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let pttl: i64 = redis::cmd("PTTL").arg(&key).query_async(&mut conn).await.unwrap();
    assert!(pttl > 0 && pttl <= 2_000, "ttl {pttl} should come from the first write");

    let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn thousand_concurrent_increments() {
    let Some(url) = redis_url() else { return };
    let store = Arc::new(store(&url).await);
    let key = format!("tierguard_test:{}", uuid::Uuid::new_v4());

    let calls = (0..1_000).map(|_| {
        let store = store.clone();
        let key = key.clone();
        tokio::spawn(async move { store.increment_with_expiry(&key, Duration::from_secs(30)).await })
    });
    let mut counts: Vec<u64> = futures::future::join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    counts.sort_unstable();
    assert_eq!(counts, (1..=1_000).collect::<Vec<u64>>());
}

#[tokio::test]
async fn evaluator_counts_through_redis() {
    let Some(url) = redis_url() else { return };
    let prefix = format!("tierguard_test_{}", uuid::Uuid::new_v4().simple());
    let config = LimiterConfig::builder().key_prefix(prefix).build().unwrap();
    let evaluator = QuotaEvaluator::from_config(store(&url).await, &config);

    let now = SystemTime::now();
    let first = evaluator.evaluate("user-1", false, now).await.unwrap();
    let second = evaluator.evaluate("user-1", false, now).await.unwrap();
    assert_eq!(evaluator.store_state(), StoreState::Normal);
    assert_eq!(second.window("hour").unwrap().count, first.window("hour").unwrap().count + 1);
}
