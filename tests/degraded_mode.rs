mod common;

use common::test_helpers::{at, config, FlakyStore, SlowStore, ALIGNED_SECS};
use std::time::Duration;
use tierguard::telemetry::MemorySink;
use tierguard::{
    CountSource, InMemoryCounterStore, LimiterConfig, QuotaEvaluator, StoreState, WindowSpec,
};

#[tokio::test]
async fn outage_keeps_enforcing_then_recovers() {
    let store = InMemoryCounterStore::new();
    let sink = MemorySink::new();
    let evaluator =
        QuotaEvaluator::from_config(store.clone(), &config(5, 1_000)).with_sink(sink.clone());
    let now = at(ALIGNED_SECS + 10);

    for _ in 0..2 {
        assert!(evaluator.evaluate("u", false, now).await.unwrap().is_allowed());
    }

    store.set_reachable(false);
    let mut verdicts = Vec::new();
    for _ in 0..8 {
        let decision = evaluator.evaluate("u", false, now).await.unwrap();
        assert!(decision.windows.iter().all(|w| w.source == CountSource::Local));
        verdicts.push(decision.is_allowed());
    }
    assert_eq!(evaluator.store_state(), StoreState::Degraded);
    // Local counting starts from zero: five allowed, then denied.
    assert_eq!(verdicts, [true, true, true, true, true, false, false, false]);

    store.set_reachable(true);
    let decision = evaluator.evaluate("u", false, now).await.unwrap();
    assert_eq!(evaluator.store_state(), StoreState::Normal);
    assert!(decision.windows.iter().all(|w| w.source == CountSource::Store));
    assert_eq!(decision.window("minute").unwrap().count, 3);

    assert_eq!(sink.count_kind("store_degraded"), 1);
    assert_eq!(sink.count_kind("store_recovered"), 1);
    assert_eq!(sink.count_kind("store_unavailable"), 16);
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_to_local_counting() {
    let store = SlowStore::new(Duration::from_millis(500));
    let config = LimiterConfig::builder()
        .window(WindowSpec::minute(3).unwrap())
        .store_timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let evaluator = QuotaEvaluator::from_config(store.clone(), &config);
    let now = at(ALIGNED_SECS);

    let decision = evaluator.evaluate("u", false, now).await.unwrap();
    assert!(decision.is_allowed());
    assert_eq!(decision.windows[0].source, CountSource::Local);
    assert_eq!(evaluator.store_state(), StoreState::Degraded);

    store.set_slow(false);
    let decision = evaluator.evaluate("u", false, now).await.unwrap();
    assert_eq!(decision.windows[0].source, CountSource::Store);
    assert_eq!(evaluator.store_state(), StoreState::Normal);
}

#[tokio::test]
async fn single_window_failure_only_degrades_that_window() {
    // One failure: whichever window's call lands first is counted locally.
    let evaluator = QuotaEvaluator::from_config(FlakyStore::failing(1), &config(60, 1_000));
    let decision = evaluator.evaluate("u", false, at(ALIGNED_SECS)).await.unwrap();

    let local = decision.windows.iter().filter(|w| w.source == CountSource::Local).count();
    assert_eq!(local, 1);
    assert!(decision.is_allowed());
    assert!(decision.is_degraded());
}

#[tokio::test]
async fn local_counters_expire_with_their_bucket() {
    let store = InMemoryCounterStore::new();
    store.set_reachable(false);
    let evaluator = QuotaEvaluator::from_config(store, &config(1, 1_000));

    assert!(evaluator.evaluate("u", false, at(ALIGNED_SECS)).await.unwrap().is_allowed());
    assert!(!evaluator.evaluate("u", false, at(ALIGNED_SECS)).await.unwrap().is_allowed());
    let next = evaluator.evaluate("u", false, at(ALIGNED_SECS + 60)).await.unwrap();
    assert!(next.is_allowed());
    assert_eq!(next.window("hour").unwrap().count, 3);
}
