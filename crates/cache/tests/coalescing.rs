use pretty_assertions::assert_eq;
use relay_cache::{Cache, CacheConfig, CacheKey};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

type TestCache = Cache<Arc<String>, String>;

fn key() -> CacheKey {
    CacheKey::new("file", &json!({"node": "1:2", "depth": 3})).unwrap()
}

fn new_cache() -> TestCache {
    Cache::new(CacheConfig::default()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_compute_once() {
    let cache = new_cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let release = release.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(
                        &key(),
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            release.notified().await;
                            Ok(Arc::new("tree".to_string()))
                        },
                        None,
                    )
                    .await
            })
        })
        .collect();

    // Let every task reach the cache before the computation finishes.
    while cache.stats().coalesced < 15 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    release.notify_one();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().as_str(), "tree");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!((stats.misses, stats.coalesced, stats.in_flight), (1, 15, 0));
}

#[tokio::test]
async fn invalidate_forces_fresh_miss() {
    let cache = new_cache();
    let calls = AtomicUsize::new(0);
    let counter = &calls;
    let compute = || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new("tree".to_string()))
    };

    cache.get_or_compute(&key(), compute, None).await.unwrap();
    assert_eq!(cache.invalidate(key().as_str()), 1);
    cache.get_or_compute(&key(), compute, None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().misses, 2);
}

#[tokio::test]
async fn invalidate_twice_is_harmless() {
    let cache = new_cache();
    cache
        .get_or_compute(&key(), || async { Ok(Arc::new("v".to_string())) }, None)
        .await
        .unwrap();
    assert_eq!(cache.invalidate("file"), 1);
    assert_eq!(cache.invalidate("file"), 0);
    assert_eq!(cache.stats().current_size, 0);
}

#[tokio::test]
async fn failure_reaches_waiters_and_is_not_stored() {
    let cache = new_cache();
    let release = Arc::new(Notify::new());

    let leader = {
        let cache = cache.clone();
        let release = release.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(
                    &key(),
                    || async move {
                        release.notified().await;
                        Err("rate limited".to_string())
                    },
                    None,
                )
                .await
        })
    };
    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }
    let waiter = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(&key(), || async { Ok(Arc::new("never".to_string())) }, None)
                .await
        })
    };
    while cache.stats().coalesced == 0 {
        tokio::task::yield_now().await;
    }
    release.notify_one();

    assert_eq!(leader.await.unwrap(), Err("rate limited".to_string()));
    assert_eq!(waiter.await.unwrap(), Err("rate limited".to_string()));
    assert_eq!(cache.stats().current_size, 0);
}

#[tokio::test]
async fn waiter_takes_over_when_leader_is_cancelled() {
    let cache = new_cache();

    let leader = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(
                    &key(),
                    || std::future::pending::<Result<Arc<String>, String>>(),
                    None,
                )
                .await
        })
    };
    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }
    let waiter = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(&key(), || async { Ok(Arc::new("second".to_string())) }, None)
                .await
        })
    };
    while cache.stats().coalesced == 0 {
        tokio::task::yield_now().await;
    }

    leader.abort();
    let value = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter finished")
        .unwrap()
        .unwrap();
    assert_eq!(value.as_str(), "second");
    assert_eq!(cache.peek(&key()).unwrap().as_str(), "second");
    assert_eq!(cache.stats().in_flight, 0);
}

#[tokio::test]
async fn invalidation_during_compute_keeps_result_out() {
    let cache = new_cache();
    let release = Arc::new(Notify::new());

    let leader = {
        let cache = cache.clone();
        let release = release.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(
                    &key(),
                    || async move {
                        release.notified().await;
                        Ok(Arc::new("stale".to_string()))
                    },
                    None,
                )
                .await
        })
    };
    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }
    cache.invalidate("file*");
    release.notify_one();

    assert_eq!(leader.await.unwrap().unwrap().as_str(), "stale");
    assert!(cache.peek(&key()).is_none());
}
