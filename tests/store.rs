//! Cross-module behaviour of the bucket store and leak task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keybucket::{BucketStore, LeakScheduler, Rate, TokenBucketStore};

fn bounded_store(rate: u32, window: Duration, max_keys: usize) -> Arc<BucketStore> {
    let rate = Rate::new(rate, window).unwrap();
    Arc::new(BucketStore::with_max_keys(rate, max_keys).unwrap())
}

#[test]
fn test_no_over_admission_under_contention() {
    let store = bounded_store(25, Duration::from_secs(60), 100);
    let allowed = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..16 {
            scope.spawn(|| {
                for _ in 0..20 {
                    let outcome = store.take("shared").unwrap();
                    if outcome.allowed {
                        allowed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        assert_eq!(outcome.remaining, 0);
                    }
                }
            });
        }
    });

    assert_eq!(allowed.load(Ordering::Relaxed), 25);
    assert_eq!(store.fill("shared"), Some(25));
}

#[test]
fn test_concurrent_distinct_keys_respect_bound() {
    let store = bounded_store(5, Duration::from_secs(60), 50);

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                for i in 0..100 {
                    store.take(&format!("w{worker}-k{i}")).unwrap();
                }
            });
        }
    });

    assert_eq!(store.len(), 50);
    assert_eq!(store.tracked_keys().len(), 50);
}

#[test]
fn test_reset_at_identical_between_ticks() {
    let store = bounded_store(10, Duration::from_secs(10), 100);
    store.leak();
    let expected = store.reset_at();

    let observed: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                scope.spawn(move || store.take(&format!("key-{i}")).unwrap().reset_at)
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert!(observed.iter().all(|reset_at| *reset_at == expected));
}

/// Records the eviction order for a store bounded to two keys.
#[test]
fn test_eviction_order_with_two_keys() {
    let store = bounded_store(3, Duration::from_secs(3), 2);

    store.take("a").unwrap();
    store.take("a").unwrap();
    store.take("b").unwrap();
    store.take("c").unwrap();

    // "a" was inserted first and is the one evicted when "c" arrives
    assert_eq!(store.tracked_keys(), vec!["b", "c"]);

    // "a" comes back with fresh capacity and pushes out "b"
    let outcome = store.take("a").unwrap();
    assert!(outcome.allowed);
    assert_eq!(outcome.remaining, 2);
    assert_eq!(store.tracked_keys(), vec!["c", "a"]);

    // "c" kept its state throughout
    assert_eq!(store.fill("c"), Some(1));
}

#[test]
fn test_idle_cleanup_leaves_no_stale_order_entry() {
    let store = bounded_store(3, Duration::from_secs(3), 2);

    store.take("idle").unwrap();
    store.leak();
    store.take("active").unwrap();
    store.take("active").unwrap();

    // "idle" is empty and deleted, "active" drops to one unit
    let report = store.leak();
    assert_eq!(report.removed, 1);
    assert_eq!(report.leaked, 1);
    assert_eq!(store.tracked_keys(), vec!["active"]);

    // a new key fits without evicting the active one
    store.take("new").unwrap();
    assert_eq!(store.tracked_keys(), vec!["active", "new"]);
    assert_eq!(store.fill("active"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_full_bucket_recovers_over_window() {
    let store = bounded_store(4, Duration::from_secs(2), 10);
    let backend: Arc<dyn TokenBucketStore> = store.clone();
    for _ in 0..4 {
        assert!(backend.take("client").unwrap().allowed);
    }
    assert!(!backend.take("client").unwrap().allowed);

    let leak = LeakScheduler::start(Arc::clone(&store)).unwrap();
    assert_eq!(leak.interval(), Duration::from_millis(500));

    // four ticks over one window give back every unit
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(store.fill("client"), Some(0));

    let admitted = (0..6)
        .filter(|_| backend.take("client").unwrap().allowed)
        .count();
    assert_eq!(admitted, 4);

    leak.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_at_advances_with_ticks() {
    let store = bounded_store(1, Duration::from_secs(1), 10);
    let before = store.take("client").unwrap().reset_at;

    let leak = LeakScheduler::start(Arc::clone(&store)).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let after = store.reset_at();
    assert!(after > before);
    assert_eq!(store.take("client").unwrap().reset_at, after);

    leak.shutdown().await;
}
