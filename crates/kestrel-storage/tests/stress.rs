//! Stress tests for kestrel-storage
//!
//! These tests exercise the store under volume, retention churn, and
//! concurrent readers running alongside a single writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use rand::Rng;

use kestrel_core::{ChangeLogger, SessionStore, StoreContext, StoreError, Windowed};
use kestrel_storage::{InMemoryChangelog, InMemorySessionStore, SessionStoreConfig, restore};

fn init(store: &dyn SessionStore) -> Arc<StoreContext> {
    let context = Arc::new(StoreContext::new("stress", 0));
    store.init(&context, store).unwrap();
    context
}

// ============================================================================
// Throughput Tests
// ============================================================================

/// Write 10,000 sessions through the full store chain
#[test]
fn test_put_throughput() {
    kestrel_logging::init_testing();
    let changelog = Arc::new(InMemoryChangelog::new());
    let store = SessionStoreConfig::new("sessions").build(changelog.clone()).unwrap();
    store
        .init_as_root(&Arc::new(StoreContext::new("stress", 0)))
        .unwrap();
    let count: i64 = 10_000;

    let start = Instant::now();
    for i in 0..count {
        let key = Windowed::session(format!("key-{}", i % 100).into_bytes(), i, i + 10).unwrap();
        store.put(&key, Bytes::from(i.to_be_bytes().to_vec())).unwrap();
    }
    let duration = start.elapsed();
    println!(
        "Wrote {} sessions in {:?} ({:.2} puts/sec)",
        count,
        duration,
        count as f64 / duration.as_secs_f64()
    );

    assert_eq!(changelog.len(), count as usize);
    assert_eq!(store.metrics().puts, count as u64);
    let per_key = store.fetch(b"key-7").unwrap().count();
    assert_eq!(per_key, 100);
}

// ============================================================================
// Retention Tests
// ============================================================================

/// Sliding retention keeps only the recent tail of sessions
#[test]
fn test_retention_bounds_store_size() {
    let store = InMemorySessionStore::with_retention("sessions", 1_000).unwrap();
    init(&store);

    for end in (0..50_000i64).step_by(10) {
        let key = Windowed::session(b"k".to_vec(), end, end).unwrap();
        store.put(&key, Bytes::from_static(b"v")).unwrap();
    }

    // Kept sessions end in (stream_time - 1000, stream_time]
    assert_eq!(store.len(), 100);
    let oldest = store
        .backward_fetch(b"k")
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .0;
    assert_eq!(oldest.window().end(), 49_000);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// Readers never observe a session that is half written or out of order
#[test]
fn test_concurrent_readers_with_single_writer() {
    let store = Arc::new(InMemorySessionStore::new("sessions"));
    init(store.as_ref());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut scans = 0u64;
                while !done.load(Ordering::SeqCst) {
                    let mut last_end = i64::MAX;
                    for entry in store.fetch(b"hot").unwrap() {
                        let (key, value) = entry.unwrap();
                        assert!(key.window().end() <= last_end, "fetch is most recent first");
                        last_end = key.window().end();
                        assert_eq!(value.as_ref(), &key.window().end().to_be_bytes());
                    }
                    scans += 1;
                }
                scans
            })
        })
        .collect();

    let mut rng = rand::rng();
    for _ in 0..5_000 {
        let end = rng.random_range(0..10_000i64);
        let key = Windowed::session(b"hot".to_vec(), 0, end).unwrap();
        if rng.random_bool(0.2) {
            store.remove(&key).unwrap();
        } else {
            store.put(&key, Bytes::from(end.to_be_bytes().to_vec())).unwrap();
        }
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(store.open_iterators(), 0);
}

/// Closing while iterators are open invalidates them instead of blocking
#[test]
fn test_close_with_open_iterators() {
    let store = Arc::new(InMemorySessionStore::new("sessions"));
    init(store.as_ref());
    for end in 0..100 {
        let key = Windowed::session(b"k".to_vec(), 0, end).unwrap();
        store.put(&key, Bytes::from_static(b"v")).unwrap();
    }

    let mut iterators: Vec<_> = (0..8).map(|_| store.fetch(b"k").unwrap()).collect();
    for iter in &mut iterators {
        iter.next().unwrap().unwrap();
    }

    store.close().unwrap();

    for mut iter in iterators {
        assert!(matches!(iter.next(), Some(Err(StoreError::StoreClosed(_)))));
        assert!(iter.next().is_none());
    }
    assert_eq!(store.open_iterators(), 0);
}

// ============================================================================
// Recovery Tests
// ============================================================================

/// A store rebuilt from a long randomized changelog matches the original
#[test]
fn test_randomized_restore_matches_original() {
    let changelog = Arc::new(InMemoryChangelog::new());
    let config = SessionStoreConfig::new("sessions");
    let original = config.build(changelog.clone() as Arc<dyn ChangeLogger>).unwrap();
    let context = Arc::new(StoreContext::new("stress", 0));
    original.init_as_root(&context).unwrap();

    let mut rng = rand::rng();
    for offset in 0..2_000u64 {
        context.set_record_metadata(kestrel_core::RecordMetadata::new(
            "input",
            rng.random_range(0..4),
            offset,
        ));
        let user = rng.random_range(0..20u8);
        let start = rng.random_range(0..500i64);
        let key = Windowed::session(vec![user], start, start + rng.random_range(0..50)).unwrap();
        if rng.random_bool(0.3) {
            original.remove(&key).unwrap();
        } else {
            original.put(&key, Bytes::from(vec![user; 4])).unwrap();
        }
    }

    let engine = config.engine().unwrap();
    let summary = restore(&engine, changelog.records()).unwrap();
    assert_eq!(summary.total(), 2_000);
    init(&engine);

    let expected: Vec<_> = original
        .fetch_range(&[0], &[19])
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    let actual: Vec<_> = engine
        .fetch_range(&[0], &[19])
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(actual, expected);
    assert_eq!(engine.position(), original.position());
}
