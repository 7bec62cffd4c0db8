//! End-to-end tests: write through the decorated store, then rebuild a fresh
//! store from the changelog and compare.

use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use kestrel_core::{RecordMetadata, SessionIterator, SessionStore, StoreContext, Windowed};
use kestrel_storage::{
    ChannelChangelog, FileChangelog, FileChangelogConfig, InMemoryChangelog, SessionStoreConfig,
    restore, spawn_writer,
};

fn collect(iter: SessionIterator) -> Vec<(Windowed, Bytes)> {
    iter.map(|entry| entry.unwrap()).collect()
}

fn write_workload(store: &dyn SessionStore, context: &StoreContext) {
    let mut offset = 0u64;
    for user in 0..5u8 {
        for session in 0..4i64 {
            offset += 1;
            context.set_record_metadata(RecordMetadata::new("clicks", u32::from(user % 2), offset));
            let key = Windowed::session(
                format!("user-{user}").into_bytes(),
                session * 100,
                session * 100 + 50,
            )
            .unwrap();
            store
                .put(&key, Bytes::from(format!("{user}:{session}")))
                .unwrap();
        }
    }
    // Remove one session per even user
    for user in (0..5u8).step_by(2) {
        offset += 1;
        context.set_record_metadata(RecordMetadata::new("clicks", 0, offset));
        let key = Windowed::session(format!("user-{user}").into_bytes(), 100, 150).unwrap();
        store.remove(&key).unwrap();
    }
}

// ============================================================================
// File changelog
// ============================================================================

#[test]
fn test_restore_from_file_changelog_matches_original() {
    let dir = TempDir::new().unwrap();
    let changelog = Arc::new(
        FileChangelog::open(FileChangelogConfig::with_base_dir(dir.path()).with_sync_on_write(false))
            .unwrap(),
    );
    let config = SessionStoreConfig::new("clicks-per-session");

    let original = config.build(changelog.clone()).unwrap();
    let context = Arc::new(StoreContext::new("app", 0));
    original.init_as_root(&context).unwrap();
    write_workload(&original, &context);
    changelog.flush().unwrap();

    // Fresh engine, restored before wrapping
    let engine = config.engine().unwrap();
    let summary = restore(&engine, changelog.replay("clicks-per-session").unwrap()).unwrap();
    assert_eq!(summary.applied, 20);
    assert_eq!(summary.tombstones, 3);
    assert_eq!(summary.skipped, 0);

    let restored = config.wrap(engine, Arc::new(InMemoryChangelog::new()));
    restored
        .init_as_root(&Arc::new(StoreContext::new("app", 0)))
        .unwrap();

    assert_eq!(restored.position(), original.position());
    assert_eq!(
        collect(restored.fetch_range(b"user-0", b"user-4").unwrap()),
        collect(original.fetch_range(b"user-0", b"user-4").unwrap())
    );
    assert_eq!(
        collect(restored.fetch(b"user-2").unwrap()).len(),
        3,
        "removed session stays removed"
    );
}

#[test]
fn test_restore_survives_reopen_of_changelog_directory() {
    let dir = TempDir::new().unwrap();
    let config = FileChangelogConfig::with_base_dir(dir.path());
    let store_config = SessionStoreConfig::new("sessions");

    {
        let changelog = Arc::new(FileChangelog::open(config.clone()).unwrap());
        let store = store_config.build(changelog).unwrap();
        let context = Arc::new(StoreContext::new("app", 0));
        store.init_as_root(&context).unwrap();
        context.set_record_metadata(RecordMetadata::new("input", 0, 7));
        let key = Windowed::session(b"k".to_vec(), 5, 9).unwrap();
        store.put(&key, Bytes::from_static(b"v")).unwrap();
        store.close().unwrap();
    }

    let changelog = FileChangelog::open(config).unwrap();
    let engine = store_config.engine().unwrap();
    let summary = restore(&engine, changelog.replay("sessions").unwrap()).unwrap();
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.position.offset("input", 0), Some(7));

    engine
        .init(&Arc::new(StoreContext::new("app", 0)), &engine)
        .unwrap();
    assert_eq!(
        engine.fetch_session(b"k", 5, 9).unwrap(),
        Some(Bytes::from_static(b"v"))
    );
}

#[test]
fn test_restore_drops_sessions_outside_retention() {
    let changelog = Arc::new(InMemoryChangelog::new());
    let config = SessionStoreConfig::new("sessions").with_retention_ms(100);

    let original = config.build(changelog.clone()).unwrap();
    let context = Arc::new(StoreContext::new("app", 0));
    original.init_as_root(&context).unwrap();
    for (offset, (key, start, end)) in [(b"a", 0, 10), (b"a", 150, 200), (b"b", 50, 60)]
        .into_iter()
        .enumerate()
    {
        context.set_record_metadata(RecordMetadata::new("input", 0, offset as u64));
        let key = Windowed::session(key.to_vec(), start, end).unwrap();
        original.put(&key, Bytes::from_static(b"v")).unwrap();
    }
    // Every put is logged, including the one retention skipped
    assert_eq!(changelog.len(), 3);

    let engine = config.engine().unwrap();
    restore(&engine, changelog.records()).unwrap();
    engine
        .init(&Arc::new(StoreContext::new("app", 0)), &engine)
        .unwrap();

    assert_eq!(engine.len(), 1);
    assert_eq!(
        collect(engine.fetch_range(b"a", b"b").unwrap()),
        collect(original.fetch_range(b"a", b"b").unwrap())
    );
    assert_eq!(engine.position(), original.position());
}

// ============================================================================
// Channel changelog
// ============================================================================

#[tokio::test]
async fn test_restore_from_channel_fed_file() {
    let dir = TempDir::new().unwrap();
    let file = Arc::new(FileChangelog::open(FileChangelogConfig::with_base_dir(dir.path())).unwrap());
    let (channel, receiver) = ChannelChangelog::new();
    let writer = spawn_writer(receiver, file.clone());

    let config = SessionStoreConfig::new("sessions");
    let store = config.build(Arc::new(channel)).unwrap();
    let context = Arc::new(StoreContext::new("app", 0));
    store.init_as_root(&context).unwrap();
    write_workload(&store, &context);
    let expected = collect(store.fetch_range(b"user-0", b"user-4").unwrap());

    // Dropping the store drops the last sender and ends the writer
    drop(store);
    assert_eq!(writer.await.unwrap().unwrap(), 23);

    let engine = config.engine().unwrap();
    restore(&engine, file.replay("sessions").unwrap()).unwrap();
    engine
        .init(&Arc::new(StoreContext::new("app", 1)), &engine)
        .unwrap();
    assert_eq!(collect(engine.fetch_range(b"user-0", b"user-4").unwrap()), expected);
}
