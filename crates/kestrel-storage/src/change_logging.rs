//! Change-logging decorator
//!
//! Wraps a session store and appends one changelog record per mutation so
//! the store can be rebuilt by replaying its changelog.
//!
//! ## Mutation flow
//!
//! ```text
//! put(key, value) / remove(key)
//!   ├─ inner.put / inner.remove         (error: returned as is, nothing logged)
//!   ├─ position = inner.position()      (reflects the mutation just applied)
//!   ├─ binary key = to_binary(key)
//!   └─ changelog.log_change(name, binary key, value | tombstone, window end, position)
//! ```
//!
//! A changelog failure is returned to the caller, but the inner mutation has
//! already happened and is not undone. The changelog is the record of truth;
//! the local store is expected to be rebuilt from it.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{trace, warn};

use kestrel_core::{
    ChangeLogger, ChangeValue, Position, SessionIterator, SessionKeySchema, SessionStore,
    StoreContext, StoreResult, Windowed,
};

/// Session store layer that logs every mutation to a [`ChangeLogger`]
pub struct ChangeLoggingSessionStore<S> {
    inner: S,
    changelog: Arc<dyn ChangeLogger>,
}

impl<S: SessionStore> ChangeLoggingSessionStore<S> {
    pub fn new(inner: S, changelog: Arc<dyn ChangeLogger>) -> Self {
        Self { inner, changelog }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn log(&self, key: &Windowed, value: ChangeValue) -> StoreResult<()> {
        let position = self.inner.position();
        let binary = SessionKeySchema::to_binary(key)?;
        let timestamp = key.window().end();
        trace!(
            store = self.inner.name(),
            key = %hex::encode(&binary),
            timestamp,
            tombstone = value.is_tombstone(),
            position = %position,
            "Logging change"
        );
        self.changelog
            .log_change(self.inner.name(), binary, value, timestamp, &position)
            .inspect_err(|e| {
                warn!(store = self.inner.name(), key = %key, error = %e, "Changelog append failed");
            })
    }
}

impl<S: SessionStore> SessionStore for ChangeLoggingSessionStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn persistent(&self) -> bool {
        self.inner.persistent()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn init(&self, context: &Arc<StoreContext>, root: &dyn SessionStore) -> StoreResult<()> {
        self.inner.init(context, root)
    }

    fn put(&self, key: &Windowed, value: Bytes) -> StoreResult<()> {
        self.inner.put(key, value.clone())?;
        self.log(key, ChangeValue::Value(value))
    }

    fn remove(&self, key: &Windowed) -> StoreResult<()> {
        self.inner.remove(key)?;
        self.log(key, ChangeValue::Tombstone)
    }

    fn fetch_session(&self, key: &[u8], start: i64, end: i64) -> StoreResult<Option<Bytes>> {
        self.inner.fetch_session(key, start, end)
    }

    fn fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
        self.inner.fetch(key)
    }

    fn backward_fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
        self.inner.backward_fetch(key)
    }

    fn fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator> {
        self.inner.fetch_range(key_from, key_to)
    }

    fn backward_fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator> {
        self.inner.backward_fetch_range(key_from, key_to)
    }

    fn find_sessions(
        &self,
        key: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.inner.find_sessions(key, time_from, time_to)
    }

    fn backward_find_sessions(
        &self,
        key: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.inner.backward_find_sessions(key, time_from, time_to)
    }

    fn find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.inner
            .find_sessions_range(key_from, key_to, time_from, time_to)
    }

    fn backward_find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.inner
            .backward_find_sessions_range(key_from, key_to, time_from, time_to)
    }

    fn flush(&self) -> StoreResult<()> {
        self.inner.flush()
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn position(&self) -> Position {
        self.inner.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryChangelog;
    use crate::InMemorySessionStore;
    use kestrel_core::RecordMetadata;

    fn logged_store() -> (
        ChangeLoggingSessionStore<InMemorySessionStore>,
        Arc<InMemoryChangelog>,
        Arc<StoreContext>,
    ) {
        let changelog = Arc::new(InMemoryChangelog::new());
        let store = ChangeLoggingSessionStore::new(
            InMemorySessionStore::new("sessions"),
            changelog.clone(),
        );
        let context = Arc::new(StoreContext::new("app", 0));
        store.init(&context, &store).unwrap();
        (store, changelog, context)
    }

    #[test]
    fn test_put_logs_after_apply() {
        let (store, changelog, context) = logged_store();
        let key = Windowed::session(b"a".to_vec(), 3, 8).unwrap();
        context.set_record_metadata(RecordMetadata::new("input", 1, 12));

        store.put(&key, Bytes::from_static(b"v")).unwrap();

        let records = changelog.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, SessionKeySchema::to_binary(&key).unwrap());
        assert_eq!(records[0].timestamp, 8);
        assert_eq!(records[0].position.offset("input", 1), Some(12));
        assert_eq!(records[0].position, store.position());
    }

    #[test]
    fn test_failed_changelog_keeps_inner_write() {
        let (store, changelog, _) = logged_store();
        let key = Windowed::session(b"a".to_vec(), 0, 0).unwrap();
        changelog.fail_next("broker unavailable");

        let result = store.put(&key, Bytes::from_static(b"v"));
        assert!(result.is_err());
        assert_eq!(
            store.fetch_session(b"a", 0, 0).unwrap(),
            Some(Bytes::from_static(b"v"))
        );

        // The decorator has no failure state; the next write logs normally
        store.remove(&key).unwrap();
        assert_eq!(changelog.records().len(), 1);
        assert!(changelog.records()[0].value.is_tombstone());
    }
}
