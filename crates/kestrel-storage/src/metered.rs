//! Metered decorator
//!
//! Outermost layer of a configured store. Counts operations by kind and
//! traces the latency of each call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use kestrel_core::{
    Position, SessionIterator, SessionStore, StoreContext, StoreResult, Windowed,
};

/// Snapshot of a store's operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetrics {
    pub puts: u64,
    pub removes: u64,
    /// Point lookups and iterator-returning reads
    pub fetches: u64,
    pub flushes: u64,
    /// Calls of any kind that returned an error
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    puts: AtomicU64,
    removes: AtomicU64,
    fetches: AtomicU64,
    flushes: AtomicU64,
    errors: AtomicU64,
}

/// Session store layer that records operation metrics
pub struct MeteredSessionStore<S> {
    inner: S,
    counters: Counters,
}

impl<S: SessionStore> MeteredSessionStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counters: Counters::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Initialize the whole chain with this layer as root
    pub fn init_as_root(&self, context: &Arc<StoreContext>) -> StoreResult<()> {
        self.init(context, self)
    }

    pub fn metrics(&self) -> StoreMetrics {
        StoreMetrics {
            puts: self.counters.puts.load(Ordering::Relaxed),
            removes: self.counters.removes.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    fn timed<T>(
        &self,
        operation: &'static str,
        counter: &AtomicU64,
        call: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let start = Instant::now();
        let result = call();
        counter.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        trace!(
            store = self.inner.name(),
            operation,
            elapsed_us = start.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "Store operation"
        );
        result
    }
}

impl<S: SessionStore> SessionStore for MeteredSessionStore<S> {
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
        self.timed("put", &self.counters.puts, || self.inner.put(key, value))
    }

    fn remove(&self, key: &Windowed) -> StoreResult<()> {
        self.timed("remove", &self.counters.removes, || self.inner.remove(key))
    }

    fn fetch_session(&self, key: &[u8], start: i64, end: i64) -> StoreResult<Option<Bytes>> {
        self.timed("fetch_session", &self.counters.fetches, || {
            self.inner.fetch_session(key, start, end)
        })
    }

    fn fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
        self.timed("fetch", &self.counters.fetches, || self.inner.fetch(key))
    }

    fn backward_fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
        self.timed("backward_fetch", &self.counters.fetches, || {
            self.inner.backward_fetch(key)
        })
    }

    fn fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator> {
        self.timed("fetch_range", &self.counters.fetches, || {
            self.inner.fetch_range(key_from, key_to)
        })
    }

    fn backward_fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator> {
        self.timed("backward_fetch_range", &self.counters.fetches, || {
            self.inner.backward_fetch_range(key_from, key_to)
        })
    }

    fn find_sessions(
        &self,
        key: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.timed("find_sessions", &self.counters.fetches, || {
            self.inner.find_sessions(key, time_from, time_to)
        })
    }

    fn backward_find_sessions(
        &self,
        key: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.timed("backward_find_sessions", &self.counters.fetches, || {
            self.inner.backward_find_sessions(key, time_from, time_to)
        })
    }

    fn find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.timed("find_sessions_range", &self.counters.fetches, || {
            self.inner
                .find_sessions_range(key_from, key_to, time_from, time_to)
        })
    }

    fn backward_find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.timed("backward_find_sessions_range", &self.counters.fetches, || {
            self.inner
                .backward_find_sessions_range(key_from, key_to, time_from, time_to)
        })
    }

    fn flush(&self) -> StoreResult<()> {
        self.timed("flush", &self.counters.flushes, || self.inner.flush())
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn position(&self) -> Position {
        self.inner.position()
    }
}
