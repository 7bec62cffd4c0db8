//! In-memory session store
//!
//! Sessions live in an ordered map keyed by the ordered form of the windowed
//! key, so every read is a range scan. A second index by session end supports
//! retention: once observed stream time has moved more than the retention
//! period past a session's end, the session is dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use kestrel_core::{
    EntryIterator, KeyValueIterator, Position, SessionEntry, SessionIterator, SessionKeySchema,
    SessionStore, SessionWindow, StoreContext, StoreError, StoreResult, Windowed,
};

/// Ordered session map plus its end-time index
#[derive(Debug, Default)]
pub(crate) struct Sessions {
    by_key: BTreeMap<Bytes, Bytes>,
    by_end: BTreeSet<(i64, Bytes)>,
}

impl Sessions {
    fn insert(&mut self, ordered: Bytes, end: i64, value: Bytes) {
        if self.by_key.insert(ordered.clone(), value).is_none() {
            self.by_end.insert((end, ordered));
        }
    }

    fn remove(&mut self, ordered: &Bytes, end: i64) -> bool {
        if self.by_key.remove(ordered).is_some() {
            self.by_end.remove(&(end, ordered.clone()));
            true
        } else {
            false
        }
    }

    /// Drop every session ending at or before `cutoff`
    fn expire_through(&mut self, cutoff: i64) -> usize {
        let mut expired = 0;
        while self.by_end.first().is_some_and(|(end, _)| *end <= cutoff) {
            if let Some((_, ordered)) = self.by_end.pop_first() {
                self.by_key.remove(&ordered);
                expired += 1;
            }
        }
        expired
    }

    fn clear(&mut self) {
        self.by_key.clear();
        self.by_end.clear();
    }
}

/// In-memory implementation of [`SessionStore`]
///
/// Readers take a shared lock per step, writers an exclusive lock per
/// mutation, so no reader ever observes a partially applied write.
/// Iterators are invalidated when the store closes.
#[derive(Debug)]
pub struct InMemorySessionStore {
    name: String,
    retention_ms: i64,
    sessions: Arc<RwLock<Sessions>>,
    position: RwLock<Position>,
    observed_stream_time: AtomicI64,
    context: RwLock<Option<Arc<StoreContext>>>,
    initialized: AtomicBool,
    closed: Arc<AtomicBool>,
    open_iterators: Arc<AtomicUsize>,
}

impl InMemorySessionStore {
    /// Create a store that never expires sessions
    pub fn new(name: impl Into<String>) -> Self {
        Self::unchecked(name.into(), i64::MAX)
    }

    /// Create a store that drops sessions older than `retention_ms`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` unless `retention_ms` is positive.
    pub fn with_retention(name: impl Into<String>, retention_ms: i64) -> StoreResult<Self> {
        let name = name.into();
        if retention_ms <= 0 {
            return Err(StoreError::InvalidConfig(format!(
                "retention for store {name} must be positive, got {retention_ms}"
            )));
        }
        Ok(Self::unchecked(name, retention_ms))
    }

    fn unchecked(name: String, retention_ms: i64) -> Self {
        Self {
            name,
            retention_ms,
            sessions: Arc::new(RwLock::new(Sessions::default())),
            position: RwLock::new(Position::empty()),
            observed_stream_time: AtomicI64::new(i64::MIN),
            context: RwLock::new(None),
            initialized: AtomicBool::new(false),
            closed: Arc::new(AtomicBool::new(false)),
            open_iterators: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention_ms
    }

    /// Number of sessions currently stored
    pub fn len(&self) -> usize {
        self.sessions.read().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().by_key.is_empty()
    }

    /// Number of iterators handed out and not yet closed
    pub fn open_iterators(&self) -> usize {
        self.open_iterators.load(Ordering::SeqCst)
    }

    /// Largest session end seen by `put`, if any
    pub fn observed_stream_time(&self) -> Option<i64> {
        let time = self.observed_stream_time.load(Ordering::SeqCst);
        (time != i64::MIN).then_some(time)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed(&self.name));
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(StoreError::NotInitialized(self.name.clone()));
        }
        Ok(())
    }

    /// Fold the context's current record into the position
    fn update_position(&self) {
        let metadata = self
            .context
            .read()
            .as_ref()
            .and_then(|context| context.record_metadata());
        if let Some(metadata) = metadata {
            let mut position = self.position.write();
            *position = position.with_component(&metadata.topic, metadata.partition, metadata.offset);
        }
    }

    fn ensure_not_closed(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed(&self.name));
        }
        Ok(())
    }

    /// Write a session without applying retention or touching the position.
    /// Allowed before `init`.
    pub(crate) fn restore_put(&self, key: &Windowed, value: Bytes) -> StoreResult<()> {
        self.ensure_not_closed()?;
        let ordered = SessionKeySchema::to_ordered(key)?;
        self.sessions.write().insert(ordered, key.window().end(), value);
        self.observed_stream_time
            .fetch_max(key.window().end(), Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn restore_remove(&self, key: &Windowed) -> StoreResult<()> {
        self.ensure_not_closed()?;
        let ordered = SessionKeySchema::to_ordered(key)?;
        self.sessions.write().remove(&ordered, key.window().end());
        Ok(())
    }

    pub(crate) fn merge_position(&self, other: &Position) {
        let mut position = self.position.write();
        *position = position.merge(other);
    }

    /// Drop every session that retention would have dropped by now
    pub(crate) fn expire_retained(&self) -> usize {
        let Some(stream_time) = self.observed_stream_time() else {
            return 0;
        };
        let cutoff = stream_time.saturating_sub(self.retention_ms);
        let expired = self.sessions.write().expire_through(cutoff);
        if expired > 0 {
            debug!(store = %self.name, expired, stream_time, "Dropped expired sessions");
        }
        expired
    }

    fn cursor(
        &self,
        lower: Bytes,
        upper: Bytes,
        direction: Direction,
        time_filter: Option<(i64, i64)>,
    ) -> SessionIterator {
        self.open_iterators.fetch_add(1, Ordering::SeqCst);
        Box::new(SessionCursor {
            store_name: self.name.clone(),
            sessions: Arc::clone(&self.sessions),
            store_closed: Arc::clone(&self.closed),
            open_iterators: Arc::clone(&self.open_iterators),
            lower: Bound::Included(lower),
            upper: Bound::Included(upper),
            direction,
            time_filter,
            peeked: None,
            exhausted: false,
            released: false,
        })
    }

    fn scan_key(
        &self,
        key: &[u8],
        direction: Direction,
        time_range: Option<(i64, i64)>,
    ) -> StoreResult<SessionIterator> {
        self.ensure_open()?;
        let lower = SessionKeySchema::lower_bound(key)?;
        let upper = match time_range {
            Some((time_from, _)) => SessionKeySchema::upper_bound_for_end(key, time_from)?,
            None => SessionKeySchema::upper_bound(key)?,
        };
        Ok(self.cursor(lower, upper, direction, time_range))
    }

    fn scan_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        direction: Direction,
        time_range: Option<(i64, i64)>,
    ) -> StoreResult<SessionIterator> {
        self.ensure_open()?;
        if key_from > key_to {
            warn!(
                store = %self.name,
                from = %hex::encode(key_from),
                to = %hex::encode(key_to),
                "Range start is after range end, returning empty iterator"
            );
            return Ok(EntryIterator::empty().boxed());
        }
        let lower = SessionKeySchema::lower_bound(key_from)?;
        let upper = SessionKeySchema::upper_bound(key_to)?;
        Ok(self.cursor(lower, upper, direction, time_range))
    }
}

impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn persistent(&self) -> bool {
        false
    }

    fn is_open(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn init(&self, context: &Arc<StoreContext>, root: &dyn SessionStore) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed(&self.name));
        }
        context.register_store(root.name(), root.persistent())?;
        *self.context.write() = Some(Arc::clone(context));
        self.initialized.store(true, Ordering::SeqCst);
        debug!(store = %self.name, root = root.name(), "Initialized in-memory session store");
        Ok(())
    }

    fn put(&self, key: &Windowed, value: Bytes) -> StoreResult<()> {
        self.ensure_open()?;
        let ordered = SessionKeySchema::to_ordered(key)?;
        let end = key.window().end();
        let stream_time = self
            .observed_stream_time
            .fetch_max(end, Ordering::SeqCst)
            .max(end);
        let cutoff = stream_time.saturating_sub(self.retention_ms);

        {
            let mut sessions = self.sessions.write();
            if end <= cutoff {
                debug!(
                    store = %self.name,
                    key = %key,
                    stream_time,
                    "Skipping put of expired session"
                );
            } else {
                trace!(store = %self.name, key = %key, len = value.len(), "Put session");
                sessions.insert(ordered, end, value);
            }
            let expired = sessions.expire_through(cutoff);
            if expired > 0 {
                debug!(store = %self.name, expired, stream_time, "Dropped expired sessions");
            }
        }

        self.update_position();
        Ok(())
    }

    fn remove(&self, key: &Windowed) -> StoreResult<()> {
        self.ensure_open()?;
        let ordered = SessionKeySchema::to_ordered(key)?;
        let removed = self.sessions.write().remove(&ordered, key.window().end());
        trace!(store = %self.name, key = %key, removed, "Remove session");
        self.update_position();
        Ok(())
    }

    fn fetch_session(&self, key: &[u8], start: i64, end: i64) -> StoreResult<Option<Bytes>> {
        self.ensure_open()?;
        let windowed = Windowed::new(Bytes::copy_from_slice(key), SessionWindow::new(start, end)?);
        let ordered = SessionKeySchema::to_ordered(&windowed)?;
        Ok(self.sessions.read().by_key.get(&ordered).cloned())
    }

    fn fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
        self.scan_key(key, Direction::Forward, None)
    }

    fn backward_fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
        self.scan_key(key, Direction::Backward, None)
    }

    fn fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator> {
        self.scan_range(key_from, key_to, Direction::Forward, None)
    }

    fn backward_fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator> {
        self.scan_range(key_from, key_to, Direction::Backward, None)
    }

    fn find_sessions(
        &self,
        key: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.scan_key(key, Direction::Forward, Some((time_from, time_to)))
    }

    fn backward_find_sessions(
        &self,
        key: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.scan_key(key, Direction::Backward, Some((time_from, time_to)))
    }

    fn find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.scan_range(key_from, key_to, Direction::Forward, Some((time_from, time_to)))
    }

    fn backward_find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator> {
        self.scan_range(key_from, key_to, Direction::Backward, Some((time_from, time_to)))
    }

    fn flush(&self) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(store = %self.name, "Flush (no-op for in-memory store)");
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sessions.write().clear();
        debug!(
            store = %self.name,
            open_iterators = self.open_iterators(),
            "Closed in-memory session store"
        );
        Ok(())
    }

    fn position(&self) -> Position {
        self.position.read().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Lazy cursor over a key range of the session map
///
/// Each step re-enters the map just past the last key it returned, so the
/// cursor holds no lock between calls and sees writes made since it started.
struct SessionCursor {
    store_name: String,
    sessions: Arc<RwLock<Sessions>>,
    store_closed: Arc<AtomicBool>,
    open_iterators: Arc<AtomicUsize>,
    lower: Bound<Bytes>,
    upper: Bound<Bytes>,
    direction: Direction,
    time_filter: Option<(i64, i64)>,
    peeked: Option<SessionEntry>,
    exhausted: bool,
    released: bool,
}

impl SessionCursor {
    fn step(&mut self) -> Option<(Bytes, Bytes)> {
        if range_is_empty(&self.lower, &self.upper) {
            self.exhausted = true;
            return None;
        }
        let next = {
            let sessions = self.sessions.read();
            let mut range = sessions
                .by_key
                .range::<Bytes, _>((self.lower.clone(), self.upper.clone()));
            let entry = match self.direction {
                Direction::Forward => range.next(),
                Direction::Backward => range.next_back(),
            };
            entry.map(|(key, value)| (key.clone(), value.clone()))
        };

        let Some((ordered, value)) = next else {
            self.exhausted = true;
            return None;
        };
        match self.direction {
            Direction::Forward => self.lower = Bound::Excluded(ordered.clone()),
            Direction::Backward => self.upper = Bound::Excluded(ordered.clone()),
        }
        Some((ordered, value))
    }

    fn advance(&mut self) -> Option<StoreResult<SessionEntry>> {
        loop {
            let (ordered, value) = self.step()?;
            let key = match SessionKeySchema::from_ordered(&ordered) {
                Ok(key) => key,
                Err(e) => return Some(Err(e)),
            };
            if let Some((time_from, time_to)) = self.time_filter
                && !key.window().overlaps(time_from, time_to)
            {
                continue;
            }
            return Some(Ok((key, value)));
        }
    }

    fn check_store_open(&mut self) -> StoreResult<()> {
        if self.store_closed.load(Ordering::SeqCst) {
            self.exhausted = true;
            self.peeked = None;
            return Err(StoreError::closed(&self.store_name));
        }
        Ok(())
    }
}

impl Iterator for SessionCursor {
    type Item = StoreResult<SessionEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.released || self.exhausted {
            return None;
        }
        if let Err(e) = self.check_store_open() {
            return Some(Err(e));
        }
        if let Some(entry) = self.peeked.take() {
            return Some(Ok(entry));
        }
        self.advance()
    }
}

impl KeyValueIterator for SessionCursor {
    fn peek_next_key(&mut self) -> Option<StoreResult<Windowed>> {
        if self.released || self.exhausted {
            return None;
        }
        if let Err(e) = self.check_store_open() {
            return Some(Err(e));
        }
        if self.peeked.is_none() {
            match self.advance()? {
                Ok(entry) => self.peeked = Some(entry),
                Err(e) => return Some(Err(e)),
            }
        }
        self.peeked.as_ref().map(|(key, _)| Ok(key.clone()))
    }

    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.peeked = None;
        self.open_iterators.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for SessionCursor {
    fn drop(&mut self) {
        self.close();
    }
}

fn range_is_empty(lower: &Bound<Bytes>, upper: &Bound<Bytes>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}
