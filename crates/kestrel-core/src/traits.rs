//! Core traits for session stores
//!
//! - [`SessionStore`]: read/write surface every session-windowed store layer
//!   implements, from the engine at the bottom to the decorators stacked on it
//! - [`ChangeLogger`]: sink that receives one record per logged mutation

use std::sync::Arc;

use bytes::Bytes;

use crate::context::StoreContext;
use crate::error::StoreResult;
use crate::iter::SessionIterator;
use crate::position::Position;
use crate::record::ChangeValue;
use crate::window::Windowed;

/// Session-windowed key-value store
///
/// Layers compose by wrapping: a decorator owns the next layer down and
/// implements this same trait. Every layer receives the outermost layer as
/// `root` in [`SessionStore::init`], so registration with the context happens
/// once per logical store no matter how many layers it has.
///
/// Mutations must be serialized by the caller (one writer per store);
/// reads may run concurrently with each other and with a writer.
pub trait SessionStore: Send + Sync {
    /// Name of the logical store
    fn name(&self) -> &str;

    /// Whether the bottom layer keeps its data across restarts
    fn persistent(&self) -> bool;

    /// Whether the store is initialized and not yet closed
    fn is_open(&self) -> bool;

    /// One-time setup
    ///
    /// `root` is the outermost layer of the chain this store belongs to.
    /// Decorators forward both arguments unchanged.
    fn init(&self, context: &Arc<StoreContext>, root: &dyn SessionStore) -> StoreResult<()>;

    /// Insert or overwrite the value of a session
    fn put(&self, key: &Windowed, value: Bytes) -> StoreResult<()>;

    /// Remove a session; removing an absent session is a no-op
    fn remove(&self, key: &Windowed) -> StoreResult<()>;

    /// Value of the session of `key` with exactly this window
    fn fetch_session(&self, key: &[u8], start: i64, end: i64) -> StoreResult<Option<Bytes>>;

    /// All sessions of `key`, most recent end first
    fn fetch(&self, key: &[u8]) -> StoreResult<SessionIterator>;

    /// All sessions of `key`, oldest end first
    fn backward_fetch(&self, key: &[u8]) -> StoreResult<SessionIterator>;

    /// All sessions whose key is in `[key_from, key_to]`
    fn fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator>;

    fn backward_fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator>;

    /// Sessions of `key` overlapping `[time_from, time_to]`
    fn find_sessions(&self, key: &[u8], time_from: i64, time_to: i64)
    -> StoreResult<SessionIterator>;

    fn backward_find_sessions(
        &self,
        key: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator>;

    /// Sessions with key in `[key_from, key_to]` overlapping `[time_from, time_to]`
    fn find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator>;

    fn backward_find_sessions_range(
        &self,
        key_from: &[u8],
        key_to: &[u8],
        time_from: i64,
        time_to: i64,
    ) -> StoreResult<SessionIterator>;

    /// Force buffered state to durable storage; blocks until done
    fn flush(&self) -> StoreResult<()>;

    /// Release resources; further operations fail with `StoreClosed`
    fn close(&self) -> StoreResult<()>;

    /// Position as of the most recently completed mutation
    fn position(&self) -> Position;
}

macro_rules! forward_session_store {
    ($ptr:ident) => {
        impl<S: SessionStore + ?Sized> SessionStore for $ptr<S> {
            fn name(&self) -> &str {
                (**self).name()
            }

            fn persistent(&self) -> bool {
                (**self).persistent()
            }

            fn is_open(&self) -> bool {
                (**self).is_open()
            }

            fn init(
                &self,
                context: &Arc<StoreContext>,
                root: &dyn SessionStore,
            ) -> StoreResult<()> {
                (**self).init(context, root)
            }

            fn put(&self, key: &Windowed, value: Bytes) -> StoreResult<()> {
                (**self).put(key, value)
            }

            fn remove(&self, key: &Windowed) -> StoreResult<()> {
                (**self).remove(key)
            }

            fn fetch_session(
                &self,
                key: &[u8],
                start: i64,
                end: i64,
            ) -> StoreResult<Option<Bytes>> {
                (**self).fetch_session(key, start, end)
            }

            fn fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
                (**self).fetch(key)
            }

            fn backward_fetch(&self, key: &[u8]) -> StoreResult<SessionIterator> {
                (**self).backward_fetch(key)
            }

            fn fetch_range(&self, key_from: &[u8], key_to: &[u8]) -> StoreResult<SessionIterator> {
                (**self).fetch_range(key_from, key_to)
            }

            fn backward_fetch_range(
                &self,
                key_from: &[u8],
                key_to: &[u8],
            ) -> StoreResult<SessionIterator> {
                (**self).backward_fetch_range(key_from, key_to)
            }

            fn find_sessions(
                &self,
                key: &[u8],
                time_from: i64,
                time_to: i64,
            ) -> StoreResult<SessionIterator> {
                (**self).find_sessions(key, time_from, time_to)
            }

            fn backward_find_sessions(
                &self,
                key: &[u8],
                time_from: i64,
                time_to: i64,
            ) -> StoreResult<SessionIterator> {
                (**self).backward_find_sessions(key, time_from, time_to)
            }

            fn find_sessions_range(
                &self,
                key_from: &[u8],
                key_to: &[u8],
                time_from: i64,
                time_to: i64,
            ) -> StoreResult<SessionIterator> {
                (**self).find_sessions_range(key_from, key_to, time_from, time_to)
            }

            fn backward_find_sessions_range(
                &self,
                key_from: &[u8],
                key_to: &[u8],
                time_from: i64,
                time_to: i64,
            ) -> StoreResult<SessionIterator> {
                (**self).backward_find_sessions_range(key_from, key_to, time_from, time_to)
            }

            fn flush(&self) -> StoreResult<()> {
                (**self).flush()
            }

            fn close(&self) -> StoreResult<()> {
                (**self).close()
            }

            fn position(&self) -> Position {
                (**self).position()
            }
        }
    };
}

forward_session_store!(Arc);
forward_session_store!(Box);

/// Append-only sink for changelog records
///
/// Called synchronously after every logged mutation; the caller does not
/// continue until this returns. Implementations may buffer or hand records to
/// another thread, as long as records for one store keep their call order.
pub trait ChangeLogger: Send + Sync {
    fn log_change(
        &self,
        store_name: &str,
        key: Bytes,
        value: ChangeValue,
        timestamp: i64,
        position: &Position,
    ) -> StoreResult<()>;
}

impl<L: ChangeLogger + ?Sized> ChangeLogger for Arc<L> {
    fn log_change(
        &self,
        store_name: &str,
        key: Bytes,
        value: ChangeValue,
        timestamp: i64,
        position: &Position,
    ) -> StoreResult<()> {
        (**self).log_change(store_name, key, value, timestamp, position)
    }
}
