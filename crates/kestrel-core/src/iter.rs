//! Iterators returned by session store reads
//!
//! Iterators are single-consumer resources that hold a cursor on the store.
//! `close` releases the cursor; calling it more than once is a no-op, and
//! dropping an iterator closes it.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::StoreResult;
use crate::window::Windowed;

/// A session and its value as yielded by store reads
pub type SessionEntry = (Windowed, Bytes);

/// Scoped iterator over session store entries
pub trait KeyValueIterator: Iterator<Item = StoreResult<SessionEntry>> + Send {
    /// Key of the entry the next call to `next` will yield, without consuming it
    fn peek_next_key(&mut self) -> Option<StoreResult<Windowed>>;

    /// Release the iterator's resources; idempotent
    fn close(&mut self);
}

/// Boxed iterator handed out by the `SessionStore` trait
pub type SessionIterator = Box<dyn KeyValueIterator>;

/// Iterator over a materialized list of entries
#[derive(Debug, Default)]
pub struct EntryIterator {
    entries: VecDeque<SessionEntry>,
    closed: bool,
}

impl EntryIterator {
    pub fn new(entries: impl IntoIterator<Item = SessionEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            closed: false,
        }
    }

    /// An iterator that yields nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn boxed(self) -> SessionIterator {
        Box::new(self)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Iterator for EntryIterator {
    type Item = StoreResult<SessionEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.entries.pop_front().map(Ok)
    }
}

impl KeyValueIterator for EntryIterator {
    fn peek_next_key(&mut self) -> Option<StoreResult<Windowed>> {
        if self.closed {
            return None;
        }
        self.entries.front().map(|(key, _)| Ok(key.clone()))
    }

    fn close(&mut self) {
        self.closed = true;
        self.entries.clear();
    }
}
