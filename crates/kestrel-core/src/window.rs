//! Session windows and windowed keys
//!
//! A session covers the first through last event time of an
//! inactivity-bounded burst of events for one key. Merging overlapping
//! sessions is the caller's job; nothing here enforces it.

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A closed time interval `[start, end]` in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionWindow {
    start: i64,
    end: i64,
}

impl SessionWindow {
    /// Create a session window, rejecting negative or inverted bounds
    pub fn new(start: i64, end: i64) -> Result<Self, StoreError> {
        if start < 0 || end < start {
            return Err(StoreError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// A window that spans a single event time
    pub fn instant(timestamp: i64) -> Result<Self, StoreError> {
        Self::new(timestamp, timestamp)
    }

    /// First event time in the session
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Last event time in the session
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Whether the window overlaps `[time_from, time_to]`
    pub fn overlaps(&self, time_from: i64, time_to: i64) -> bool {
        self.end >= time_from && self.start <= time_to
    }

    /// Whether `timestamp` falls inside the window
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

impl fmt::Display for SessionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A raw key paired with the session it belongs to
///
/// Ordering matches the store scan order: raw key ascending, then session
/// end descending, then session start descending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Windowed {
    key: Bytes,
    window: SessionWindow,
}

impl Windowed {
    pub fn new(key: impl Into<Bytes>, window: SessionWindow) -> Self {
        Self {
            key: key.into(),
            window,
        }
    }

    /// Convenience constructor validating the window bounds
    pub fn session(key: impl Into<Bytes>, start: i64, end: i64) -> Result<Self, StoreError> {
        Ok(Self::new(key, SessionWindow::new(start, end)?))
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn window(&self) -> SessionWindow {
        self.window
    }

    pub fn into_parts(self) -> (Bytes, SessionWindow) {
        (self.key, self.window)
    }
}

impl Ord for Windowed {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.window.end.cmp(&self.window.end))
            .then_with(|| other.window.start.cmp(&self.window.start))
    }
}

impl PartialOrd for Windowed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Windowed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", hex::encode(&self.key), self.window)
    }
}
