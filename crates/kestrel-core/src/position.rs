//! Consistency positions
//!
//! A [`Position`] records, per source topic partition, the highest input
//! offset whose effect is visible in a store. Positions are immutable values;
//! every update returns a new position that shares nothing mutable with the
//! old one, so a snapshot handed to a changelog can never change under it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifies one partition of a source topic
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourcePartition {
    pub topic: String,
    pub partition: u32,
}

impl SourcePartition {
    pub fn new(topic: impl Into<String>, partition: u32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for SourcePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Immutable offset vector keyed by source partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    offsets: Arc<BTreeMap<SourcePartition, u64>>,
}

impl Position {
    /// The position of a store that has seen no input
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_offsets(offsets: impl IntoIterator<Item = (SourcePartition, u64)>) -> Self {
        let mut map = BTreeMap::new();
        for (source, offset) in offsets {
            let entry = map.entry(source).or_insert(offset);
            *entry = (*entry).max(offset);
        }
        Self {
            offsets: Arc::new(map),
        }
    }

    /// Return a position that also reflects `offset` from `topic`/`partition`
    ///
    /// An offset lower than the one already recorded is ignored, so positions
    /// never move backwards for a source.
    pub fn with_component(&self, topic: &str, partition: u32, offset: u64) -> Self {
        let source = SourcePartition::new(topic, partition);
        if self.offsets.get(&source).is_some_and(|current| *current >= offset) {
            return self.clone();
        }
        let mut map = (*self.offsets).clone();
        map.insert(source, offset);
        Self {
            offsets: Arc::new(map),
        }
    }

    /// Pointwise maximum of two positions
    pub fn merge(&self, other: &Position) -> Self {
        if other.is_empty() || Arc::ptr_eq(&self.offsets, &other.offsets) {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut map = (*self.offsets).clone();
        for (source, offset) in other.offsets.iter() {
            let entry = map.entry(source.clone()).or_insert(*offset);
            *entry = (*entry).max(*offset);
        }
        Self {
            offsets: Arc::new(map),
        }
    }

    pub fn offset(&self, topic: &str, partition: u32) -> Option<u64> {
        self.offsets.get(&SourcePartition::new(topic, partition)).copied()
    }

    /// Whether every source in `other` is at or behind this position
    pub fn dominates(&self, other: &Position) -> bool {
        other
            .offsets
            .iter()
            .all(|(source, offset)| self.offsets.get(source).is_some_and(|o| o >= offset))
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        let mut last: Option<&str> = None;
        self.offsets.keys().filter_map(move |source| {
            let topic = source.topic.as_str();
            if last == Some(topic) {
                None
            } else {
                last = Some(topic);
                Some(topic)
            }
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourcePartition, u64)> {
        self.offsets.iter().map(|(source, offset)| (source, *offset))
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (source, offset)) in self.offsets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{source}: {offset}")?;
        }
        write!(f, "}}")
    }
}
