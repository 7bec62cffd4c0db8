//! Store context shared by every layer of a store
//!
//! The processing thread publishes the metadata of the input record it is
//! working on; store implementations read it to advance their position. The
//! context also keeps the registry of logical stores, keyed by the name of
//! the outermost layer each store chain registered.

use std::fmt;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Source coordinates of the input record being processed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

impl RecordMetadata {
    pub fn new(topic: impl Into<String>, partition: u32, offset: u64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

impl fmt::Display for RecordMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}@{}", self.topic, self.partition, self.offset)
    }
}

/// A logical store as registered by its root layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRegistration {
    pub name: String,
    pub persistent: bool,
}

/// Per-task handle passed to `SessionStore::init`
#[derive(Debug)]
pub struct StoreContext {
    application_id: String,
    task_partition: u32,
    record_metadata: RwLock<Option<RecordMetadata>>,
    stores: DashMap<String, StoreRegistration>,
}

impl StoreContext {
    pub fn new(application_id: impl Into<String>, task_partition: u32) -> Self {
        Self {
            application_id: application_id.into(),
            task_partition,
            record_metadata: RwLock::new(None),
            stores: DashMap::new(),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn task_partition(&self) -> u32 {
        self.task_partition
    }

    /// Publish the record currently being processed
    pub fn set_record_metadata(&self, metadata: RecordMetadata) {
        *self.record_metadata.write() = Some(metadata);
    }

    pub fn clear_record_metadata(&self) {
        *self.record_metadata.write() = None;
    }

    pub fn record_metadata(&self) -> Option<RecordMetadata> {
        self.record_metadata.read().clone()
    }

    /// Register a logical store under its root layer's name
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if a store with this name was registered
    /// before.
    pub fn register_store(&self, name: &str, persistent: bool) -> StoreResult<()> {
        match self.stores.entry(name.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyRegistered(name.to_string())),
            Entry::Vacant(entry) => {
                debug!(store = name, persistent, "Registered store");
                entry.insert(StoreRegistration {
                    name: name.to_string(),
                    persistent,
                });
                Ok(())
            }
        }
    }

    pub fn registration(&self, name: &str) -> Option<StoreRegistration> {
        self.stores.get(name).map(|entry| entry.value().clone())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Names of all registered stores, sorted
    pub fn registered_stores(&self) -> Vec<String> {
        let mut names: Vec<_> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}
