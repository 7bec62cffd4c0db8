//! # Kestrel Storage
//!
//! Session store implementations for Kestrel.
//!
//! This crate provides the in-memory session store engine, the decorators
//! stacked on top of it, and the changelog sinks that make a store
//! recoverable.
//!
//! ## Features
//!
//! - **InMemorySessionStore**: Ordered in-memory engine with retention
//! - **ChangeLoggingSessionStore**: Logs every put and remove to a changelog
//! - **MeteredSessionStore**: Operation counters and latency tracing
//! - **Changelog sinks**: In-memory, file-backed and channel-backed
//! - **restore**: Rebuilds an engine by replaying its changelog
//! - **SessionStoreConfig**: Assembles the layered store from config
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use kestrel_core::{RecordMetadata, SessionStore, StoreContext, Windowed};
//! use kestrel_storage::{InMemoryChangelog, SessionStoreConfig};
//!
//! let changelog = Arc::new(InMemoryChangelog::new());
//! let store = SessionStoreConfig::new("clicks").build(changelog.clone()).unwrap();
//!
//! let context = Arc::new(StoreContext::new("app", 0));
//! store.init_as_root(&context).unwrap();
//!
//! // The processing thread publishes the record being processed
//! context.set_record_metadata(RecordMetadata::new("clicks-input", 0, 42));
//!
//! let key = Windowed::session(b"user-1".to_vec(), 1_000, 5_000).unwrap();
//! store.put(&key, Bytes::from_static(b"3")).unwrap();
//!
//! let record = &changelog.records()[0];
//! assert_eq!(record.timestamp, 5_000);
//! assert_eq!(record.position.offset("clicks-input", 0), Some(42));
//! ```

pub mod change_logging;
pub mod changelog;
pub mod config;
pub mod memory;
pub mod metered;
pub mod restore;

// Re-exports
pub use change_logging::ChangeLoggingSessionStore;
pub use changelog::{
    ChannelChangelog, FileChangelog, FileChangelogConfig, InMemoryChangelog, spawn_writer,
};
pub use config::{ConfiguredSessionStore, SessionStoreConfig};
pub use memory::InMemorySessionStore;
pub use metered::{MeteredSessionStore, StoreMetrics};
pub use restore::{RestoreSummary, restore};

// Re-export the store contract from kestrel-core for convenience
pub use kestrel_core::{ChangeLogger, SessionStore};
