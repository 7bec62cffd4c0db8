//! Changelog sinks
//!
//! Implementations of [`kestrel_core::ChangeLogger`] that receive the records
//! emitted by the change-logging decorator.
//!
//! ## Sinks
//!
//! - [`InMemoryChangelog`]: collects records in a vector, with failure injection
//! - [`FileChangelog`]: one append-only file per store, replayable after restart
//! - [`ChannelChangelog`]: forwards to a background writer over a tokio channel
//!
//! ## File frame format
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ len: u32 BE  │ postcard(ChangelogFrame)                     │
//! │              │   sequence, appended_at_millis, LogRecord    │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```

mod channel;
mod file;
mod memory;

pub use channel::{ChannelChangelog, spawn_writer};
pub use file::{FileChangelog, FileChangelogConfig};
pub use memory::InMemoryChangelog;
