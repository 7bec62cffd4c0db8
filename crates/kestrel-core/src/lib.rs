//! # Kestrel Core
//!
//! Core types, traits, and errors for Kestrel session stores.
//!
//! ## Key Traits
//!
//! - [`SessionStore`]: Session-windowed store, implemented by engines and decorators alike
//! - [`ChangeLogger`]: Sink for changelog records
//! - [`KeyValueIterator`]: Scoped iterator returned by store reads
//!
//! ## Key Types
//!
//! - [`Windowed`] / [`SessionWindow`]: Session store keys
//! - [`SessionKeySchema`]: Binary and ordered encodings of windowed keys
//! - [`Position`]: Per-source offset vector reflected by a store
//! - [`LogRecord`] / [`ChangeValue`]: Changelog records and tombstones
//! - [`StoreContext`]: Per-task context handed to `SessionStore::init`

pub mod codec;
pub mod context;
pub mod error;
pub mod iter;
pub mod position;
pub mod record;
pub mod traits;
pub mod window;

// Re-export main types
pub use codec::*;
pub use context::*;
pub use error::*;
pub use iter::*;
pub use position::*;
pub use record::*;
pub use traits::*;
pub use window::*;
