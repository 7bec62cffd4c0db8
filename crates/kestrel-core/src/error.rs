//! Error types for Kestrel stores
//!
//! A single error type is shared by stores, decorators, the key codec and
//! changelog sinks. Decorators return inner errors untouched, so the variant
//! a caller sees always names the layer that produced it.

use thiserror::Error;

/// Errors that can occur in session store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Raw key is longer than the codec can address
    #[error("Key too large: {len} bytes exceeds maximum of {max}")]
    KeyTooLarge { len: usize, max: usize },

    /// Encoded key bytes could not be decoded
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// Operation attempted on a closed store or an invalidated iterator
    #[error("Store is closed: {0}")]
    StoreClosed(String),

    /// Session window bounds are negative or inverted
    #[error("Invalid session window: start {start}, end {end}")]
    InvalidWindow { start: i64, end: i64 },

    /// Store configuration is out of range
    #[error("Invalid store config: {0}")]
    InvalidConfig(String),

    /// Store was used before `init`
    #[error("Store not initialized: {0}")]
    NotInitialized(String),

    /// A store with this name is already registered with the context
    #[error("Store already registered: {0}")]
    AlreadyRegistered(String),

    /// I/O error in a store or changelog
    #[error("I/O error: {0}")]
    Io(String),

    /// Error during (de)serialization of a changelog frame
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The changelog sink rejected a record
    #[error("Changelog error: {0}")]
    Changelog(String),

    /// The changelog sink has shut down
    #[error("Changelog closed")]
    ChangelogClosed,
}

impl StoreError {
    /// Create a new MalformedKey error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedKey(message.into())
    }

    /// Create a new StoreClosed error for the named store
    pub fn closed(store: impl Into<String>) -> Self {
        Self::StoreClosed(store.into())
    }

    /// Create a new Changelog error
    pub fn changelog(message: impl Into<String>) -> Self {
        Self::Changelog(message.into())
    }

    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<postcard::Error> for StoreError {
    fn from(err: postcard::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
