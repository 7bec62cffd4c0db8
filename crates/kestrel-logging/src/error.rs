//! Error types for logging setup

use thiserror::Error;

/// Errors that can occur while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A level or target directive did not parse
    #[error("Invalid filter directive: {0}")]
    InvalidFilter(String),

    /// The log directory or file could not be created
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The rolling file appender could not be built
    #[error("Failed to create rolling appender: {0}")]
    Appender(String),

    /// A global subscriber is already installed
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

impl From<tracing_subscriber::util::TryInitError> for LoggingError {
    fn from(err: tracing_subscriber::util::TryInitError) -> Self {
        LoggingError::AlreadyInitialized(err.to_string())
    }
}
