//! Structured logging setup for Kestrel
//!
//! Every Kestrel crate logs through `tracing` macros with structured fields
//! (`store`, `key`, `position`, ...). This crate installs the subscriber that
//! turns those events into output.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines format for log aggregation (default)
//! - **Pretty Console**: Human-readable output for development
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//! - **Target Overrides**: Per-module levels, with `RUST_LOG` taking precedence
//!
//! # Quick Start
//!
//! ```ignore
//! use kestrel_logging::{KestrelSubscriberBuilder, LogConfig};
//!
//! // Simple setup with defaults (JSONL to console)
//! KestrelSubscriberBuilder::new().init();
//!
//! // Development mode with pretty human-readable output
//! KestrelSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//!
//! // Production: JSONL files, keep the guard alive until exit
//! let _guard = KestrelSubscriberBuilder::new()
//!     .with_config(LogConfig::production("/var/log/kestrel".into()))
//!     .try_init()?;
//! ```

pub mod config;
pub mod error;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use error::LoggingError;

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

macro_rules! json_layer {
    ($jsonl:expr) => {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span($jsonl.include_current_span)
            .with_span_list($jsonl.include_spans)
            .flatten_event($jsonl.flatten_events)
            .with_thread_ids($jsonl.include_thread_info)
            .with_file($jsonl.include_location)
            .with_line_number($jsonl.include_location)
    };
}

/// Builder for configuring and initializing the Kestrel logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct KestrelSubscriberBuilder {
    config: LogConfig,
}

impl KestrelSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    ///
    /// Default: JSONL output to console
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Build the level filter: `RUST_LOG` if set, the config otherwise
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.config.directives().join(","))
                .map_err(|e| LoggingError::InvalidFilter(e.to_string())),
        }
    }

    /// Initialize the subscriber globally
    ///
    /// Returns a guard that must be kept alive for the duration of the
    /// program when file output is enabled. Failures are reported on stderr.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// Returns an error if a global subscriber has already been set, the
    /// filter does not parse, or the log file cannot be created.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let registry = Registry::default().with(self.env_filter()?);
        let console = &self.config.console;
        let jsonl = &self.config.jsonl;

        // Separate match arms for pretty vs JSONL console satisfy the type system
        let guard = match (console.enabled, console.pretty, self.config.file.as_ref()) {
            // Pretty console + File
            (true, true, Some(file_config)) => {
                let (writer, guard) = file_writer(file_config)?;
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                registry
                    .with(console_layer)
                    .with(json_layer!(jsonl).with_writer(writer))
                    .try_init()?;
                Some(guard)
            }

            // JSONL console + File
            (true, false, Some(file_config)) => {
                let (writer, guard) = file_writer(file_config)?;
                registry
                    .with(json_layer!(jsonl))
                    .with(json_layer!(jsonl).with_writer(writer))
                    .try_init()?;
                Some(guard)
            }

            // Pretty console only
            (true, true, None) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(console.ansi)
                    .with_target(true);
                registry.with(console_layer).try_init()?;
                None
            }

            // JSONL console only (DEFAULT)
            (true, false, None) => {
                registry.with(json_layer!(jsonl)).try_init()?;
                None
            }

            // File only (no console)
            (false, _, Some(file_config)) => {
                let (writer, guard) = file_writer(file_config)?;
                registry
                    .with(json_layer!(jsonl).with_writer(writer))
                    .try_init()?;
                Some(guard)
            }

            // Nothing enabled - just the filter
            (false, _, None) => {
                registry.try_init()?;
                None
            }
        };

        Ok(guard)
    }
}

impl Default for KestrelSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a non-blocking file writer: truncates for `Never`, rolls otherwise
fn file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            fs::create_dir_all(&file_config.directory)?;
            let file_path = file_config
                .directory
                .join(format!("{}.log", file_config.prefix));
            let file = File::create(&file_path)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&file_config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = file_config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder
        .build(&file_config.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
///
/// This is a convenience function for quick setup.
pub fn init_default() {
    KestrelSubscriberBuilder::new().init();
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() {
    KestrelSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = KestrelSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = KestrelSubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
    }

    #[test]
    fn test_default_is_jsonl() {
        let builder = KestrelSubscriberBuilder::new();
        assert!(!builder.config().console.pretty); // JSONL by default
    }

    #[test]
    fn test_builder_with_config() {
        let builder = KestrelSubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config().default_level, "debug");
        assert!(builder.config().console.pretty);
    }

    #[test]
    fn test_builder_with_level_and_console() {
        let builder = KestrelSubscriberBuilder::new()
            .with_level("trace")
            .with_console(false);
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.enabled);
    }

    #[test]
    fn test_builder_with_file_output() {
        let builder =
            KestrelSubscriberBuilder::new().with_file_output(FileConfig::new("/tmp/kestrel-logs"));
        let file = builder.config().file.as_ref().unwrap();
        assert_eq!(file.rotation, RotationStrategy::Daily);
    }

    #[test]
    fn test_invalid_directive_is_rejected() {
        let filter = EnvFilter::try_new(
            LogConfig::default()
                .with_target("kestrel_core", "not-a-level")
                .directives()
                .join(","),
        );
        assert!(filter.is_err());
    }

    #[test]
    fn test_init_testing_is_repeatable() {
        init_testing();
        init_testing();
    }
}
