//! Store configuration and assembly
//!
//! ```text
//! MeteredSessionStore
//!   └─ ChangeLoggingSessionStore   (omitted when logging is disabled)
//!        └─ InMemorySessionStore
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kestrel_core::{ChangeLogger, SessionStore, StoreResult};

use crate::{ChangeLoggingSessionStore, InMemorySessionStore, MeteredSessionStore};

/// A fully assembled store chain
pub type ConfiguredSessionStore = MeteredSessionStore<Box<dyn SessionStore>>;

/// Configuration for one session store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStoreConfig {
    /// Name of the logical store
    pub name: String,
    /// How long a session is kept after stream time passes its end
    pub retention_ms: i64,
    /// Whether mutations are written to the changelog
    pub logging_enabled: bool,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            name: "sessions".to_string(),
            retention_ms: i64::MAX, // keep forever
            logging_enabled: true,
        }
    }
}

impl SessionStoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_retention_ms(mut self, retention_ms: i64) -> Self {
        self.retention_ms = retention_ms;
        self
    }

    pub fn with_logging_enabled(mut self, logging_enabled: bool) -> Self {
        self.logging_enabled = logging_enabled;
        self
    }

    /// Create the bottom layer described by this config
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` unless `retention_ms` is positive.
    pub fn engine(&self) -> StoreResult<InMemorySessionStore> {
        InMemorySessionStore::with_retention(self.name.clone(), self.retention_ms)
    }

    /// Assemble a fresh store chain
    pub fn build(&self, changelog: Arc<dyn ChangeLogger>) -> StoreResult<ConfiguredSessionStore> {
        Ok(self.wrap(self.engine()?, changelog))
    }

    /// Assemble a chain on top of an existing engine, e.g. one just restored
    pub fn wrap(
        &self,
        engine: InMemorySessionStore,
        changelog: Arc<dyn ChangeLogger>,
    ) -> ConfiguredSessionStore {
        let store: Box<dyn SessionStore> = if self.logging_enabled {
            Box::new(ChangeLoggingSessionStore::new(engine, changelog))
        } else {
            Box::new(engine)
        };
        debug!(
            store = %self.name,
            retention_ms = self.retention_ms,
            logging_enabled = self.logging_enabled,
            "Assembled session store"
        );
        MeteredSessionStore::new(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryChangelog;
    use bytes::Bytes;
    use kestrel_core::{StoreContext, StoreError, Windowed};

    #[test]
    fn test_config_default() {
        let config = SessionStoreConfig::default();
        assert_eq!(config.name, "sessions");
        assert_eq!(config.retention_ms, i64::MAX);
        assert!(config.logging_enabled);
    }

    #[test]
    fn test_build_logs_when_enabled() {
        let changelog = Arc::new(InMemoryChangelog::new());
        let store = SessionStoreConfig::new("clicks")
            .build(changelog.clone())
            .unwrap();
        store
            .init_as_root(&Arc::new(StoreContext::new("app", 0)))
            .unwrap();

        let key = Windowed::session(b"user".to_vec(), 0, 10).unwrap();
        store.put(&key, Bytes::from_static(b"1")).unwrap();

        assert_eq!(changelog.records_for("clicks").len(), 1);
        assert_eq!(store.metrics().puts, 1);
    }

    #[test]
    fn test_build_skips_logging_when_disabled() {
        let changelog = Arc::new(InMemoryChangelog::new());
        let store = SessionStoreConfig::new("clicks")
            .with_logging_enabled(false)
            .build(changelog.clone())
            .unwrap();
        store
            .init_as_root(&Arc::new(StoreContext::new("app", 0)))
            .unwrap();

        let key = Windowed::session(b"user".to_vec(), 0, 10).unwrap();
        store.put(&key, Bytes::from_static(b"1")).unwrap();

        assert!(changelog.is_empty());
        assert_eq!(
            store.fetch_session(b"user", 0, 10).unwrap(),
            Some(Bytes::from_static(b"1"))
        );
    }

    #[test]
    fn test_build_rejects_non_positive_retention() {
        let changelog = Arc::new(InMemoryChangelog::new());
        for retention in [-1, 0] {
            let result = SessionStoreConfig::new("clicks")
                .with_retention_ms(retention)
                .build(changelog.clone());
            assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
        }
        assert!(changelog.is_empty());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = SessionStoreConfig::new("clicks").with_retention_ms(60_000);
        let bytes = postcard::to_allocvec(&config).unwrap();
        let decoded: SessionStoreConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
