//! In-memory changelog
//!
//! Keeps records in call order. Suitable for testing and simulation.

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use kestrel_core::{ChangeLogger, ChangeValue, LogRecord, Position, StoreError, StoreResult};

/// [`ChangeLogger`] that collects records in memory
#[derive(Debug, Default)]
pub struct InMemoryChangelog {
    records: Mutex<Vec<LogRecord>>,
    /// Error to return from the next `log_change` call
    fail_next: Mutex<Option<String>>,
}

impl InMemoryChangelog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records logged so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Records logged for one store
    pub fn records_for(&self, store_name: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.store_name == store_name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Remove and return all records
    pub fn drain(&self) -> Vec<LogRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Make the next `log_change` call fail with `message`
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }
}

impl ChangeLogger for InMemoryChangelog {
    fn log_change(
        &self,
        store_name: &str,
        key: Bytes,
        value: ChangeValue,
        timestamp: i64,
        position: &Position,
    ) -> StoreResult<()> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(StoreError::changelog(message));
        }
        let mut records = self.records.lock();
        trace!(store = store_name, sequence = records.len(), "Recorded change");
        records.push(LogRecord::new(
            store_name,
            key,
            value,
            timestamp,
            position.clone(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_call_order() {
        let changelog = InMemoryChangelog::new();
        for i in 0..3 {
            changelog
                .log_change(
                    if i == 1 { "other" } else { "sessions" },
                    Bytes::from(vec![i as u8]),
                    ChangeValue::Tombstone,
                    i,
                    &Position::empty(),
                )
                .unwrap();
        }
        let timestamps: Vec<_> = changelog.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2]);
        assert_eq!(changelog.records_for("sessions").len(), 2);
    }

    #[test]
    fn test_fail_next_fails_once() {
        let changelog = InMemoryChangelog::new();
        changelog.fail_next("boom");
        let first = changelog.log_change(
            "s",
            Bytes::new(),
            ChangeValue::Tombstone,
            0,
            &Position::empty(),
        );
        assert_eq!(first, Err(StoreError::Changelog("boom".to_string())));
        assert!(changelog.is_empty());

        changelog
            .log_change("s", Bytes::new(), ChangeValue::Tombstone, 0, &Position::empty())
            .unwrap();
        assert_eq!(changelog.drain().len(), 1);
        assert!(changelog.is_empty());
    }
}
