//! Changelog values and records

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Value carried by a changelog record
///
/// A tombstone marks an explicit removal. It is distinct from a key that was
/// never written, which simply never shows up in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeValue {
    Value(Bytes),
    Tombstone,
}

impl ChangeValue {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, ChangeValue::Tombstone)
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ChangeValue::Value(bytes) => Some(bytes),
            ChangeValue::Tombstone => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            ChangeValue::Value(bytes) => Some(bytes),
            ChangeValue::Tombstone => None,
        }
    }
}

impl From<Bytes> for ChangeValue {
    fn from(bytes: Bytes) -> Self {
        ChangeValue::Value(bytes)
    }
}

impl From<Option<Bytes>> for ChangeValue {
    fn from(value: Option<Bytes>) -> Self {
        value.map_or(ChangeValue::Tombstone, ChangeValue::Value)
    }
}

/// One mutation as it appears in a store's changelog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Name of the logical store the mutation belongs to
    pub store_name: String,
    /// Key in changelog binary form
    pub key: Bytes,
    pub value: ChangeValue,
    /// Session end of the mutated key
    pub timestamp: i64,
    /// Store position observed right after the mutation
    pub position: Position,
}

impl LogRecord {
    pub fn new(
        store_name: impl Into<String>,
        key: Bytes,
        value: ChangeValue,
        timestamp: i64,
        position: Position,
    ) -> Self {
        Self {
            store_name: store_name.into(),
            key,
            value,
            timestamp,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_value_from_option() {
        assert_eq!(ChangeValue::from(None), ChangeValue::Tombstone);
        let value = ChangeValue::from(Some(Bytes::from_static(b"v")));
        assert_eq!(value.as_bytes().map(|b| b.as_ref()), Some(&b"v"[..]));
        assert!(!value.is_tombstone());
    }

    #[test]
    fn test_empty_value_is_not_a_tombstone() {
        let value = ChangeValue::from(Bytes::new());
        assert!(!value.is_tombstone());
        assert_eq!(value.into_bytes(), Some(Bytes::new()));
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = LogRecord::new(
            "sessions",
            Bytes::from_static(b"key"),
            ChangeValue::Tombstone,
            7,
            Position::empty().with_component("input", 0, 3),
        );
        let bytes = postcard::to_allocvec(&record).unwrap();
        let decoded: LogRecord = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);
    }
}
