//! Rebuilding a store from its changelog
//!
//! Records are applied in order: a value becomes a put of the decoded
//! windowed key, a tombstone a remove. The store's position is the
//! pointwise merge of every applied record's position. Records belonging to
//! other stores are skipped. Once the records are applied, sessions outside
//! the store's retention are dropped.
//!
//! Restore runs before the store is wrapped and initialized, so nothing is
//! re-logged and the context's record metadata is not consulted.

use tracing::{debug, info};

use kestrel_core::{ChangeValue, LogRecord, Position, SessionKeySchema, SessionStore, StoreResult};

use crate::InMemorySessionStore;

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Value records applied as puts
    pub applied: u64,
    /// Tombstones applied as removes
    pub tombstones: u64,
    /// Records for other stores
    pub skipped: u64,
    /// Merged position of the applied records
    pub position: Position,
}

impl RestoreSummary {
    /// Total records applied to the store
    pub fn total(&self) -> u64 {
        self.applied + self.tombstones
    }
}

/// Replay `records` into `store`
///
/// Fails on the first record whose key does not decode, leaving the records
/// before it applied and their positions merged. Retention is applied to
/// whatever was replayed, so the rebuilt store holds the sessions the
/// logging store held.
pub fn restore<I>(store: &InMemorySessionStore, records: I) -> StoreResult<RestoreSummary>
where
    I: IntoIterator<Item = LogRecord>,
{
    let mut summary = RestoreSummary::default();
    let replayed = replay(store, records, &mut summary);
    let expired = store.expire_retained();
    replayed?;

    if summary.skipped > 0 {
        debug!(store = store.name(), skipped = summary.skipped, "Skipped foreign records");
    }
    info!(
        store = store.name(),
        applied = summary.applied,
        tombstones = summary.tombstones,
        expired,
        sessions = store.len(),
        position = %summary.position,
        "Restored session store from changelog"
    );
    Ok(summary)
}

fn replay<I>(
    store: &InMemorySessionStore,
    records: I,
    summary: &mut RestoreSummary,
) -> StoreResult<()>
where
    I: IntoIterator<Item = LogRecord>,
{
    for record in records {
        if record.store_name != store.name() {
            summary.skipped += 1;
            continue;
        }

        let key = SessionKeySchema::from_binary(&record.key)?;
        match record.value {
            ChangeValue::Value(value) => {
                store.restore_put(&key, value)?;
                summary.applied += 1;
            }
            ChangeValue::Tombstone => {
                store.restore_remove(&key)?;
                summary.tombstones += 1;
            }
        }
        store.merge_position(&record.position);
        summary.position = summary.position.merge(&record.position);
    }
    Ok(())
}
