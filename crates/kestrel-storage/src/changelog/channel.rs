//! Channel changelog
//!
//! Hands records to a background writer over an unbounded tokio channel, so
//! the processing thread never blocks on the downstream sink. The writer
//! drains the channel into any other [`ChangeLogger`].

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kestrel_core::{ChangeLogger, ChangeValue, LogRecord, Position, StoreError, StoreResult};

/// [`ChangeLogger`] that forwards records to a channel
#[derive(Debug, Clone)]
pub struct ChannelChangelog {
    sender: mpsc::UnboundedSender<LogRecord>,
}

impl ChannelChangelog {
    /// Create the changelog and the receiving half of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl ChangeLogger for ChannelChangelog {
    fn log_change(
        &self,
        store_name: &str,
        key: Bytes,
        value: ChangeValue,
        timestamp: i64,
        position: &Position,
    ) -> StoreResult<()> {
        self.sender
            .send(LogRecord::new(
                store_name,
                key,
                value,
                timestamp,
                position.clone(),
            ))
            .map_err(|_| StoreError::ChangelogClosed)
    }
}

/// Spawn a blocking task that writes every received record to `sink`
///
/// The task ends when all senders are dropped, returning the number of
/// records written, or with the first sink error.
pub fn spawn_writer(
    mut receiver: mpsc::UnboundedReceiver<LogRecord>,
    sink: Arc<dyn ChangeLogger>,
) -> JoinHandle<StoreResult<u64>> {
    tokio::task::spawn_blocking(move || {
        let mut written = 0u64;
        while let Some(record) = receiver.blocking_recv() {
            if let Err(e) = sink.log_change(
                &record.store_name,
                record.key,
                record.value,
                record.timestamp,
                &record.position,
            ) {
                warn!(store = %record.store_name, error = %e, written, "Changelog writer stopped");
                receiver.close();
                return Err(e);
            }
            written += 1;
            debug!(store = %record.store_name, written, "Forwarded changelog record");
        }
        info!(written, "Changelog writer finished");
        Ok(written)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryChangelog;

    #[tokio::test]
    async fn test_writer_forwards_records() {
        let (changelog, receiver) = ChannelChangelog::new();
        let sink = Arc::new(InMemoryChangelog::new());
        let handle = spawn_writer(receiver, sink.clone());

        for ts in 0..5 {
            changelog
                .log_change(
                    "sessions",
                    Bytes::from(vec![ts as u8]),
                    ChangeValue::Value(Bytes::from_static(b"v")),
                    ts,
                    &Position::empty(),
                )
                .unwrap();
        }
        drop(changelog);

        assert_eq!(handle.await.unwrap().unwrap(), 5);
        let timestamps: Vec<_> = sink.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (changelog, receiver) = ChannelChangelog::new();
        drop(receiver);
        assert!(changelog.is_closed());
        let result = changelog.log_change(
            "sessions",
            Bytes::new(),
            ChangeValue::Tombstone,
            0,
            &Position::empty(),
        );
        assert_eq!(result, Err(StoreError::ChangelogClosed));
    }

    #[tokio::test]
    async fn test_writer_stops_on_sink_error() {
        let (changelog, receiver) = ChannelChangelog::new();
        let sink = Arc::new(InMemoryChangelog::new());
        sink.fail_next("disk full");
        let handle = spawn_writer(receiver, sink.clone());

        changelog
            .log_change("sessions", Bytes::new(), ChangeValue::Tombstone, 0, &Position::empty())
            .unwrap();

        let result = handle.await.unwrap();
        assert_eq!(result, Err(StoreError::Changelog("disk full".to_string())));
        assert!(changelog.is_closed());
    }
}
