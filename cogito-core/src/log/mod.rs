//! Durable, ordered event log.
//!
//! The log is keyed by `(blockNumber, logIndex)`. Appends are idempotent
//! per key: an existing key is left untouched. Callers decide what counts
//! as a duplicate or a conflict before appending.

mod postgres;

pub use postgres::{ChainEventInsert, PgEventLog};

use std::collections::BTreeMap;

use async_trait::async_trait;
use cogito_sdk::objects::{ChainEvent, EventKey};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("event {key} does not fit the storage column: {field}")]
    OutOfRange { key: EventKey, field: &'static str },
}

/// Storage backend for chain events.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Every stored event, in key order.
    async fn load(&self) -> Result<Vec<ChainEvent>, LogError>;

    /// Store `events`, skipping keys that already exist. Returns how many
    /// were actually written.
    async fn append(&self, events: &[ChainEvent]) -> Result<u64, LogError>;

    /// Delete every event with `block_number > above_block`. Returns how
    /// many were removed.
    async fn retract_above(&self, above_block: u64) -> Result<u64, LogError>;
}

/// In-process log for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<BTreeMap<EventKey, ChainEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn load(&self) -> Result<Vec<ChainEvent>, LogError> {
        Ok(self.events.lock().await.values().cloned().collect())
    }

    async fn append(&self, events: &[ChainEvent]) -> Result<u64, LogError> {
        let mut guard = self.events.lock().await;
        let mut written = 0;
        for event in events {
            if let std::collections::btree_map::Entry::Vacant(slot) = guard.entry(event.key()) {
                slot.insert(event.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn retract_above(&self, above_block: u64) -> Result<u64, LogError> {
        let mut guard = self.events.lock().await;
        let doomed = guard.split_off(&EventKey::new(above_block.saturating_add(1), 0));
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogito_sdk::objects::{EventPayload, TransferId};

    fn stored(block: u64, log_index: u32) -> ChainEvent {
        ChainEvent {
            block_number: block,
            log_index,
            block_timestamp: block as i64,
            tx_hash: format!("0x{block:x}{log_index:x}"),
            payload: EventPayload::TransferStored {
                transfer_id: TransferId::from("T1"),
            },
        }
    }

    #[tokio::test]
    async fn test_memory_log_is_ordered_and_idempotent() {
        let log = MemoryEventLog::new();
        assert_eq!(log.append(&[stored(5, 1), stored(3, 0)]).await.unwrap(), 2);
        assert_eq!(log.append(&[stored(5, 1), stored(4, 2)]).await.unwrap(), 1);

        let keys: Vec<EventKey> = log.load().await.unwrap().iter().map(ChainEvent::key).collect();
        assert_eq!(
            keys,
            vec![EventKey::new(3, 0), EventKey::new(4, 2), EventKey::new(5, 1)]
        );
    }

    #[tokio::test]
    async fn test_memory_log_retract_above() {
        let log = MemoryEventLog::new();
        log.append(&[stored(1, 0), stored(2, 0), stored(2, 7), stored(3, 0)])
            .await
            .unwrap();

        assert_eq!(log.retract_above(1).await.unwrap(), 3);
        assert_eq!(log.load().await.unwrap().len(), 1);
        assert_eq!(log.retract_above(u64::MAX).await.unwrap(), 0);
    }
}
