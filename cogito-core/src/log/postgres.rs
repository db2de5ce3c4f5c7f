//! Postgres-backed event log.
//!
//! Events live in `chain_events`, one row per `(block_number, log_index)`.
//! The full event is kept as JSONB; the key columns drive ordering and
//! retraction.

use async_trait::async_trait;
use cogito_sdk::objects::{ChainEvent, EventKey};
use kanau::processor::Processor;
use sqlx::types::Json;

use super::{EventLog, LogError};
use crate::framework::DatabaseProcessor;

/// Row data for one insert, already converted to column types.
#[derive(Debug, Clone)]
pub struct ChainEventInsert {
    pub block_number: i64,
    pub log_index: i32,
    pub event_type: &'static str,
    pub tx_hash: String,
    pub block_timestamp: i64,
    pub payload: Json<ChainEvent>,
}

impl TryFrom<&ChainEvent> for ChainEventInsert {
    type Error = LogError;

    fn try_from(event: &ChainEvent) -> Result<Self, LogError> {
        let key = event.key();
        Ok(Self {
            block_number: i64::try_from(event.block_number).map_err(|_| LogError::OutOfRange {
                key,
                field: "block_number",
            })?,
            log_index: i32::try_from(event.log_index).map_err(|_| LogError::OutOfRange {
                key,
                field: "log_index",
            })?,
            event_type: event.kind().as_str(),
            tx_hash: event.tx_hash.clone(),
            block_timestamp: event.block_timestamp,
            payload: Json(event.clone()),
        })
    }
}

#[derive(Debug, Clone)]
/// Insert events in a single statement.
///
/// Uses `ON CONFLICT DO NOTHING`; returns the number of rows actually
/// inserted.
pub struct AppendChainEvents {
    pub events: Vec<ChainEventInsert>,
}

impl Processor<AppendChainEvents> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AppendChainEvents")]
    async fn process(&self, insert: AppendChainEvents) -> Result<u64, sqlx::Error> {
        if insert.events.is_empty() {
            return Ok(0);
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO chain_events \
             (block_number, log_index, event_type, tx_hash, block_timestamp, payload) ",
        );
        query_builder.push_values(insert.events, |mut b, row| {
            b.push_bind(row.block_number)
                .push_bind(row.log_index)
                .push_bind(row.event_type)
                .push_bind(row.tx_hash)
                .push_bind(row.block_timestamp)
                .push_bind(row.payload);
        });
        query_builder.push(" ON CONFLICT (block_number, log_index) DO NOTHING");

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, Copy)]
/// Load the whole log in key order.
pub struct LoadChainEvents;

impl Processor<LoadChainEvents> for DatabaseProcessor {
    type Output = Vec<ChainEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:LoadChainEvents")]
    async fn process(&self, _query: LoadChainEvents) -> Result<Vec<ChainEvent>, sqlx::Error> {
        let rows: Vec<(Json<ChainEvent>,)> = sqlx::query_as(
            "SELECT payload FROM chain_events ORDER BY block_number ASC, log_index ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(Json(event),)| event).collect())
    }
}

#[derive(Debug, Clone, Copy)]
/// Delete every event strictly above `above_block`.
pub struct RetractChainEventsAbove {
    pub above_block: i64,
}

impl Processor<RetractChainEventsAbove> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RetractChainEventsAbove")]
    async fn process(&self, retract: RetractChainEventsAbove) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chain_events WHERE block_number > $1")
            .bind(retract.above_block)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// [`EventLog`] over the `chain_events` table.
pub struct PgEventLog {
    db: DatabaseProcessor,
}

impl PgEventLog {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn load(&self) -> Result<Vec<ChainEvent>, LogError> {
        Ok(self.db.process(LoadChainEvents).await?)
    }

    async fn append(&self, events: &[ChainEvent]) -> Result<u64, LogError> {
        let rows = events
            .iter()
            .map(ChainEventInsert::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.db.process(AppendChainEvents { events: rows }).await?)
    }

    async fn retract_above(&self, above_block: u64) -> Result<u64, LogError> {
        // Every stored block number fits in i64, so clamping keeps the meaning.
        let above_block = i64::try_from(above_block).unwrap_or(i64::MAX);
        Ok(self
            .db
            .process(RetractChainEventsAbove { above_block })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogito_sdk::objects::{EventPayload, TransferId};

    #[test]
    fn test_insert_row_rejects_oversized_block() {
        let event = ChainEvent {
            block_number: u64::MAX,
            log_index: 0,
            block_timestamp: 0,
            tx_hash: "0x1".to_string(),
            payload: EventPayload::TransferStored {
                transfer_id: TransferId::from("T1"),
            },
        };
        assert!(matches!(
            ChainEventInsert::try_from(&event),
            Err(LogError::OutOfRange {
                field: "block_number",
                ..
            })
        ));

        let ok = ChainEvent {
            block_number: 12,
            ..event
        };
        let row = ChainEventInsert::try_from(&ok).unwrap();
        assert_eq!(row.block_number, 12);
        assert_eq!(row.event_type, "transfer_stored");
    }
}
