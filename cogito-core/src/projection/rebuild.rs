//! Full re-projection of the log.
//!
//! Events never interact across deposits: a transfer only touches the
//! deposit named by its first initiation. The log is therefore split by
//! owning deposit, partitions are projected on blocking workers, and the
//! partial projections are merged back in key order. The result equals
//! [`replay`] of the same log.

use std::collections::HashMap;
use std::sync::Arc;

use cogito_sdk::objects::{ChainEvent, DepositId, EventPayload, TransferId};
use thiserror::Error;
use tokio::task::JoinError;

use super::Projection;
use crate::issues::{Issue, RejectReason};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("rebuild worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Sequentially fold `events` (in key order) into a fresh projection.
pub fn replay(events: &[ChainEvent]) -> Projection {
    let mut projection = Projection::default();
    for event in events {
        projection.ingest(event);
    }
    projection
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

/// Re-project `events` (in key order) on up to `workers` blocking tasks.
pub async fn rebuild_parallel(
    events: Arc<[ChainEvent]>,
    workers: usize,
) -> Result<Projection, ProjectionError> {
    let (buckets, unowned) = partition(&events, workers.max(1));

    let handles: Vec<_> = buckets
        .into_iter()
        .filter(|indices| !indices.is_empty())
        .map(|indices| {
            let events = Arc::clone(&events);
            tokio::task::spawn_blocking(move || {
                let mut projection = Projection::default();
                for index in indices {
                    projection.ingest(&events[index]);
                }
                projection
            })
        })
        .collect();

    let mut parts = Vec::with_capacity(handles.len());
    for handle in handles {
        parts.push(handle.await?);
    }

    let head = events.last().map(ChainEvent::key);
    Ok(Projection::merge(parts, unowned, head))
}

/// Assign every event to a worker bucket by owning deposit.
///
/// Stage events of a transfer nobody initiated have no owner; they are
/// rejected here exactly as sequential replay would reject them.
fn partition(events: &[ChainEvent], buckets: usize) -> (Vec<Vec<usize>>, Vec<Issue>) {
    let mut claims: HashMap<&TransferId, &DepositId> = HashMap::new();
    let mut bucket_of: HashMap<&DepositId, usize> = HashMap::new();
    let mut parts = vec![Vec::new(); buckets];
    let mut unowned = Vec::new();

    for (index, event) in events.iter().enumerate() {
        let payload = &event.payload;
        let owner = match (payload.transfer_id(), payload.deposit_id()) {
            (None, deposit_id) => deposit_id,
            (Some(transfer_id), Some(deposit_id))
                if matches!(payload, EventPayload::TransferInitiated { .. }) =>
            {
                Some(*claims.entry(transfer_id).or_insert(deposit_id))
            }
            // A completion naming a deposit still belongs to the claimant.
            (Some(transfer_id), _) => claims.get(transfer_id).copied(),
        };

        match owner {
            Some(deposit_id) => {
                let next = bucket_of.len();
                let bucket = *bucket_of.entry(deposit_id).or_insert(next % buckets);
                parts[bucket].push(index);
            }
            None => {
                if let Some(transfer_id) = event.payload.transfer_id() {
                    unowned.push(Issue {
                        key: event.key(),
                        kind: event.kind(),
                        reason: RejectReason::UnknownTransfer(transfer_id.clone()),
                        recorded_at: None,
                    });
                }
            }
        }
    }
    (parts, unowned)
}
