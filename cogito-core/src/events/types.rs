//! Message type definitions.

use std::sync::Arc;

use cogito_sdk::objects::admin::{IngestResponse, RetractResponse};
use cogito_sdk::objects::{Address, ChainEvent, DepositId, EventKey, TransferId};
use tokio::sync::oneshot;

use crate::ingest::IngestError;

/// Work for the projector. Every command carries the log revision it
/// brings the projection to.
#[derive(Debug, Clone)]
pub enum ProjectionCommand {
    /// Events appended strictly above the previous tip, in key order.
    Apply {
        events: Vec<ChainEvent>,
        revision: u64,
    },
    /// Re-project from scratch. `snapshot` is the whole log in key order.
    Rebuild {
        snapshot: Arc<[ChainEvent]>,
        revision: u64,
    },
}

impl ProjectionCommand {
    pub fn revision(&self) -> u64 {
        match self {
            ProjectionCommand::Apply { revision, .. }
            | ProjectionCommand::Rebuild { revision, .. } => *revision,
        }
    }
}

/// Notice that part of the read model changed.
///
/// Carries identifiers only; subscribers read the current value from the
/// latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateChange {
    DepositChanged(DepositId),
    TransferChanged(TransferId),
    /// A new entry was appended to this user's activity feed.
    ActivityAppended(Address),
    /// The whole projection was replaced.
    Rebuilt,
}

/// Snapshot of the ingester's own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestStatus {
    pub revision: u64,
    pub tip: Option<EventKey>,
    pub logged_events: u64,
    pub pending_orphans: u64,
}

/// Request to the ingester actor, answered through `reply`.
#[derive(Debug)]
pub enum IngestCommand {
    Ingest {
        events: Vec<ChainEvent>,
        reply: oneshot::Sender<Result<IngestResponse, IngestError>>,
    },
    Retract {
        above_block: u64,
        reply: oneshot::Sender<Result<RetractResponse, IngestError>>,
    },
    /// Force a full re-projection; replies with the revision requested.
    Reproject {
        reply: oneshot::Sender<Result<u64, IngestError>>,
    },
    Status {
        reply: oneshot::Sender<IngestStatus>,
    },
}
