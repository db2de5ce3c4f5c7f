//! Admin API request and response types.

use serde::{Deserialize, Serialize};

use super::events::{ChainEvent, EventKey, EventKind};
use super::DepositId;

/// Header carrying the plaintext admin secret.
pub const ADMIN_AUTH_HEADER: &str = "Cogito-Admin-Authorization";

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub events: Vec<ChainEvent>,
}

/// Query parameters of `POST /admin/events`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestParams {
    /// Reply only once the read model reflects the batch.
    #[serde(default)]
    pub wait: bool,
}

/// What happened to one submitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum IngestOutcome {
    /// Appended to the log.
    Accepted { key: EventKey },
    /// Already logged (or held) with an identical body; nothing changed.
    Duplicate { key: EventKey },
    /// Held until the referenced deposit is ingested.
    Held { key: EventKey, deposit_id: DepositId },
    Rejected {
        key: EventKey,
        category: IssueCategory,
        reason: String,
    },
}

impl IngestOutcome {
    pub fn key(&self) -> EventKey {
        match self {
            IngestOutcome::Accepted { key }
            | IngestOutcome::Duplicate { key }
            | IngestOutcome::Held { key, .. }
            | IngestOutcome::Rejected { key, .. } => *key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    /// One outcome per submitted event, in submission order.
    pub outcomes: Vec<IngestOutcome>,
    /// Previously held events that were appended because their deposit arrived.
    pub released: Vec<EventKey>,
    /// Log revision after the batch.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractRequest {
    /// Every event strictly above this block is removed.
    pub above_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractResponse {
    pub retracted: u64,
    pub dropped_pending: u64,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprojectResponse {
    /// Log revision the re-projection was requested at.
    pub revision: u64,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Why an event did not make it into the projected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Missing ids, zero amounts and similar shape errors.
    Malformed,
    /// Same log position delivered twice with different bodies.
    Conflict,
    /// Below the tip by more than the reorg window.
    OutsideReorgWindow,
    /// A held transfer whose deposit never arrived.
    Orphaned,
    /// Backward, repeated, or skipped lifecycle stage; non-monotonic timestamps.
    InvalidTransition,
    /// Would drive a deposit balance negative, or contradicts a known amount.
    InvariantViolation,
    /// References a deposit or transfer the projection does not know.
    UnknownReference,
    /// Creates an entity whose id is already taken.
    DuplicateEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueView {
    pub key: EventKey,
    pub event_type: EventKind,
    pub category: IssueCategory,
    pub reason: String,
    /// Unix timestamp when the ingester recorded the issue. Projection
    /// rejections are derived state and carry none.
    pub recorded_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListIssuesQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<IssueCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Revision of the event log.
    pub revision: u64,
    pub tip: Option<EventKey>,
    pub logged_events: u64,
    pub pending_orphans: u64,
    /// Revision of the snapshot currently served to readers.
    pub projected_revision: u64,
    pub projected_head: Option<EventKey>,
    pub deposits: u64,
    pub transfers: u64,
    pub activities: u64,
    pub rejections: u64,
}
