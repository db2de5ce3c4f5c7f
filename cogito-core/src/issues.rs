//! Rejection reasons and the ingest-side issue log.
//!
//! Every event that does not make it into the projected state gets a
//! [`RejectReason`]. Projection rejections are derived state and live in
//! the snapshot; ingest-side issues (malformed, conflicting, too old,
//! orphaned) are kept in a bounded [`IssueLog`].

use std::collections::VecDeque;
use std::sync::Arc;

use cogito_sdk::objects::admin::{IssueCategory, IssueView};
use cogito_sdk::objects::{Amount, DepositId, EventKey, EventKind, TransferId, TransferStatus};
use tokio::sync::RwLock;

/// Why a single event was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("malformed event: {0}")]
    Malformed(&'static str),
    #[error("event {0} was already ingested with a different body")]
    Conflict(EventKey),
    #[error("block {block} is more than {window} blocks below the tip at {tip}")]
    OutsideReorgWindow { block: u64, tip: u64, window: u64 },
    #[error("deposit {0} never arrived")]
    Orphaned(DepositId),

    #[error("deposit {0} already exists")]
    DuplicateDeposit(DepositId),
    #[error("transfer {0} was already initiated")]
    DuplicateTransfer(TransferId),
    #[error("unknown deposit {0}")]
    UnknownDeposit(DepositId),
    #[error("unknown transfer {0}")]
    UnknownTransfer(TransferId),
    #[error("deposit {0} has been released")]
    DepositReleased(DepositId),
    #[error("backward transition from {from} to {to}")]
    BackwardTransition {
        from: TransferStatus,
        to: TransferStatus,
    },
    #[error("skipped stage: {from} cannot move to {to}")]
    SkippedStage {
        from: TransferStatus,
        to: TransferStatus,
    },
    #[error("timestamp {at} precedes the previous stage at {previous}")]
    NonMonotonicTimestamp { previous: i64, at: i64 },
    #[error("amount {event} contradicts the known amount {known}")]
    AmountMismatch { known: Amount, event: Amount },
    #[error("completion names deposit {named} but the transfer is funded by {actual}")]
    DepositMismatch { named: DepositId, actual: DepositId },
    #[error("transfer amount is unknown at completion")]
    MissingAmount,
    #[error("completing {amount} would overdraw deposit {deposit_id} holding {remaining}")]
    Overdraw {
        deposit_id: DepositId,
        remaining: Amount,
        amount: Amount,
    },
}

impl RejectReason {
    pub fn category(&self) -> IssueCategory {
        match self {
            RejectReason::Malformed(_) => IssueCategory::Malformed,
            RejectReason::Conflict(_) => IssueCategory::Conflict,
            RejectReason::OutsideReorgWindow { .. } => IssueCategory::OutsideReorgWindow,
            RejectReason::Orphaned(_) => IssueCategory::Orphaned,
            RejectReason::DuplicateDeposit(_) | RejectReason::DuplicateTransfer(_) => {
                IssueCategory::DuplicateEntity
            }
            RejectReason::UnknownDeposit(_) | RejectReason::UnknownTransfer(_) => {
                IssueCategory::UnknownReference
            }
            RejectReason::DepositReleased(_)
            | RejectReason::BackwardTransition { .. }
            | RejectReason::SkippedStage { .. }
            | RejectReason::NonMonotonicTimestamp { .. } => IssueCategory::InvalidTransition,
            RejectReason::AmountMismatch { .. }
            | RejectReason::DepositMismatch { .. }
            | RejectReason::MissingAmount
            | RejectReason::Overdraw { .. } => IssueCategory::InvariantViolation,
        }
    }
}

/// A refused event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub key: EventKey,
    pub kind: EventKind,
    pub reason: RejectReason,
    /// Unix seconds, set for ingest-side issues only.
    pub recorded_at: Option<i64>,
}

impl Issue {
    pub fn to_view(&self) -> IssueView {
        IssueView {
            key: self.key,
            event_type: self.kind,
            category: self.reason.category(),
            reason: self.reason.to_string(),
            recorded_at: self.recorded_at,
        }
    }
}

pub const DEFAULT_ISSUE_CAPACITY: usize = 4096;

/// Bounded log of ingest-side issues, newest last. The oldest entries are
/// evicted once `capacity` is reached.
#[derive(Clone)]
pub struct IssueLog {
    inner: Arc<RwLock<VecDeque<Issue>>>,
    capacity: usize,
}

impl IssueLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, issues: impl IntoIterator<Item = Issue>) {
        let mut guard = self.inner.write().await;
        for issue in issues {
            if guard.len() == self.capacity {
                guard.pop_front();
            }
            guard.push_back(issue);
        }
    }

    pub async fn snapshot(&self) -> Vec<Issue> {
        self.inner.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for IssueLog {
    fn default() -> Self {
        Self::new(DEFAULT_ISSUE_CAPACITY)
    }
}
