//! Projection of the event log into deposits, transfers and activity feeds.
//!
//! [`Projection::ingest`] folds one event into the tables. Every check runs
//! before any mutation, so a refused event leaves the tables untouched and
//! is recorded in the rejection list instead. The one exception is the
//! transfer id claim: the first initiation of an id claims it even when
//! that initiation is refused, so later initiations are duplicates no
//! matter how the log is replayed.

mod rebuild;

pub use rebuild::{ProjectionError, default_workers, rebuild_parallel, replay};

use std::collections::HashMap;
use std::sync::Arc;

use cogito_sdk::objects::{
    ActivityKind, Amount, ChainEvent, DepositId, EventKey, EventPayload, TransferId,
    TransferStatus,
};
use itertools::Itertools;

use crate::entities::{Deposit, StageMark, Transfer, UserActivity};
use crate::events::StateChange;
use crate::issues::{Issue, RejectReason};

/// Every table sits behind an `Arc`, so cloning a projection shares the
/// tables and a table is copied only on its first write after a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    deposits: Arc<HashMap<DepositId, Arc<Deposit>>>,
    transfers: Arc<HashMap<TransferId, Arc<Transfer>>>,
    /// Transfers per deposit, in initiation order.
    deposit_transfers: Arc<HashMap<DepositId, Vec<TransferId>>>,
    /// Transfer id -> deposit named by its first initiation.
    claims: Arc<HashMap<TransferId, DepositId>>,
    /// In source event order.
    activities: Arc<Vec<Arc<UserActivity>>>,
    /// In source event order.
    rejections: Arc<Vec<Issue>>,
    head: Option<EventKey>,
}

impl Projection {
    /// Key of the newest event folded in, rejected or not.
    pub fn head(&self) -> Option<EventKey> {
        self.head
    }

    pub fn deposit(&self, id: &DepositId) -> Option<&Deposit> {
        self.deposits.get(id).map(Arc::as_ref)
    }

    pub fn deposits(&self) -> impl Iterator<Item = &Deposit> {
        self.deposits.values().map(Arc::as_ref)
    }

    pub fn transfer(&self, id: &TransferId) -> Option<&Transfer> {
        self.transfers.get(id).map(Arc::as_ref)
    }

    pub fn transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.transfers.values().map(Arc::as_ref)
    }

    /// Transfers funded by `deposit_id`, in initiation order.
    pub fn transfers_of<'a>(&'a self, deposit_id: &DepositId) -> impl Iterator<Item = &'a Transfer> {
        self.deposit_transfers
            .get(deposit_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.transfer(id))
    }

    pub fn activities(&self) -> impl Iterator<Item = &UserActivity> {
        self.activities.iter().map(Arc::as_ref)
    }

    pub fn rejections(&self) -> &[Issue] {
        &self.rejections
    }

    pub fn deposit_count(&self) -> usize {
        self.deposits.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }

    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    /// Fold `event` in. A refusal is recorded and yields no changes.
    pub fn ingest(&mut self, event: &ChainEvent) -> Vec<StateChange> {
        let key = event.key();
        self.head = Some(self.head.map_or(key, |head| head.max(key)));
        match self.apply(event) {
            Ok(changes) => changes,
            Err(reason) => {
                Arc::make_mut(&mut self.rejections).push(Issue {
                    key,
                    kind: event.kind(),
                    reason,
                    recorded_at: None,
                });
                Vec::new()
            }
        }
    }

    fn apply(&mut self, event: &ChainEvent) -> Result<Vec<StateChange>, RejectReason> {
        match &event.payload {
            EventPayload::DepositCreated {
                deposit_id,
                depositor,
                token,
                is_native,
                amount,
            } => {
                if self.deposits.contains_key(deposit_id) {
                    return Err(RejectReason::DuplicateDeposit(deposit_id.clone()));
                }
                let deposit = Deposit {
                    deposit_id: deposit_id.clone(),
                    depositor: depositor.clone(),
                    token: token.clone(),
                    is_native: *is_native,
                    initial_amount: *amount,
                    remaining_amount: *amount,
                    released: false,
                    created: mark(event),
                    last_used_at: None,
                };
                self.push_activity(event, ActivityKind::Deposit, &deposit, None);
                Arc::make_mut(&mut self.deposits).insert(deposit_id.clone(), Arc::new(deposit));
                Ok(vec![
                    StateChange::DepositChanged(deposit_id.clone()),
                    StateChange::ActivityAppended(depositor.clone()),
                ])
            }

            EventPayload::DepositReleased { deposit_id } => {
                let deposit = self
                    .deposits
                    .get(deposit_id)
                    .ok_or_else(|| RejectReason::UnknownDeposit(deposit_id.clone()))?;
                if deposit.released {
                    return Err(RejectReason::DepositReleased(deposit_id.clone()));
                }
                let mut deposit = Deposit::clone(deposit);
                deposit.released = true;
                deposit.remaining_amount = Amount::ZERO;
                Arc::make_mut(&mut self.deposits).insert(deposit_id.clone(), Arc::new(deposit));
                Ok(vec![StateChange::DepositChanged(deposit_id.clone())])
            }

            EventPayload::TransferInitiated {
                transfer_id,
                deposit_id,
                sender,
                amount,
                encrypted_data_hash,
            } => {
                if self.claims.contains_key(transfer_id) {
                    return Err(RejectReason::DuplicateTransfer(transfer_id.clone()));
                }
                Arc::make_mut(&mut self.claims).insert(transfer_id.clone(), deposit_id.clone());

                let deposit = self
                    .deposits
                    .get(deposit_id)
                    .ok_or_else(|| RejectReason::UnknownDeposit(deposit_id.clone()))?;
                if deposit.released {
                    return Err(RejectReason::DepositReleased(deposit_id.clone()));
                }

                let transfer = Transfer {
                    transfer_id: transfer_id.clone(),
                    deposit_id: deposit_id.clone(),
                    sender: sender.clone(),
                    receiver: None,
                    amount: *amount,
                    token: deposit.token.clone(),
                    is_native: deposit.is_native,
                    status: TransferStatus::Initiated,
                    encrypted_data_hash: encrypted_data_hash.clone(),
                    initiated: mark(event),
                    stored: None,
                    acknowledged: None,
                    processed: None,
                    completed: None,
                };
                Arc::make_mut(&mut self.transfers).insert(transfer_id.clone(), Arc::new(transfer));
                Arc::make_mut(&mut self.deposit_transfers)
                    .entry(deposit_id.clone())
                    .or_default()
                    .push(transfer_id.clone());
                Ok(vec![
                    StateChange::TransferChanged(transfer_id.clone()),
                    StateChange::DepositChanged(deposit_id.clone()),
                ])
            }

            EventPayload::TransferStored { transfer_id } => {
                self.advance(event, transfer_id, TransferStatus::Stored)
            }
            EventPayload::TransferAcknowledged { transfer_id } => {
                self.advance(event, transfer_id, TransferStatus::Acknowledged)
            }
            EventPayload::TransferProcessed { transfer_id, .. } => {
                self.advance(event, transfer_id, TransferStatus::Processed)
            }
            EventPayload::TransferCompleted { transfer_id, .. } => {
                self.advance(event, transfer_id, TransferStatus::Completed)
            }
        }
    }

    /// Move a transfer to `target`, applying the payload of the stage event.
    fn advance(
        &mut self,
        event: &ChainEvent,
        transfer_id: &TransferId,
        target: TransferStatus,
    ) -> Result<Vec<StateChange>, RejectReason> {
        let current = self
            .transfers
            .get(transfer_id)
            .ok_or_else(|| RejectReason::UnknownTransfer(transfer_id.clone()))?;
        check_transition(current.status, target)?;
        let previous = current.current_timestamp();
        if event.block_timestamp < previous {
            return Err(RejectReason::NonMonotonicTimestamp {
                previous,
                at: event.block_timestamp,
            });
        }

        let mut next = Transfer::clone(current);
        let mut changes = vec![StateChange::TransferChanged(transfer_id.clone())];

        match &event.payload {
            EventPayload::TransferProcessed {
                receiver, amount, ..
            } => {
                next.amount = reconcile(next.amount, *amount)?;
                next.receiver = Some(receiver.clone());
            }
            EventPayload::TransferCompleted {
                deposit_id, amount, ..
            } => {
                if let Some(named) = deposit_id {
                    if named != &next.deposit_id {
                        return Err(RejectReason::DepositMismatch {
                            named: named.clone(),
                            actual: next.deposit_id.clone(),
                        });
                    }
                }
                let amount = reconcile(next.amount, *amount)?.ok_or(RejectReason::MissingAmount)?;
                let deposit = self
                    .deposits
                    .get(&next.deposit_id)
                    .ok_or_else(|| RejectReason::UnknownDeposit(next.deposit_id.clone()))?;
                let remaining = deposit.remaining_amount.checked_sub(amount).ok_or_else(|| {
                    RejectReason::Overdraw {
                        deposit_id: deposit.deposit_id.clone(),
                        remaining: deposit.remaining_amount,
                        amount,
                    }
                })?;

                // Checks are done; mutate.
                next.amount = Some(amount);
                let mut debited = Deposit::clone(deposit);
                debited.remaining_amount = remaining;
                debited.last_used_at = Some(event.block_timestamp);

                next.advance(target, mark(event));
                self.push_activity(event, ActivityKind::Send, &debited, Some(&next));
                changes.push(StateChange::ActivityAppended(next.sender.clone()));
                if let Some(receiver) = &next.receiver {
                    self.push_activity(event, ActivityKind::Receive, &debited, Some(&next));
                    changes.push(StateChange::ActivityAppended(receiver.clone()));
                }
                changes.push(StateChange::DepositChanged(debited.deposit_id.clone()));
                Arc::make_mut(&mut self.deposits)
                    .insert(debited.deposit_id.clone(), Arc::new(debited));
                Arc::make_mut(&mut self.transfers).insert(transfer_id.clone(), Arc::new(next));
                return Ok(changes);
            }
            _ => {}
        }

        next.advance(target, mark(event));
        Arc::make_mut(&mut self.transfers).insert(transfer_id.clone(), Arc::new(next));
        Ok(changes)
    }

    fn push_activity(
        &mut self,
        event: &ChainEvent,
        kind: ActivityKind,
        deposit: &Deposit,
        transfer: Option<&Transfer>,
    ) {
        let (user, amount) = match (kind, transfer) {
            (ActivityKind::Deposit, _) | (_, None) => {
                (deposit.depositor.clone(), deposit.initial_amount)
            }
            (ActivityKind::Send, Some(t)) => (t.sender.clone(), t.amount.unwrap_or_default()),
            (ActivityKind::Receive, Some(t)) => (
                t.receiver.clone().unwrap_or_else(|| t.sender.clone()),
                t.amount.unwrap_or_default(),
            ),
        };
        let activity = UserActivity {
            id: UserActivity::activity_id(&event.tx_hash, event.log_index, kind),
            source: event.key(),
            user,
            kind,
            deposit_id: transfer.is_none().then(|| deposit.deposit_id.clone()),
            transfer_id: transfer.map(|t| t.transfer_id.clone()),
            amount,
            token: deposit.token.clone(),
            is_native: deposit.is_native,
            timestamp: event.block_timestamp,
            tx_hash: event.tx_hash.clone(),
            sender: transfer.map(|t| t.sender.clone()),
            receiver: transfer.and_then(|t| t.receiver.clone()),
        };
        Arc::make_mut(&mut self.activities).push(Arc::new(activity));
    }

    /// Combine projections built from disjoint partitions of one log.
    fn merge(parts: Vec<Projection>, unowned: Vec<Issue>, head: Option<EventKey>) -> Projection {
        let mut deposits = HashMap::new();
        let mut transfers = HashMap::new();
        let mut deposit_transfers = HashMap::new();
        let mut claims = HashMap::new();
        let mut activity_runs = Vec::with_capacity(parts.len());
        let mut rejection_runs = Vec::with_capacity(parts.len() + 1);
        rejection_runs.push(unowned);

        for part in parts {
            deposits.extend(Arc::unwrap_or_clone(part.deposits));
            transfers.extend(Arc::unwrap_or_clone(part.transfers));
            deposit_transfers.extend(Arc::unwrap_or_clone(part.deposit_transfers));
            claims.extend(Arc::unwrap_or_clone(part.claims));
            activity_runs.push(Arc::unwrap_or_clone(part.activities));
            rejection_runs.push(Arc::unwrap_or_clone(part.rejections));
        }

        Projection {
            deposits: Arc::new(deposits),
            transfers: Arc::new(transfers),
            deposit_transfers: Arc::new(deposit_transfers),
            claims: Arc::new(claims),
            activities: Arc::new(
                activity_runs
                    .into_iter()
                    .kmerge_by(|a, b| a.source < b.source)
                    .collect(),
            ),
            rejections: Arc::new(
                rejection_runs
                    .into_iter()
                    .kmerge_by(|a, b| a.key < b.key)
                    .collect(),
            ),
            head,
        }
    }
}

fn mark(event: &ChainEvent) -> StageMark {
    StageMark {
        timestamp: event.block_timestamp,
        block_number: event.block_number,
        tx_hash: event.tx_hash.clone(),
    }
}

/// A stage event must move the transfer exactly one stage forward.
fn check_transition(from: TransferStatus, to: TransferStatus) -> Result<(), RejectReason> {
    if to <= from {
        Err(RejectReason::BackwardTransition { from, to })
    } else if from.next() != Some(to) {
        Err(RejectReason::SkippedStage { from, to })
    } else {
        Ok(())
    }
}

/// Once known, an amount cannot change.
fn reconcile(known: Option<Amount>, event: Option<Amount>) -> Result<Option<Amount>, RejectReason> {
    match (known, event) {
        (Some(known), Some(event)) if known != event => {
            Err(RejectReason::AmountMismatch { known, event })
        }
        (known, event) => Ok(known.or(event)),
    }
}
