//! Admission rules of the event ingester.
//!
//! [`IngestState`] is the in-memory mirror of the event log plus the set
//! of held (orphaned) events. It decides, per event, whether to append,
//! ignore, hold or reject it. It does no I/O; the ingester processor
//! persists what it appends.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use cogito_sdk::objects::admin::IngestOutcome;
use cogito_sdk::objects::{ChainEvent, DepositId, EventKey, EventPayload, TransferId};
use thiserror::Error;
use time::OffsetDateTime;

use crate::events::IngestStatus;
use crate::issues::{Issue, RejectReason};
use crate::log::LogError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event log error: {0}")]
    Log(#[from] LogError),

    #[error("batch of {size} events exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("ingester is not running")]
    IngesterClosed,

    #[error("projector is not running")]
    ProjectorClosed,
}

/// Decision for a single incoming event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Append,
    Duplicate,
    /// Wait for this deposit to be logged.
    Hold(DepositId),
    Reject(RejectReason),
}

/// An event waiting for its deposit.
#[derive(Debug, Clone)]
pub struct HeldEvent {
    event: ChainEvent,
    deposit_id: DepositId,
    held_at: OffsetDateTime,
}

/// Result of [`IngestState::ingest_batch`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub outcomes: Vec<IngestOutcome>,
    /// Newly logged events in commit order, released orphans included.
    pub appended: Vec<ChainEvent>,
    pub released: Vec<EventKey>,
    /// The held entries behind `released`, for [`IngestState::rehold`].
    pub released_held: Vec<HeldEvent>,
    pub issues: Vec<Issue>,
    /// Something landed below the previous tip; incremental apply would
    /// diverge from replay.
    pub requires_rebuild: bool,
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct IngestState {
    log: BTreeMap<EventKey, ChainEvent>,
    known_deposits: HashSet<DepositId>,
    held: BTreeMap<EventKey, HeldEvent>,
    /// Transfers whose initiation is held, by the deposit they wait for.
    held_transfers: HashMap<TransferId, DepositId>,
    revision: u64,
}

impl IngestState {
    /// Start from the persisted log.
    pub fn from_events(events: Vec<ChainEvent>) -> Self {
        let mut state = Self::default();
        state.restore_log(events);
        state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn tip(&self) -> Option<EventKey> {
        self.log.last_key_value().map(|(key, _)| *key)
    }

    pub fn pending_orphans(&self) -> usize {
        self.held.len()
    }

    pub fn status(&self) -> IngestStatus {
        IngestStatus {
            revision: self.revision,
            tip: self.tip(),
            logged_events: self.log.len() as u64,
            pending_orphans: self.held.len() as u64,
        }
    }

    /// The whole log in key order.
    pub fn snapshot(&self) -> Arc<[ChainEvent]> {
        self.log.values().cloned().collect()
    }

    /// Replace the log with `events`, keeping held orphans. Bumps the
    /// revision so the projection is rebuilt.
    pub fn restore_log(&mut self, events: Vec<ChainEvent>) {
        self.log = events.into_iter().map(|e| (e.key(), e)).collect();
        self.reindex();
        self.revision += 1;
    }

    pub fn admit(&self, event: &ChainEvent, reorg_window_blocks: u64) -> Admission {
        if let Err(reason) = validate(event) {
            return Admission::Reject(reason);
        }

        let key = event.key();
        let existing = self
            .log
            .get(&key)
            .or_else(|| self.held.get(&key).map(|held| &held.event));
        if let Some(existing) = existing {
            return if existing == event {
                Admission::Duplicate
            } else {
                Admission::Reject(RejectReason::Conflict(key))
            };
        }

        if let Some(tip) = self.tip() {
            if key < tip && key.block_number.saturating_add(reorg_window_blocks) < tip.block_number
            {
                return Admission::Reject(RejectReason::OutsideReorgWindow {
                    block: key.block_number,
                    tip: tip.block_number,
                    window: reorg_window_blocks,
                });
            }
        }

        match &event.payload {
            EventPayload::TransferInitiated { deposit_id, .. }
                if !self.known_deposits.contains(deposit_id) =>
            {
                Admission::Hold(deposit_id.clone())
            }
            EventPayload::TransferInitiated { .. } => Admission::Append,
            payload => match payload
                .transfer_id()
                .and_then(|id| self.held_transfers.get(id))
            {
                Some(deposit_id) => Admission::Hold(deposit_id.clone()),
                None => Admission::Append,
            },
        }
    }

    /// Admit a batch in submission order. The revision is bumped once if
    /// anything was appended.
    pub fn ingest_batch(
        &mut self,
        events: Vec<ChainEvent>,
        reorg_window_blocks: u64,
        now: OffsetDateTime,
    ) -> BatchOutcome {
        let tip_before = self.tip();
        let mut out = BatchOutcome::default();

        for event in events {
            let key = event.key();
            let kind = event.kind();
            match self.admit(&event, reorg_window_blocks) {
                Admission::Append => {
                    self.commit(event, tip_before, &mut out);
                    out.outcomes.push(IngestOutcome::Accepted { key });
                }
                Admission::Duplicate => out.outcomes.push(IngestOutcome::Duplicate { key }),
                Admission::Hold(deposit_id) => {
                    self.hold(event, deposit_id.clone(), now);
                    out.outcomes.push(IngestOutcome::Held { key, deposit_id });
                }
                Admission::Reject(reason) => {
                    out.outcomes.push(IngestOutcome::Rejected {
                        key,
                        category: reason.category(),
                        reason: reason.to_string(),
                    });
                    out.issues.push(Issue {
                        key,
                        kind,
                        reason,
                        recorded_at: Some(now.unix_timestamp()),
                    });
                }
            }
        }

        if !out.appended.is_empty() {
            self.revision += 1;
        }
        out.revision = self.revision;
        out
    }

    /// Log `event`; a new deposit releases everything held for it.
    fn commit(&mut self, event: ChainEvent, tip_before: Option<EventKey>, out: &mut BatchOutcome) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let key = event.key();
            if tip_before.is_some_and(|tip| key < tip) {
                out.requires_rebuild = true;
            }
            if let EventPayload::DepositCreated { deposit_id, .. } = &event.payload {
                if self.known_deposits.insert(deposit_id.clone()) {
                    for held in self.take_held_for(deposit_id) {
                        out.released.push(held.event.key());
                        queue.push_back(held.event.clone());
                        out.released_held.push(held);
                    }
                }
            }
            self.log.insert(key, event.clone());
            out.appended.push(event);
        }
    }

    fn hold(&mut self, event: ChainEvent, deposit_id: DepositId, now: OffsetDateTime) {
        if let EventPayload::TransferInitiated { transfer_id, .. } = &event.payload {
            self.held_transfers
                .insert(transfer_id.clone(), deposit_id.clone());
        }
        self.held.insert(
            event.key(),
            HeldEvent {
                event,
                deposit_id,
                held_at: now,
            },
        );
    }

    /// Remove and return, in key order, every event held for `deposit_id`.
    fn take_held_for(&mut self, deposit_id: &DepositId) -> Vec<HeldEvent> {
        let keys: Vec<EventKey> = self
            .held
            .iter()
            .filter(|(_, held)| &held.deposit_id == deposit_id)
            .map(|(key, _)| *key)
            .collect();
        self.held_transfers.retain(|_, waiting_for| waiting_for != deposit_id);
        keys.into_iter()
            .filter_map(|key| self.held.remove(&key))
            .collect()
    }

    /// Hold `released` again, keeping their original hold time. Used when
    /// the batch that released them failed to persist.
    pub fn rehold(&mut self, released: Vec<HeldEvent>) {
        for held in released {
            let key = held.event.key();
            if !self.log.contains_key(&key) {
                self.held.insert(key, held);
            }
        }
        self.reindex_held();
    }

    /// Drop held events older than `timeout` and report them as orphaned.
    pub fn sweep(&mut self, now: OffsetDateTime, timeout: Duration) -> Vec<Issue> {
        let expired: Vec<EventKey> = self
            .held
            .iter()
            .filter(|(_, held)| held.held_at + timeout <= now)
            .map(|(key, _)| *key)
            .collect();
        if expired.is_empty() {
            return Vec::new();
        }

        let issues = expired
            .into_iter()
            .filter_map(|key| self.held.remove(&key))
            .map(|held| Issue {
                key: held.event.key(),
                kind: held.event.kind(),
                reason: RejectReason::Orphaned(held.deposit_id),
                recorded_at: Some(now.unix_timestamp()),
            })
            .collect();
        self.reindex_held();
        issues
    }

    /// Remove every logged and held event above `above_block`. Returns
    /// `(retracted, dropped_pending)`. Always bumps the revision.
    pub fn retract_above(&mut self, above_block: u64) -> (u64, u64) {
        let (retracted, dropped) = match above_block.checked_add(1) {
            Some(first_gone) => {
                let cut = EventKey::new(first_gone, 0);
                (
                    self.log.split_off(&cut).len() as u64,
                    self.held.split_off(&cut).len() as u64,
                )
            }
            None => (0, 0),
        };
        self.reindex();
        self.revision += 1;
        (retracted, dropped)
    }

    fn reindex(&mut self) {
        self.known_deposits = self
            .log
            .values()
            .filter_map(|event| match &event.payload {
                EventPayload::DepositCreated { deposit_id, .. } => Some(deposit_id.clone()),
                _ => None,
            })
            .collect();
        self.reindex_held();
    }

    fn reindex_held(&mut self) {
        self.held_transfers = self
            .held
            .values()
            .filter_map(|held| match &held.event.payload {
                EventPayload::TransferInitiated { transfer_id, .. } => {
                    Some((transfer_id.clone(), held.deposit_id.clone()))
                }
                _ => None,
            })
            .collect();
    }
}

/// Shape checks that do not depend on any state.
pub fn validate(event: &ChainEvent) -> Result<(), RejectReason> {
    use RejectReason::Malformed;

    if event.tx_hash.trim().is_empty() {
        return Err(Malformed("empty txHash"));
    }
    // Stored as BIGINT and INTEGER.
    if i64::try_from(event.block_number).is_err() {
        return Err(Malformed("blockNumber out of range"));
    }
    if i32::try_from(event.log_index).is_err() {
        return Err(Malformed("logIndex out of range"));
    }
    let zero = |amount: Option<&cogito_sdk::objects::Amount>| amount.is_some_and(|a| a.is_zero());

    match &event.payload {
        EventPayload::DepositCreated {
            deposit_id,
            depositor,
            token,
            amount,
            ..
        } => {
            if deposit_id.is_empty() {
                return Err(Malformed("empty depositId"));
            }
            if depositor.is_empty() || token.is_empty() {
                return Err(Malformed("empty address"));
            }
            if amount.is_zero() {
                return Err(Malformed("zero amount"));
            }
        }
        EventPayload::DepositReleased { deposit_id } => {
            if deposit_id.is_empty() {
                return Err(Malformed("empty depositId"));
            }
        }
        EventPayload::TransferInitiated {
            transfer_id,
            deposit_id,
            sender,
            amount,
            ..
        } => {
            if transfer_id.is_empty() {
                return Err(Malformed("empty transferId"));
            }
            if deposit_id.is_empty() {
                return Err(Malformed("empty depositId"));
            }
            if sender.is_empty() {
                return Err(Malformed("empty address"));
            }
            if zero(amount.as_ref()) {
                return Err(Malformed("zero amount"));
            }
        }
        EventPayload::TransferStored { transfer_id }
        | EventPayload::TransferAcknowledged { transfer_id } => {
            if transfer_id.is_empty() {
                return Err(Malformed("empty transferId"));
            }
        }
        EventPayload::TransferProcessed {
            transfer_id,
            receiver,
            amount,
        } => {
            if transfer_id.is_empty() {
                return Err(Malformed("empty transferId"));
            }
            if receiver.is_empty() {
                return Err(Malformed("empty address"));
            }
            if zero(amount.as_ref()) {
                return Err(Malformed("zero amount"));
            }
        }
        EventPayload::TransferCompleted {
            transfer_id,
            deposit_id,
            amount,
        } => {
            if transfer_id.is_empty() {
                return Err(Malformed("empty transferId"));
            }
            if deposit_id.as_ref().is_some_and(DepositId::is_empty) {
                return Err(Malformed("empty depositId"));
            }
            if zero(amount.as_ref()) {
                return Err(Malformed("zero amount"));
            }
        }
    }
    Ok(())
}
