//! Chain events accepted by the ingester.
//!
//! Every event is a flat JSON object carrying its log position and a
//! `type` tag:
//!
//! ```json
//! {"blockNumber":120,"logIndex":3,"blockTimestamp":1718000000,
//!  "txHash":"0xabc","type":"transfer_stored","transferId":"T1"}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Address, Amount, DepositId, TransferId};

/// Position of an event in the chain: block number plus log index.
///
/// Orders events the same way the chain does and doubles as the
/// idempotency key of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    pub block_number: u64,
    pub log_index: u32,
}

impl EventKey {
    pub fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// A single on-chain event in normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub block_number: u64,
    pub log_index: u32,
    /// Unix timestamp (seconds) of the block.
    pub block_timestamp: i64,
    pub tx_hash: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.block_number, self.log_index)
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// The event body, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    /// Funds were locked by a depositor.
    DepositCreated {
        deposit_id: DepositId,
        depositor: Address,
        token: Address,
        #[serde(default)]
        is_native: bool,
        amount: Amount,
    },
    /// The depositor withdrew whatever was left of the deposit.
    DepositReleased { deposit_id: DepositId },
    /// A transfer funded by `deposit_id` was requested.
    TransferInitiated {
        transfer_id: TransferId,
        deposit_id: DepositId,
        sender: Address,
        #[serde(default)]
        amount: Option<Amount>,
        #[serde(default)]
        encrypted_data_hash: Option<String>,
    },
    TransferStored { transfer_id: TransferId },
    TransferAcknowledged { transfer_id: TransferId },
    /// The confidential side processed the transfer and disclosed the receiver.
    TransferProcessed {
        transfer_id: TransferId,
        receiver: Address,
        #[serde(default)]
        amount: Option<Amount>,
    },
    /// Funds were paid out; the deposit is debited by the transfer amount.
    TransferCompleted {
        transfer_id: TransferId,
        #[serde(default)]
        deposit_id: Option<DepositId>,
        #[serde(default)]
        amount: Option<Amount>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::DepositCreated { .. } => EventKind::DepositCreated,
            EventPayload::DepositReleased { .. } => EventKind::DepositReleased,
            EventPayload::TransferInitiated { .. } => EventKind::TransferInitiated,
            EventPayload::TransferStored { .. } => EventKind::TransferStored,
            EventPayload::TransferAcknowledged { .. } => EventKind::TransferAcknowledged,
            EventPayload::TransferProcessed { .. } => EventKind::TransferProcessed,
            EventPayload::TransferCompleted { .. } => EventKind::TransferCompleted,
        }
    }

    /// The transfer this event is about, if it is a transfer event.
    pub fn transfer_id(&self) -> Option<&TransferId> {
        match self {
            EventPayload::DepositCreated { .. } | EventPayload::DepositReleased { .. } => None,
            EventPayload::TransferInitiated { transfer_id, .. }
            | EventPayload::TransferStored { transfer_id }
            | EventPayload::TransferAcknowledged { transfer_id }
            | EventPayload::TransferProcessed { transfer_id, .. }
            | EventPayload::TransferCompleted { transfer_id, .. } => Some(transfer_id),
        }
    }

    /// The deposit this event names explicitly, if any.
    pub fn deposit_id(&self) -> Option<&DepositId> {
        match self {
            EventPayload::DepositCreated { deposit_id, .. }
            | EventPayload::DepositReleased { deposit_id }
            | EventPayload::TransferInitiated { deposit_id, .. } => Some(deposit_id),
            EventPayload::TransferCompleted { deposit_id, .. } => deposit_id.as_ref(),
            _ => None,
        }
    }
}

/// Discriminant of [`EventPayload`], used in logs and issue reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DepositCreated,
    DepositReleased,
    TransferInitiated,
    TransferStored,
    TransferAcknowledged,
    TransferProcessed,
    TransferCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DepositCreated => "deposit_created",
            EventKind::DepositReleased => "deposit_released",
            EventKind::TransferInitiated => "transfer_initiated",
            EventKind::TransferStored => "transfer_stored",
            EventKind::TransferAcknowledged => "transfer_acknowledged",
            EventKind::TransferProcessed => "transfer_processed",
            EventKind::TransferCompleted => "transfer_completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_event() {
        let json = r#"{
            "blockNumber": 120,
            "logIndex": 3,
            "blockTimestamp": 1718000000,
            "txHash": "0xabc",
            "type": "transfer_initiated",
            "transferId": "T1",
            "depositId": "D1",
            "sender": "0xSENDER"
        }"#;
        let event: ChainEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.key(), EventKey::new(120, 3));
        assert_eq!(event.kind(), EventKind::TransferInitiated);
        match &event.payload {
            EventPayload::TransferInitiated {
                sender,
                amount,
                encrypted_data_hash,
                ..
            } => {
                assert_eq!(sender.as_str(), "0xsender");
                assert!(amount.is_none());
                assert!(encrypted_data_hash.is_none());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(event.payload.deposit_id(), Some(&DepositId::from("D1")));
    }

    #[test]
    fn test_event_key_ordering() {
        assert!(EventKey::new(1, 9) < EventKey::new(2, 0));
        assert!(EventKey::new(2, 0) < EventKey::new(2, 1));
        assert_eq!(EventKey::new(7, 2).to_string(), "7:2");
    }
}
