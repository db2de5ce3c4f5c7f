//! Projected views returned by the query API.
//!
//! Field names follow the camelCase shape the frontend already consumes
//! (`depositId`, `remainingAmount`, `transfers.items`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Address, Amount, DepositId, TransferId};

/// Lifecycle stage of a transfer, in the order stages must be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Initiated,
    Stored,
    Acknowledged,
    Processed,
    Completed,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::Initiated,
        TransferStatus::Stored,
        TransferStatus::Acknowledged,
        TransferStatus::Processed,
        TransferStatus::Completed,
    ];

    /// Zero-based position in the lifecycle.
    pub fn stage_index(self) -> usize {
        self as usize
    }

    /// The stage that must follow this one, `None` once completed.
    pub fn next(self) -> Option<TransferStatus> {
        Self::ALL.get(self.stage_index() + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self == TransferStatus::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Initiated => "INITIATED",
            TransferStatus::Stored => "STORED",
            TransferStatus::Acknowledged => "ACKNOWLEDGED",
            TransferStatus::Processed => "PROCESSED",
            TransferStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    Deposit,
    Send,
    Receive,
}

/// A page of results plus the number of matches before pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// A nested list, shaped `{ "items": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositView {
    pub deposit_id: DepositId,
    pub depositor: Address,
    pub token: Address,
    pub is_native: bool,
    pub initial_amount: Amount,
    pub remaining_amount: Amount,
    pub released: bool,
    pub created_at: i64,
    pub created_at_block: u64,
    pub tx_hash: String,
    pub last_used_at: Option<i64>,
    pub transfers: Connection<TransferSummary>,
}

/// A transfer as embedded in its funding deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
    pub receiver: Option<Address>,
    pub amount: Option<Amount>,
    pub initiated_at: i64,
    pub completed_at: Option<i64>,
}

/// A deposit as embedded in one of its transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositSummary {
    pub deposit_id: DepositId,
    pub depositor: Address,
    pub initial_amount: Amount,
    pub remaining_amount: Amount,
    pub is_native: bool,
    pub released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    pub transfer_id: TransferId,
    pub deposit_id: DepositId,
    pub sender: Address,
    pub receiver: Option<Address>,
    pub amount: Option<Amount>,
    pub token: Address,
    pub is_native: bool,
    pub status: TransferStatus,
    pub encrypted_data_hash: Option<String>,
    pub initiated_at: i64,
    pub initiated_at_block: u64,
    pub initiated_tx_hash: String,
    pub stored_at: Option<i64>,
    pub stored_at_block: Option<u64>,
    pub stored_tx_hash: Option<String>,
    pub acknowledged_at: Option<i64>,
    pub acknowledged_at_block: Option<u64>,
    pub acknowledged_tx_hash: Option<String>,
    pub processed_at: Option<i64>,
    pub processed_at_block: Option<u64>,
    pub processed_tx_hash: Option<String>,
    pub completed_at: Option<i64>,
    pub completed_at_block: Option<u64>,
    pub completed_tx_hash: Option<String>,
    /// The funding deposit, joined at read time.
    pub deposit: Option<DepositSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityView {
    pub id: String,
    pub user: Address,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub deposit_id: Option<DepositId>,
    pub transfer_id: Option<TransferId>,
    pub amount: Amount,
    pub token: Address,
    pub is_native: bool,
    pub timestamp: i64,
    pub block_number: u64,
    pub tx_hash: String,
    pub sender: Option<Address>,
    pub receiver: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order() {
        assert_eq!(TransferStatus::Initiated.next(), Some(TransferStatus::Stored));
        assert_eq!(TransferStatus::Processed.next(), Some(TransferStatus::Completed));
        assert_eq!(TransferStatus::Completed.next(), None);
        assert!(TransferStatus::Stored < TransferStatus::Acknowledged);
        assert_eq!(
            serde_json::to_string(&TransferStatus::Acknowledged).unwrap(),
            "\"ACKNOWLEDGED\""
        );
    }

    #[test]
    fn test_page_shape() {
        let page = Page {
            items: vec![1, 2],
            total_count: 7,
        };
        assert_eq!(
            serde_json::to_string(&page).unwrap(),
            r#"{"items":[1,2],"totalCount":7}"#
        );
    }
}
