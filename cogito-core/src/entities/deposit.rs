use cogito_sdk::objects::{
    Address, Amount, Connection, DepositId, DepositSummary, DepositView,
};

use super::{StageMark, Transfer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub deposit_id: DepositId,
    pub depositor: Address,
    pub token: Address,
    pub is_native: bool,
    pub initial_amount: Amount,
    /// Initial amount minus every completed transfer. Zero after release.
    pub remaining_amount: Amount,
    pub released: bool,
    pub created: StageMark,
    /// Timestamp of the latest completion that drew from this deposit.
    pub last_used_at: Option<i64>,
}

impl Deposit {
    /// Build the full view, embedding `transfers` in the order given.
    pub fn to_view<'a>(&self, transfers: impl IntoIterator<Item = &'a Transfer>) -> DepositView {
        DepositView {
            deposit_id: self.deposit_id.clone(),
            depositor: self.depositor.clone(),
            token: self.token.clone(),
            is_native: self.is_native,
            initial_amount: self.initial_amount,
            remaining_amount: self.remaining_amount,
            released: self.released,
            created_at: self.created.timestamp,
            created_at_block: self.created.block_number,
            tx_hash: self.created.tx_hash.clone(),
            last_used_at: self.last_used_at,
            transfers: Connection {
                items: transfers.into_iter().map(Transfer::to_summary).collect(),
            },
        }
    }

    pub fn to_summary(&self) -> DepositSummary {
        DepositSummary {
            deposit_id: self.deposit_id.clone(),
            depositor: self.depositor.clone(),
            initial_amount: self.initial_amount,
            remaining_amount: self.remaining_amount,
            is_native: self.is_native,
            released: self.released,
        }
    }
}
