use cogito_sdk::objects::{
    Address, Amount, DepositId, TransferId, TransferStatus, TransferSummary, TransferView,
};

use super::Deposit;

/// Where and when a lifecycle stage was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMark {
    pub timestamp: i64,
    pub block_number: u64,
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub transfer_id: TransferId,
    pub deposit_id: DepositId,
    pub sender: Address,
    /// Disclosed when the transfer is processed.
    pub receiver: Option<Address>,
    /// Disclosed at initiation, processing or completion; fixed once known.
    pub amount: Option<Amount>,
    pub token: Address,
    pub is_native: bool,
    pub status: TransferStatus,
    pub encrypted_data_hash: Option<String>,
    pub initiated: StageMark,
    pub stored: Option<StageMark>,
    pub acknowledged: Option<StageMark>,
    pub processed: Option<StageMark>,
    pub completed: Option<StageMark>,
}

impl Transfer {
    pub fn stage(&self, status: TransferStatus) -> Option<&StageMark> {
        match status {
            TransferStatus::Initiated => Some(&self.initiated),
            TransferStatus::Stored => self.stored.as_ref(),
            TransferStatus::Acknowledged => self.acknowledged.as_ref(),
            TransferStatus::Processed => self.processed.as_ref(),
            TransferStatus::Completed => self.completed.as_ref(),
        }
    }

    /// Record `status` as reached at `mark`. Earlier stages are untouched.
    pub fn advance(&mut self, status: TransferStatus, mark: StageMark) {
        match status {
            TransferStatus::Initiated => self.initiated = mark,
            TransferStatus::Stored => self.stored = Some(mark),
            TransferStatus::Acknowledged => self.acknowledged = Some(mark),
            TransferStatus::Processed => self.processed = Some(mark),
            TransferStatus::Completed => self.completed = Some(mark),
        }
        self.status = status;
    }

    /// Timestamp of the stage the transfer is currently in.
    pub fn current_timestamp(&self) -> i64 {
        self.stage(self.status)
            .map_or(self.initiated.timestamp, |mark| mark.timestamp)
    }

    pub fn to_summary(&self) -> TransferSummary {
        TransferSummary {
            transfer_id: self.transfer_id.clone(),
            status: self.status,
            receiver: self.receiver.clone(),
            amount: self.amount,
            initiated_at: self.initiated.timestamp,
            completed_at: self.completed.as_ref().map(|m| m.timestamp),
        }
    }

    /// Build the full view, embedding the funding deposit when known.
    pub fn to_view(&self, deposit: Option<&Deposit>) -> TransferView {
        let at = |m: &Option<StageMark>| m.as_ref().map(|m| m.timestamp);
        let block = |m: &Option<StageMark>| m.as_ref().map(|m| m.block_number);
        let tx = |m: &Option<StageMark>| m.as_ref().map(|m| m.tx_hash.clone());

        TransferView {
            transfer_id: self.transfer_id.clone(),
            deposit_id: self.deposit_id.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            amount: self.amount,
            token: self.token.clone(),
            is_native: self.is_native,
            status: self.status,
            encrypted_data_hash: self.encrypted_data_hash.clone(),
            initiated_at: self.initiated.timestamp,
            initiated_at_block: self.initiated.block_number,
            initiated_tx_hash: self.initiated.tx_hash.clone(),
            stored_at: at(&self.stored),
            stored_at_block: block(&self.stored),
            stored_tx_hash: tx(&self.stored),
            acknowledged_at: at(&self.acknowledged),
            acknowledged_at_block: block(&self.acknowledged),
            acknowledged_tx_hash: tx(&self.acknowledged),
            processed_at: at(&self.processed),
            processed_at_block: block(&self.processed),
            processed_tx_hash: tx(&self.processed),
            completed_at: at(&self.completed),
            completed_at_block: block(&self.completed),
            completed_tx_hash: tx(&self.completed),
            deposit: deposit.map(Deposit::to_summary),
        }
    }
}
