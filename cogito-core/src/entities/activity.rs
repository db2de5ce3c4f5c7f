use cogito_sdk::objects::{
    ActivityKind, Address, Amount, DepositId, EventKey, TransferId, UserActivityView,
};

/// One entry of a user's activity feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserActivity {
    /// `{txHash}-{logIndex}-{deposit|send|receive}`
    pub id: String,
    /// Position of the event that produced this entry.
    pub source: EventKey,
    pub user: Address,
    pub kind: ActivityKind,
    pub deposit_id: Option<DepositId>,
    pub transfer_id: Option<TransferId>,
    pub amount: Amount,
    pub token: Address,
    pub is_native: bool,
    pub timestamp: i64,
    pub tx_hash: String,
    pub sender: Option<Address>,
    pub receiver: Option<Address>,
}

impl UserActivity {
    pub fn activity_id(tx_hash: &str, log_index: u32, kind: ActivityKind) -> String {
        let suffix = match kind {
            ActivityKind::Deposit => "deposit",
            ActivityKind::Send => "send",
            ActivityKind::Receive => "receive",
        };
        format!("{tx_hash}-{log_index}-{suffix}")
    }

    pub fn to_view(&self) -> UserActivityView {
        UserActivityView {
            id: self.id.clone(),
            user: self.user.clone(),
            kind: self.kind,
            deposit_id: self.deposit_id.clone(),
            transfer_id: self.transfer_id.clone(),
            amount: self.amount,
            token: self.token.clone(),
            is_native: self.is_native,
            timestamp: self.timestamp,
            block_number: self.source.block_number,
            tx_hash: self.tx_hash.clone(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_id_format() {
        assert_eq!(
            UserActivity::activity_id("0xabc", 4, ActivityKind::Receive),
            "0xabc-4-receive"
        );
        assert_eq!(
            UserActivity::activity_id("0xdef", 0, ActivityKind::Deposit),
            "0xdef-0-deposit"
        );
    }
}
