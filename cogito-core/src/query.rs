//! Read side: immutable snapshots and the queries run against them.
//!
//! The projector publishes a new [`ReadModel`] after every change. Readers
//! clone the `Arc` out of the watch channel and never block ingestion.
//!
//! Ordering puts missing sort keys last in both directions and breaks ties
//! by id ascending. `totalCount` counts matches before pagination.

use std::cmp::Ordering;
use std::sync::Arc;

use cogito_sdk::objects::{
    ActivitiesQuery, ActivityOrderBy, Amount, DepositId, DepositOrderBy, DepositView,
    DepositsQuery, OrderDirection, Page, PageLimits, TransferId, TransferOrderBy, TransferView,
    TransfersQuery, UserActivityView,
};
use tokio::sync::watch;

use crate::entities::{Deposit, Transfer, UserActivity};
use crate::projection::Projection;

/// One published state of the projection.
#[derive(Debug, Clone, Default)]
pub struct ReadModel {
    /// Log revision this snapshot reflects.
    pub revision: u64,
    pub projection: Projection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Int(i64),
    Amount(Amount),
}

impl ReadModel {
    pub fn deposit(&self, id: &DepositId) -> Option<DepositView> {
        self.projection
            .deposit(id)
            .map(|deposit| self.deposit_view(deposit))
    }

    pub fn transfer(&self, id: &TransferId) -> Option<TransferView> {
        self.projection
            .transfer(id)
            .map(|transfer| self.transfer_view(transfer))
    }

    pub fn deposits(&self, query: &DepositsQuery, limits: PageLimits) -> Page<DepositView> {
        let mut matches: Vec<&Deposit> = self
            .projection
            .deposits()
            .filter(|d| query.depositor.as_ref().is_none_or(|who| &d.depositor == who))
            .collect();

        let key = |d: &Deposit| match query.order_by {
            DepositOrderBy::CreatedAt => Some(SortKey::Int(d.created.timestamp)),
            DepositOrderBy::LastUsedAt => d.last_used_at.map(SortKey::Int),
            DepositOrderBy::InitialAmount => Some(SortKey::Amount(d.initial_amount)),
            DepositOrderBy::RemainingAmount => Some(SortKey::Amount(d.remaining_amount)),
        };
        matches.sort_by(|a, b| {
            compare(key(a), key(b), query.order_direction).then_with(|| a.deposit_id.cmp(&b.deposit_id))
        });

        paginate(matches, limits.clamp(query.limit), query.offset, |d| {
            self.deposit_view(d)
        })
    }

    pub fn transfers(&self, query: &TransfersQuery, limits: PageLimits) -> Page<TransferView> {
        let mut matches: Vec<&Transfer> = self
            .projection
            .transfers()
            .filter(|t| query.sender.as_ref().is_none_or(|s| &t.sender == s))
            .filter(|t| query.receiver.is_none() || t.receiver == query.receiver)
            .filter(|t| query.deposit_id.as_ref().is_none_or(|d| &t.deposit_id == d))
            .filter(|t| query.status.is_none_or(|s| t.status == s))
            .collect();

        let at = |t: &Transfer, status| t.stage(status).map(|m| SortKey::Int(m.timestamp));
        let key = |t: &Transfer| {
            use cogito_sdk::objects::TransferStatus as S;
            match query.order_by {
                TransferOrderBy::InitiatedAt => at(t, S::Initiated),
                TransferOrderBy::StoredAt => at(t, S::Stored),
                TransferOrderBy::AcknowledgedAt => at(t, S::Acknowledged),
                TransferOrderBy::ProcessedAt => at(t, S::Processed),
                TransferOrderBy::CompletedAt => at(t, S::Completed),
                TransferOrderBy::Amount => t.amount.map(SortKey::Amount),
            }
        };
        matches.sort_by(|a, b| {
            compare(key(a), key(b), query.order_direction)
                .then_with(|| a.transfer_id.cmp(&b.transfer_id))
        });

        paginate(matches, limits.clamp(query.limit), query.offset, |t| {
            self.transfer_view(t)
        })
    }

    pub fn activities(&self, query: &ActivitiesQuery, limits: PageLimits) -> Page<UserActivityView> {
        let mut matches: Vec<&UserActivity> = self
            .projection
            .activities()
            .filter(|a| query.user.as_ref().is_none_or(|u| &a.user == u))
            .filter(|a| query.kind.is_none_or(|k| a.kind == k))
            .collect();

        let key = |a: &UserActivity| match query.order_by {
            ActivityOrderBy::Timestamp => Some(SortKey::Int(a.timestamp)),
            ActivityOrderBy::BlockNumber => i64::try_from(a.source.block_number).ok().map(SortKey::Int),
        };
        matches.sort_by(|a, b| {
            compare(key(a), key(b), query.order_direction).then_with(|| a.id.cmp(&b.id))
        });

        paginate(matches, limits.clamp(query.limit), query.offset, UserActivity::to_view)
    }

    fn deposit_view(&self, deposit: &Deposit) -> DepositView {
        deposit.to_view(self.projection.transfers_of(&deposit.deposit_id))
    }

    fn transfer_view(&self, transfer: &Transfer) -> TransferView {
        transfer.to_view(self.projection.deposit(&transfer.deposit_id))
    }
}

/// Missing keys sort last whatever the direction.
fn compare<K: Ord>(a: Option<K>, b: Option<K>, direction: OrderDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            OrderDirection::Asc => a.cmp(&b),
            OrderDirection::Desc => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn paginate<T, V>(matches: Vec<&T>, limit: u32, offset: u32, view: impl Fn(&T) -> V) -> Page<V> {
    let total_count = matches.len() as u64;
    let items = matches
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(view)
        .collect();
    Page { items, total_count }
}

/// Handle to the latest published [`ReadModel`].
#[derive(Debug, Clone)]
pub struct ReadModelReader {
    rx: watch::Receiver<Arc<ReadModel>>,
}

pub type ReadModelPublisher = watch::Sender<Arc<ReadModel>>;

/// Create the snapshot channel, starting from an empty model.
pub fn read_model_channel() -> (ReadModelPublisher, ReadModelReader) {
    let (tx, rx) = watch::channel(Arc::new(ReadModel::default()));
    (tx, ReadModelReader { rx })
}

impl ReadModelReader {
    pub fn snapshot(&self) -> Arc<ReadModel> {
        self.rx.borrow().clone()
    }

    /// Wait until a snapshot at or past `revision` is published.
    pub async fn wait_for_revision(
        &mut self,
        revision: u64,
    ) -> Result<Arc<ReadModel>, watch::error::RecvError> {
        let model = self.rx.wait_for(|model| model.revision >= revision).await?;
        Ok(model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tests::{deposit_created, initiated, stored};
    use crate::projection::replay;
    use crate::projection::tests::full_lifecycle;
    use cogito_sdk::objects::{ActivityKind, Address, TransferStatus};

    fn model(events: &[cogito_sdk::objects::ChainEvent]) -> ReadModel {
        ReadModel {
            revision: 1,
            projection: replay(events),
        }
    }

    #[test]
    fn test_lifecycle_scenario() {
        let model = model(&full_lifecycle());

        let d1 = model.deposit(&DepositId::from("D1")).unwrap();
        assert_eq!(d1.remaining_amount, Amount::from_u128(60));
        assert_eq!(d1.transfers.items.len(), 1);
        assert_eq!(d1.transfers.items[0].status, TransferStatus::Completed);

        let t1 = model.transfer(&TransferId::from("T1")).unwrap();
        assert_eq!(t1.deposit.unwrap().remaining_amount, Amount::from_u128(60));

        let bob = model.activities(
            &ActivitiesQuery {
                user: Some(Address::new("0xBOB")),
                ..Default::default()
            },
            PageLimits::default(),
        );
        assert_eq!(bob.total_count, 1);
        assert_eq!(bob.items[0].kind, ActivityKind::Receive);
        assert_eq!(bob.items[0].amount, Amount::from_u128(40));
    }

    #[test]
    fn test_unknown_ids_are_none() {
        let model = model(&full_lifecycle());
        assert!(model.deposit(&DepositId::from("nope")).is_none());
        assert!(model.transfer(&TransferId::from("nope")).is_none());
    }

    #[test]
    fn test_nulls_sort_last_both_directions() {
        let mut events = full_lifecycle();
        events.push(deposit_created(7, "D0", 5));
        let model = model(&events);

        for direction in [OrderDirection::Asc, OrderDirection::Desc] {
            let page = model.deposits(
                &DepositsQuery {
                    order_by: DepositOrderBy::LastUsedAt,
                    order_direction: direction,
                    ..Default::default()
                },
                PageLimits::default(),
            );
            let ids: Vec<&str> = page.items.iter().map(|d| d.deposit_id.as_str()).collect();
            assert_eq!(ids, vec!["D1", "D0"], "{direction:?}");
        }
    }

    #[test]
    fn test_ties_break_by_id_and_pagination_counts_all() {
        let mut events = vec![deposit_created(1, "D1", 100)];
        for (i, id) in ["Tc", "Ta", "Tb"].into_iter().enumerate() {
            let mut e = initiated(2 + i as u64, id, "D1");
            e.block_timestamp = 42;
            events.push(e);
        }
        let model = model(&events);

        let page = model.transfers(
            &TransfersQuery {
                deposit_id: Some(DepositId::from("D1")),
                limit: Some(2),
                offset: 1,
                ..Default::default()
            },
            PageLimits::default(),
        );
        assert_eq!(page.total_count, 3);
        let ids: Vec<&str> = page.items.iter().map(|t| t.transfer_id.as_str()).collect();
        assert_eq!(ids, vec!["Tb", "Tc"]);
    }

    #[test]
    fn test_transfer_filters() {
        let mut events = full_lifecycle();
        events.extend([initiated(7, "T2", "D1"), stored(8, "T2")]);
        let model = model(&events);
        let limits = PageLimits::default();

        let by_receiver = model.transfers(
            &TransfersQuery {
                receiver: Some(Address::new("0xBoB")),
                ..Default::default()
            },
            limits,
        );
        assert_eq!(by_receiver.total_count, 1);

        let stored_only = model.transfers(
            &TransfersQuery {
                status: Some(TransferStatus::Stored),
                ..Default::default()
            },
            limits,
        );
        assert_eq!(stored_only.items[0].transfer_id, TransferId::from("T2"));

        let by_amount = model.transfers(
            &TransfersQuery {
                order_by: TransferOrderBy::Amount,
                order_direction: OrderDirection::Asc,
                ..Default::default()
            },
            limits,
        );
        // T2 has no amount yet and goes last.
        let ids: Vec<&str> = by_amount.items.iter().map(|t| t.transfer_id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T2"]);
    }

    #[tokio::test]
    async fn test_reader_waits_for_revision() {
        let (tx, mut reader) = read_model_channel();
        assert_eq!(reader.snapshot().revision, 0);

        let publisher = tokio::spawn(async move {
            tx.send_replace(Arc::new(ReadModel {
                revision: 3,
                projection: Projection::default(),
            }));
            tx
        });
        let model = reader.wait_for_revision(3).await.unwrap();
        assert_eq!(model.revision, 3);
        drop(publisher.await.unwrap());
    }
}
