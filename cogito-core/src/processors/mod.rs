//! Long-running processors.
//!
//! - `Ingester`: receives `IngestCommand`, writes the event log, emits `ProjectionCommand`
//! - `Projector`: receives `ProjectionCommand`, publishes `ReadModel`, broadcasts `StateChange`

pub mod ingester;
pub mod projector;

pub use ingester::{GetIngestStatus, IngestBatch, IngestHandle, Ingester, Reproject, RetractAbove};
pub use projector::Projector;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IngestSettings, SettingsStore};
    use crate::events::{ingest_command_channel, projection_command_channel, state_change_channel};
    use crate::ingest::tests::{deposit_created, initiated};
    use crate::issues::IssueLog;
    use crate::log::{EventLog, MemoryEventLog};
    use crate::projection::tests::{acknowledged, completed, processed};
    use crate::query::read_model_channel;
    use cogito_sdk::objects::{Amount, DepositId, TransferId, TransferStatus};
    use kanau::processor::Processor;
    use std::sync::Arc;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_pipeline_serves_what_was_ingested() {
        let log: Arc<dyn EventLog> = Arc::new(MemoryEventLog::new());
        let (projection_tx, projection_rx) = projection_command_channel();
        let (ingest_tx, ingest_rx) = ingest_command_channel();
        let (publisher, mut reader) = read_model_channel();
        let (change_tx, _) = state_change_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = SettingsStore::new(IngestSettings::default());

        let ingester = Ingester::bootstrap(log, IssueLog::default(), projection_tx)
            .await
            .unwrap();
        let ingester_task = tokio::spawn(ingester.run(
            shutdown_rx.clone(),
            ingest_rx,
            settings.subscribe(),
        ));
        let projector_task = tokio::spawn(
            Projector::new(publisher, change_tx)
                .with_workers(2)
                .run(shutdown_rx, projection_rx),
        );
        let handle = IngestHandle::new(ingest_tx);

        // The transfer arrives before its deposit and is held.
        handle
            .process(IngestBatch {
                events: vec![
                    initiated(2, "T1", "D1"),
                    crate::ingest::tests::stored(3, "T1"),
                ],
            })
            .await
            .unwrap();
        let response = handle
            .process(IngestBatch {
                events: vec![
                    deposit_created(1, "D1", 100),
                    acknowledged(4, "T1"),
                    processed(5, "T1", "0xBob"),
                    completed(6, "T1", 40),
                ],
            })
            .await
            .unwrap();
        assert_eq!(response.released.len(), 2);

        let before_retract = reader.wait_for_revision(response.revision).await.unwrap();
        let transfer = before_retract.transfer(&TransferId::from("T1")).unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);
        let deposit = before_retract.deposit(&DepositId::from("D1")).unwrap();
        assert_eq!(deposit.remaining_amount, Amount::from_u128(60));

        let retract = handle.process(RetractAbove { above_block: 4 }).await.unwrap();
        let model = reader.wait_for_revision(retract.revision).await.unwrap();
        let transfer = model.transfer(&TransferId::from("T1")).unwrap();
        assert_eq!(transfer.status, TransferStatus::Acknowledged);
        let deposit = model.deposit(&DepositId::from("D1")).unwrap();
        assert_eq!(deposit.remaining_amount, Amount::from_u128(100));

        // Re-delivering the retracted blocks restores the same read model.
        let redelivered = handle
            .process(IngestBatch {
                events: vec![processed(5, "T1", "0xBob"), completed(6, "T1", 40)],
            })
            .await
            .unwrap();
        assert!(redelivered.revision > retract.revision);
        let model = reader.wait_for_revision(redelivered.revision).await.unwrap();
        assert_eq!(model.projection, before_retract.projection);

        shutdown_tx.send(true).unwrap();
        ingester_task.await.unwrap();
        projector_task.await.unwrap();
    }
}
