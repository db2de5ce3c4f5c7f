//! Ingester processor.
//!
//! The Ingester is the single writer of the event log. It:
//! - Admits incoming batches through [`IngestState`] and persists what it appends
//! - Holds transfers whose deposit has not arrived yet and sweeps stale ones
//! - Retracts events above a block on reorg
//! - Tells the projector to apply new events or to rebuild from a snapshot
//!
//! Callers talk to it through an [`IngestHandle`], which implements
//! [`Processor`] for every request type.

use std::sync::Arc;
use std::time::Duration;

use cogito_sdk::objects::ChainEvent;
use cogito_sdk::objects::admin::{IngestResponse, RetractResponse};
use kanau::processor::Processor;
use time::OffsetDateTime;
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{IngestSettings, SettingsWatcher};
use crate::events::{
    IngestCommand, IngestCommandReceiver, IngestCommandSender, IngestStatus, ProjectionCommand,
    ProjectionCommandSender,
};
use crate::ingest::{BatchOutcome, HeldEvent, IngestError, IngestState};
use crate::issues::IssueLog;
use crate::log::EventLog;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct Ingester {
    log: Arc<dyn EventLog>,
    state: IngestState,
    issues: IssueLog,
    projection_tx: ProjectionCommandSender,
}

impl Ingester {
    /// Load the persisted log and ask the projector for an initial rebuild.
    pub async fn bootstrap(
        log: Arc<dyn EventLog>,
        issues: IssueLog,
        projection_tx: ProjectionCommandSender,
    ) -> Result<Self, IngestError> {
        let events = log.load().await?;
        let ingester = Self {
            log,
            state: IngestState::from_events(events),
            issues,
            projection_tx,
        };
        info!(
            logged_events = ingester.state.status().logged_events,
            tip = ?ingester.state.tip(),
            "Event log loaded"
        );
        ingester.request_rebuild().await?;
        Ok(ingester)
    }

    /// Run until shutdown is signaled or every [`IngestHandle`] is dropped.
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut command_rx: IngestCommandReceiver,
        mut settings: SettingsWatcher<IngestSettings>,
    ) {
        let mut current = settings.current();
        let mut sweep = sweep_interval(current.orphan_sweep_interval);
        info!("Ingester started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Ingester received shutdown signal");
                        break;
                    }
                }

                Ok(()) = settings.changed() => {
                    let next = settings.current();
                    if next.orphan_sweep_interval != current.orphan_sweep_interval {
                        sweep = sweep_interval(next.orphan_sweep_interval);
                    }
                    info!(
                        reorg_window_blocks = next.reorg_window_blocks,
                        orphan_timeout = ?next.orphan_timeout,
                        max_batch_size = next.max_batch_size,
                        "Ingester settings reloaded"
                    );
                    current = next;
                }

                command = command_rx.recv() => match command {
                    Some(command) => self.handle(command, &current).await,
                    None => {
                        info!("Ingest command channel closed");
                        break;
                    }
                },

                _ = sweep.tick() => self.sweep(&current).await,
            }
        }

        info!("Ingester shutdown complete");
    }

    async fn handle(&mut self, command: IngestCommand, settings: &IngestSettings) {
        match command {
            IngestCommand::Ingest { events, reply } => {
                let result = self.ingest(events, settings).await;
                let _ = reply.send(result);
            }
            IngestCommand::Retract { above_block, reply } => {
                let result = self.retract(above_block).await;
                let _ = reply.send(result);
            }
            IngestCommand::Reproject { reply } => {
                info!(revision = self.state.revision(), "Re-projection requested");
                let result = self.request_rebuild().await.map(|()| self.state.revision());
                let _ = reply.send(result);
            }
            IngestCommand::Status { reply } => {
                let _ = reply.send(self.state.status());
            }
        }
    }

    async fn ingest(
        &mut self,
        events: Vec<ChainEvent>,
        settings: &IngestSettings,
    ) -> Result<IngestResponse, IngestError> {
        if events.len() > settings.max_batch_size {
            return Err(IngestError::BatchTooLarge {
                size: events.len(),
                limit: settings.max_batch_size,
            });
        }

        let submitted = events.len();
        let BatchOutcome {
            outcomes,
            mut appended,
            released,
            released_held,
            issues,
            requires_rebuild,
            revision,
        } = self.state.ingest_batch(
            events,
            settings.reorg_window_blocks,
            OffsetDateTime::now_utc(),
        );

        for issue in &issues {
            warn!(
                key = %issue.key,
                event_type = %issue.kind,
                category = ?issue.reason.category(),
                reason = %issue.reason,
                "Event rejected at ingest"
            );
        }
        self.issues.record(issues).await;

        let appended_count = appended.len();
        if !appended.is_empty() {
            if let Err(e) = self.log.append(&appended).await {
                error!(error = %e, "Failed to persist events, reloading the event log");
                self.reload(released_held).await;
                return Err(e.into());
            }

            if requires_rebuild {
                info!(revision, "Events landed below the tip, rebuilding projection");
                self.request_rebuild().await?;
            } else {
                appended.sort_by_key(ChainEvent::key);
                self.projection_tx
                    .send(ProjectionCommand::Apply {
                        events: appended,
                        revision,
                    })
                    .await
                    .map_err(|_| IngestError::ProjectorClosed)?;
            }
        }

        debug!(
            submitted,
            appended = appended_count,
            released = released.len(),
            pending_orphans = self.state.pending_orphans(),
            revision,
            "Batch ingested"
        );

        Ok(IngestResponse {
            outcomes,
            released,
            revision,
        })
    }

    async fn retract(&mut self, above_block: u64) -> Result<RetractResponse, IngestError> {
        let removed = self.log.retract_above(above_block).await?;
        let (retracted, dropped_pending) = self.state.retract_above(above_block);
        if removed != retracted {
            warn!(
                stored = removed,
                in_memory = retracted,
                "Retracted event counts differ between storage and memory"
            );
        }
        info!(above_block, retracted, dropped_pending, "Retracted events");

        self.request_rebuild().await?;
        Ok(RetractResponse {
            retracted,
            dropped_pending,
            revision: self.state.revision(),
        })
    }

    async fn sweep(&mut self, settings: &IngestSettings) {
        let expired = self
            .state
            .sweep(OffsetDateTime::now_utc(), settings.orphan_timeout);
        if expired.is_empty() {
            return;
        }
        for issue in &expired {
            warn!(key = %issue.key, reason = %issue.reason, "Dropped orphaned event");
        }
        self.issues.record(expired).await;
    }

    /// Bring the in-memory log back in line with storage after a failed write.
    /// Resync with storage after a failed append. `released` are the
    /// orphans the failed batch took off hold.
    async fn reload(&mut self, released: Vec<HeldEvent>) {
        match self.log.load().await {
            Ok(events) => {
                self.state.restore_log(events);
                self.state.rehold(released);
                if let Err(e) = self.request_rebuild().await {
                    error!(error = %e, "Failed to request rebuild after reload");
                }
            }
            Err(e) => error!(error = %e, "Failed to reload the event log"),
        }
    }

    async fn request_rebuild(&self) -> Result<(), IngestError> {
        self.projection_tx
            .send(ProjectionCommand::Rebuild {
                snapshot: self.state.snapshot(),
                revision: self.state.revision(),
            })
            .await
            .map_err(|_| IngestError::ProjectorClosed)
    }
}

fn sweep_interval(period: Duration) -> Interval {
    let period = period.max(MIN_SWEEP_INTERVAL);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable front door of the [`Ingester`].
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: IngestCommandSender,
}

/// Append a batch of chain events.
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub events: Vec<ChainEvent>,
}

/// Drop every event above a block (reorg).
#[derive(Debug, Clone, Copy)]
pub struct RetractAbove {
    pub above_block: u64,
}

/// Force a full re-projection of the log.
#[derive(Debug, Clone, Copy)]
pub struct Reproject;

#[derive(Debug, Clone, Copy)]
pub struct GetIngestStatus;

impl IngestHandle {
    pub fn new(tx: IngestCommandSender) -> Self {
        Self { tx }
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> IngestCommand,
    ) -> Result<T, IngestError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| IngestError::IngesterClosed)?;
        rx.await.map_err(|_| IngestError::IngesterClosed)
    }
}

impl Processor<IngestBatch> for IngestHandle {
    type Output = IngestResponse;
    type Error = IngestError;

    async fn process(&self, batch: IngestBatch) -> Result<IngestResponse, IngestError> {
        self.call(|reply| IngestCommand::Ingest {
            events: batch.events,
            reply,
        })
        .await?
    }
}

impl Processor<RetractAbove> for IngestHandle {
    type Output = RetractResponse;
    type Error = IngestError;

    async fn process(&self, request: RetractAbove) -> Result<RetractResponse, IngestError> {
        self.call(|reply| IngestCommand::Retract {
            above_block: request.above_block,
            reply,
        })
        .await?
    }
}

impl Processor<Reproject> for IngestHandle {
    type Output = u64;
    type Error = IngestError;

    async fn process(&self, _: Reproject) -> Result<u64, IngestError> {
        self.call(|reply| IngestCommand::Reproject { reply }).await?
    }
}

impl Processor<GetIngestStatus> for IngestHandle {
    type Output = IngestStatus;
    type Error = IngestError;

    async fn process(&self, _: GetIngestStatus) -> Result<IngestStatus, IngestError> {
        self.call(|reply| IngestCommand::Status { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingsStore;
    use crate::events::{ProjectionCommandReceiver, ingest_command_channel, projection_command_channel};
    use crate::ingest::tests::{deposit_created, initiated, stored};
    use crate::log::{ChainEventInsert, LogError, MemoryEventLog};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use cogito_sdk::objects::admin::IngestOutcome;
    use cogito_sdk::objects::{DepositId, EventKey};

    struct Running {
        handle: IngestHandle,
        projection_rx: ProjectionCommandReceiver,
        issues: IssueLog,
        settings: SettingsStore<IngestSettings>,
        _shutdown_tx: watch::Sender<bool>,
    }

    async fn start(log: Arc<dyn EventLog>) -> Running {
        let (projection_tx, mut projection_rx) = projection_command_channel();
        let issues = IssueLog::default();
        let ingester = Ingester::bootstrap(log, issues.clone(), projection_tx)
            .await
            .unwrap();
        // Initial rebuild.
        assert!(matches!(
            projection_rx.recv().await,
            Some(ProjectionCommand::Rebuild { .. })
        ));

        let (tx, rx) = ingest_command_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = SettingsStore::new(IngestSettings::default());
        tokio::spawn(ingester.run(shutdown_rx, rx, settings.subscribe()));
        Running {
            handle: IngestHandle::new(tx),
            projection_rx,
            issues,
            settings,
            _shutdown_tx: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_rebuilds_from_stored_log() {
        let log = Arc::new(MemoryEventLog::new());
        log.append(&[deposit_created(1, "D1", 100)]).await.unwrap();

        let (projection_tx, mut projection_rx) = projection_command_channel();
        let ingester = Ingester::bootstrap(log, IssueLog::default(), projection_tx)
            .await
            .unwrap();
        assert_eq!(ingester.state.tip(), Some(EventKey::new(1, 0)));

        match projection_rx.recv().await {
            Some(ProjectionCommand::Rebuild { snapshot, revision }) => {
                assert_eq!(snapshot.len(), 1);
                assert_eq!(revision, 1);
            }
            other => unreachable!("expected rebuild, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ingest_above_tip_applies_incrementally() {
        let log = Arc::new(MemoryEventLog::new());
        let mut running = start(log.clone()).await;

        let response = running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(1, "D1", 100), initiated(2, "T1", "D1")],
            })
            .await
            .unwrap();
        assert_eq!(response.revision, 2);
        assert!(
            response
                .outcomes
                .iter()
                .all(|o| matches!(o, IngestOutcome::Accepted { .. }))
        );
        assert_eq!(log.load().await.unwrap().len(), 2);

        match running.projection_rx.recv().await {
            Some(ProjectionCommand::Apply { events, revision }) => {
                assert_eq!(revision, 2);
                assert_eq!(events.len(), 2);
            }
            other => unreachable!("expected apply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_late_event_inside_window_triggers_rebuild() {
        let log = Arc::new(MemoryEventLog::new());
        let mut running = start(log).await;

        running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(10, "D1", 100)],
            })
            .await
            .unwrap();
        running.projection_rx.recv().await;

        running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(5, "D0", 50)],
            })
            .await
            .unwrap();
        match running.projection_rx.recv().await {
            Some(ProjectionCommand::Rebuild { snapshot, .. }) => {
                let keys: Vec<_> = snapshot.iter().map(ChainEvent::key).collect();
                assert_eq!(keys, vec![EventKey::new(5, 0), EventKey::new(10, 0)]);
            }
            other => unreachable!("expected rebuild, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_held_transfer_released_with_its_deposit() {
        let log = Arc::new(MemoryEventLog::new());
        let mut running = start(log.clone()).await;

        let response = running
            .handle
            .process(IngestBatch {
                events: vec![initiated(3, "T1", "D1")],
            })
            .await
            .unwrap();
        assert_eq!(
            response.outcomes,
            vec![IngestOutcome::Held {
                key: EventKey::new(3, 0),
                deposit_id: DepositId::from("D1"),
            }]
        );
        let status = running.handle.process(GetIngestStatus).await.unwrap();
        assert_eq!(status.pending_orphans, 1);
        assert_eq!(status.logged_events, 0);

        let response = running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(1, "D1", 100)],
            })
            .await
            .unwrap();
        assert_eq!(response.released, vec![EventKey::new(3, 0)]);
        assert_eq!(log.load().await.unwrap().len(), 2);

        match running.projection_rx.recv().await {
            Some(ProjectionCommand::Apply { events, .. }) => {
                let keys: Vec<_> = events.iter().map(ChainEvent::key).collect();
                assert_eq!(keys, vec![EventKey::new(1, 0), EventKey::new(3, 0)]);
            }
            other => unreachable!("expected apply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_batch_limit_follows_settings() {
        let log = Arc::new(MemoryEventLog::new());
        let running = start(log).await;
        running.settings.update(IngestSettings {
            max_batch_size: 1,
            ..IngestSettings::default()
        });
        // Let the ingester observe the update.
        running.handle.process(GetIngestStatus).await.unwrap();

        let result = running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(1, "D1", 100), stored(2, "T1")],
            })
            .await;
        assert!(matches!(
            result,
            Err(IngestError::BatchTooLarge { size: 2, limit: 1 })
        ));
    }

    #[tokio::test]
    async fn test_rejections_are_recorded() {
        let log = Arc::new(MemoryEventLog::new());
        let running = start(log).await;

        let mut conflicting = deposit_created(1, "D1", 100);
        running
            .handle
            .process(IngestBatch {
                events: vec![conflicting.clone()],
            })
            .await
            .unwrap();
        conflicting.tx_hash = "0xdifferent".to_string();
        let response = running
            .handle
            .process(IngestBatch {
                events: vec![conflicting],
            })
            .await
            .unwrap();

        assert!(matches!(
            response.outcomes[0],
            IngestOutcome::Rejected { .. }
        ));
        assert_eq!(running.issues.len().await, 1);
    }

    #[tokio::test]
    async fn test_retract_rebuilds_without_removed_events() {
        let log = Arc::new(MemoryEventLog::new());
        let mut running = start(log.clone()).await;

        running
            .handle
            .process(IngestBatch {
                events: vec![
                    deposit_created(1, "D1", 100),
                    initiated(2, "T1", "D1"),
                    stored(3, "T1"),
                ],
            })
            .await
            .unwrap();
        running.projection_rx.recv().await;

        let response = running
            .handle
            .process(RetractAbove { above_block: 1 })
            .await
            .unwrap();
        assert_eq!(response.retracted, 2);
        assert_eq!(response.dropped_pending, 0);
        assert_eq!(log.load().await.unwrap().len(), 1);

        match running.projection_rx.recv().await {
            Some(ProjectionCommand::Rebuild { snapshot, revision }) => {
                assert_eq!(snapshot.len(), 1);
                assert_eq!(revision, response.revision);
            }
            other => unreachable!("expected rebuild, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reproject_sends_current_snapshot() {
        let log = Arc::new(MemoryEventLog::new());
        let mut running = start(log).await;

        let revision = running.handle.process(Reproject).await.unwrap();
        match running.projection_rx.recv().await {
            Some(ProjectionCommand::Rebuild { revision: sent, .. }) => assert_eq!(sent, revision),
            other => unreachable!("expected rebuild, got {other:?}"),
        }
    }

    struct FailingLog {
        inner: MemoryEventLog,
        failing: AtomicBool,
    }

    impl FailingLog {
        fn new() -> Self {
            Self {
                inner: MemoryEventLog::new(),
                failing: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl EventLog for FailingLog {
        async fn load(&self) -> Result<Vec<ChainEvent>, LogError> {
            self.inner.load().await
        }

        async fn append(&self, events: &[ChainEvent]) -> Result<u64, LogError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(LogError::Database(sqlx::Error::PoolClosed));
            }
            self.inner.append(events).await
        }

        async fn retract_above(&self, above_block: u64) -> Result<u64, LogError> {
            self.inner.retract_above(above_block).await
        }
    }

    #[tokio::test]
    async fn test_failed_append_restores_stored_state() {
        let log = Arc::new(FailingLog::new());
        let running = start(log).await;

        let result = running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(1, "D1", 100)],
            })
            .await;
        assert!(matches!(result, Err(IngestError::Log(_))));

        let status = running.handle.process(GetIngestStatus).await.unwrap();
        assert_eq!(status.logged_events, 0);
        assert_eq!(status.tip, None);
    }

    #[tokio::test]
    async fn test_failed_append_keeps_released_orphans_held() {
        let log = Arc::new(FailingLog::new());
        let running = start(log.clone()).await;

        running
            .handle
            .process(IngestBatch {
                events: vec![initiated(3, "T1", "D1")],
            })
            .await
            .unwrap();
        let result = running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(1, "D1", 100)],
            })
            .await;
        assert!(matches!(result, Err(IngestError::Log(_))));

        let status = running.handle.process(GetIngestStatus).await.unwrap();
        assert_eq!(status.logged_events, 0);
        assert_eq!(status.pending_orphans, 1);

        log.failing.store(false, Ordering::SeqCst);
        let response = running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(1, "D1", 100)],
            })
            .await
            .unwrap();
        assert_eq!(response.released, vec![EventKey::new(3, 0)]);
        assert_eq!(log.inner.load().await.unwrap().len(), 2);
    }

    /// Runs the Postgres row conversion on append.
    struct RowCheckingLog {
        inner: MemoryEventLog,
    }

    #[async_trait]
    impl EventLog for RowCheckingLog {
        async fn load(&self) -> Result<Vec<ChainEvent>, LogError> {
            self.inner.load().await
        }

        async fn append(&self, events: &[ChainEvent]) -> Result<u64, LogError> {
            for event in events {
                ChainEventInsert::try_from(event)?;
            }
            self.inner.append(events).await
        }

        async fn retract_above(&self, above_block: u64) -> Result<u64, LogError> {
            self.inner.retract_above(above_block).await
        }
    }

    #[tokio::test]
    async fn test_unstorable_event_does_not_sink_batch() {
        let log = Arc::new(RowCheckingLog {
            inner: MemoryEventLog::new(),
        });
        let running = start(log.clone()).await;

        let response = running
            .handle
            .process(IngestBatch {
                events: vec![deposit_created(1, "D1", 100), deposit_created(u64::MAX, "D2", 5)],
            })
            .await
            .unwrap();
        assert!(matches!(response.outcomes[0], IngestOutcome::Accepted { .. }));
        assert!(matches!(response.outcomes[1], IngestOutcome::Rejected { .. }));
        assert_eq!(log.inner.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_reports_closed_ingester() {
        let (tx, rx) = ingest_command_channel();
        drop(rx);
        let handle = IngestHandle::new(tx);
        assert!(matches!(
            handle.process(GetIngestStatus).await,
            Err(IngestError::IngesterClosed)
        ));
    }
}
