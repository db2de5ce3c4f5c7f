//! Projector processor.
//!
//! Folds logged events into the [`Projection`] and publishes immutable
//! [`ReadModel`] snapshots. Readers never observe a half-applied batch:
//! a snapshot is swapped in only after the whole command was applied.
//!
//! Rebuilds run off the loop on blocking workers. While one is in flight,
//! incremental batches are queued and replayed on top of its result; a
//! newer rebuild aborts the older one and discards the queue, since its
//! snapshot already covers everything logged so far. A rebuild that fails
//! falls back to a sequential replay of its snapshot on the loop, so the
//! queue is always drained.

use std::sync::Arc;

use cogito_sdk::objects::ChainEvent;
use cogito_sdk::objects::admin::IssueCategory;
use itertools::Itertools;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::events::{ProjectionCommand, ProjectionCommandReceiver, StateChange, StateChangeSender};
use crate::projection::{Projection, ProjectionError, default_workers, rebuild_parallel, replay};
use crate::query::{ReadModel, ReadModelPublisher};

type RebuildResult = Result<Result<Projection, ProjectionError>, JoinError>;

struct PendingRebuild {
    handle: JoinHandle<Result<Projection, ProjectionError>>,
    snapshot: Arc<[ChainEvent]>,
    revision: u64,
}

pub struct Projector {
    publisher: ReadModelPublisher,
    change_tx: StateChangeSender,
    workers: usize,
    model: ReadModel,
}

impl Projector {
    pub fn new(publisher: ReadModelPublisher, change_tx: StateChangeSender) -> Self {
        let model = ReadModel::clone(&publisher.borrow());
        Self {
            publisher,
            change_tx,
            workers: default_workers(),
            model,
        }
    }

    /// Number of blocking workers used by full rebuilds.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run until shutdown is signaled, or until the ingester is gone and
    /// no rebuild is left in flight.
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        mut command_rx: ProjectionCommandReceiver,
    ) {
        let mut pending: Option<PendingRebuild> = None;
        let mut queued: Vec<(Vec<ChainEvent>, u64)> = Vec::new();
        let mut closed = false;
        info!(workers = self.workers, "Projector started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Projector received shutdown signal");
                        break;
                    }
                }

                joined = wait_rebuild(&mut pending) => {
                    if let Some(finished) = pending.take() {
                        self.finish_rebuild(joined, finished.revision, &finished.snapshot, &mut queued);
                    }
                    if closed {
                        break;
                    }
                }

                command = command_rx.recv(), if !closed => match command {
                    Some(ProjectionCommand::Apply { events, revision }) => {
                        if pending.is_some() {
                            debug!(revision, events = events.len(), "Queued batch behind rebuild");
                            queued.push((events, revision));
                        } else {
                            self.apply(&events, revision);
                        }
                    }
                    Some(ProjectionCommand::Rebuild { snapshot, revision }) => {
                        if let Some(superseded) = pending.take() {
                            superseded.handle.abort();
                            debug!(superseded = superseded.revision, revision, "Superseded in-flight rebuild");
                        }
                        queued.clear();
                        info!(revision, events = snapshot.len(), "Rebuilding projection");
                        pending = Some(PendingRebuild {
                            handle: tokio::spawn(rebuild_parallel(Arc::clone(&snapshot), self.workers)),
                            snapshot,
                            revision,
                        });
                    }
                    None => {
                        info!("Projection command channel closed");
                        if pending.is_none() {
                            break;
                        }
                        closed = true;
                    }
                },
            }
        }

        if let Some(pending) = pending {
            pending.handle.abort();
        }
        info!("Projector shutdown complete");
    }

    fn apply(&mut self, events: &[ChainEvent], revision: u64) {
        let seen = self.model.projection.rejections().len();
        let changes: Vec<StateChange> = events
            .iter()
            .flat_map(|event| self.model.projection.ingest(event))
            .unique()
            .collect();
        log_rejections(&self.model.projection, seen);

        self.model.revision = revision;
        self.publish();
        for change in changes {
            // No subscribers is fine.
            let _ = self.change_tx.send(change);
        }
        debug!(revision, events = events.len(), "Applied batch");
    }

    fn finish_rebuild(
        &mut self,
        joined: RebuildResult,
        revision: u64,
        snapshot: &[ChainEvent],
        queued: &mut Vec<(Vec<ChainEvent>, u64)>,
    ) {
        let mut projection = match joined {
            Ok(Ok(projection)) => projection,
            Ok(Err(e)) => {
                error!(revision, error = %e, "Parallel rebuild failed, replaying sequentially");
                replay(snapshot)
            }
            Err(e) => {
                error!(revision, error = %e, "Rebuild task failed, replaying sequentially");
                replay(snapshot)
            }
        };

        let rejections = projection.rejections().len();
        let mut revision = revision;
        let replayed = queued.len();
        for (events, batch_revision) in queued.drain(..) {
            for event in &events {
                projection.ingest(event);
            }
            revision = batch_revision;
        }
        log_rejections(&projection, rejections);

        info!(
            revision,
            replayed,
            deposits = projection.deposit_count(),
            transfers = projection.transfer_count(),
            rejections = projection.rejections().len(),
            "Projection rebuilt"
        );
        self.model = ReadModel {
            revision,
            projection,
        };
        self.publish();
        let _ = self.change_tx.send(StateChange::Rebuilt);
    }

    fn publish(&self) {
        self.publisher.send_replace(Arc::new(self.model.clone()));
    }
}

async fn wait_rebuild(pending: &mut Option<PendingRebuild>) -> RebuildResult {
    match pending.as_mut() {
        Some(pending) => (&mut pending.handle).await,
        None => std::future::pending().await,
    }
}

/// Log rejections recorded after the first `seen`.
fn log_rejections(projection: &Projection, seen: usize) {
    for issue in projection.rejections().iter().skip(seen) {
        match issue.reason.category() {
            IssueCategory::InvariantViolation => error!(
                key = %issue.key,
                event_type = %issue.kind,
                reason = %issue.reason,
                "Event violates a projection invariant"
            ),
            category => warn!(
                key = %issue.key,
                event_type = %issue.kind,
                ?category,
                reason = %issue.reason,
                "Event rejected by projection"
            ),
        }
    }
}
