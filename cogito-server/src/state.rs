//! Application state shared across all request handlers.

use cogito_core::config::SharedConfig;
use cogito_core::events::{StateChangeReceiver, StateChangeSender};
use cogito_core::issues::IssueLog;
use cogito_core::processors::IngestHandle;
use cogito_core::query::ReadModelReader;
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around.
#[derive(Clone)]
pub struct AppState {
    /// Shared configuration with separate locks for each section.
    pub config: SharedConfig,
    /// Front door of the ingester.
    pub ingest: IngestHandle,
    /// Latest published read model.
    pub reader: ReadModelReader,
    /// Change notices for WebSocket subscriptions.
    pub changes: StateChangeSender,
    /// Issues recorded at ingest time.
    pub issues: IssueLog,
    /// Flips to `true` when the server shuts down.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        config: SharedConfig,
        ingest: IngestHandle,
        reader: ReadModelReader,
        changes: StateChangeSender,
        issues: IssueLog,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            ingest,
            reader,
            changes,
            issues,
            shutdown,
        }
    }

    /// Subscribe to change notices.
    pub fn subscribe_changes(&self) -> StateChangeReceiver {
        self.changes.subscribe()
    }
}
