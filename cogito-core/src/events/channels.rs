//! Channel factories and handle aliases.

use super::types::{IngestCommand, ProjectionCommand, StateChange};
use tokio::sync::{broadcast, mpsc};

/// Default buffer size for command channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Buffer of the state change broadcast. Subscribers that fall further
/// behind observe `Lagged` and re-read the current snapshot.
pub const STATE_CHANGE_BUFFER: usize = 1024;

pub type IngestCommandSender = mpsc::Sender<IngestCommand>;
pub type IngestCommandReceiver = mpsc::Receiver<IngestCommand>;

pub type ProjectionCommandSender = mpsc::Sender<ProjectionCommand>;
pub type ProjectionCommandReceiver = mpsc::Receiver<ProjectionCommand>;

pub type StateChangeSender = broadcast::Sender<StateChange>;
pub type StateChangeReceiver = broadcast::Receiver<StateChange>;

/// Create the channel between request handlers and the ingester.
pub fn ingest_command_channel() -> (IngestCommandSender, IngestCommandReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the channel between the ingester and the projector.
pub fn projection_command_channel() -> (ProjectionCommandSender, ProjectionCommandReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the state change broadcast. More receivers come from
/// [`broadcast::Sender::subscribe`].
pub fn state_change_channel() -> (StateChangeSender, StateChangeReceiver) {
    broadcast::channel(STATE_CHANGE_BUFFER)
}
