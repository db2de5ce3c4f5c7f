//! Messages passed between the processors.
//!
//! # Flow
//!
//! 1. HTTP handlers send `IngestCommand` -> `Ingester`
//! 2. `Ingester` appends to the event log and sends `ProjectionCommand` -> `Projector`
//! 3. `Projector` publishes a `ReadModel` snapshot and broadcasts `StateChange`
//!    to subscription streams

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, IngestCommandReceiver, IngestCommandSender,
    ProjectionCommandReceiver, ProjectionCommandSender, STATE_CHANGE_BUFFER, StateChangeReceiver,
    StateChangeSender, ingest_command_channel, projection_command_channel, state_change_channel,
};
pub use types::{IngestCommand, IngestStatus, ProjectionCommand, StateChange};
