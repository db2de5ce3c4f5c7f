//! Ingestion settings.

use std::time::Duration;

/// Tunables of the event ingester. Hot-reloadable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// How many blocks below the tip an event may land and still be
    /// inserted (followed by a full re-projection).
    pub reorg_window_blocks: u64,
    /// How long a transfer may wait for its deposit before it is dropped
    /// as orphaned.
    pub orphan_timeout: Duration,
    /// How often held events are checked against `orphan_timeout`.
    pub orphan_sweep_interval: Duration,
    /// Largest batch accepted by a single ingest call.
    pub max_batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            reorg_window_blocks: 64,
            orphan_timeout: Duration::from_secs(300),
            orphan_sweep_interval: Duration::from_secs(10),
            max_batch_size: 1000,
        }
    }
}
