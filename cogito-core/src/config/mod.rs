//! Runtime configuration shared between the processors and the server.
//!
//! Loading and validating the TOML file is handled by the server crate.

mod ingest;
mod settings_store;

pub use cogito_sdk::config::{AdminConfig, ServerConfig};
pub use cogito_sdk::objects::PageLimits;
pub use ingest::IngestSettings;
pub use settings_store::{SettingsStore, SettingsWatcher};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
#[derive(Clone)]
pub struct SharedConfig {
    /// Server configuration (listen address).
    pub server: Arc<RwLock<ServerConfig>>,
    /// Admin configuration (authentication).
    pub admin: Arc<RwLock<AdminConfig>>,
    /// Page size bounds of the query API.
    pub query: Arc<RwLock<PageLimits>>,
    /// Ingester tunables, observed live by the ingester.
    pub ingest: SettingsStore<IngestSettings>,
}
