//! TOML file configuration structures.
//!
//! These structs directly map to the `cogito-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Ingestion tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_reorg_window_blocks")]
    pub reorg_window_blocks: u64,
    #[serde(default = "default_orphan_timeout_secs")]
    pub orphan_timeout_secs: u64,
    #[serde(default = "default_orphan_sweep_interval_secs")]
    pub orphan_sweep_interval_secs: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// How many ingest issues are kept in memory. Read at startup only.
    #[serde(default = "default_issue_capacity")]
    pub issue_capacity: usize,
    /// Blocking workers used by full re-projections. Defaults to the
    /// number of available cores. Read at startup only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuild_workers: Option<usize>,
}

fn default_reorg_window_blocks() -> u64 {
    64
}

fn default_orphan_timeout_secs() -> u64 {
    300
}

fn default_orphan_sweep_interval_secs() -> u64 {
    10
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_issue_capacity() -> usize {
    cogito_core::issues::DEFAULT_ISSUE_CAPACITY
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            reorg_window_blocks: default_reorg_window_blocks(),
            orphan_timeout_secs: default_orphan_timeout_secs(),
            orphan_sweep_interval_secs: default_orphan_sweep_interval_secs(),
            max_batch_size: default_max_batch_size(),
            issue_capacity: default_issue_capacity(),
            rebuild_workers: None,
        }
    }
}

/// Where the event log lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Postgres, reached through `DATABASE_URL`.
    #[default]
    Postgres,
    /// Process memory. Everything is lost on restart.
    Memory,
}

/// Storage configuration section. Read at startup only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            max_connections: default_max_connections(),
        }
    }
}

/// Page size bounds of the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

fn default_limit() -> u32 {
    50
}

fn default_max_limit() -> u32 {
    1000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}
