//! Configuration module for cogito-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;
pub mod runtime;

use crate::config::file::{FileConfig, IngestConfig, QueryConfig, StorageConfig};
use crate::config::runtime::{
    AdminConfig, IngestSettings, PageLimits, ServerConfig, SettingsStore, SharedConfig,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub query: PageLimits,
    pub ingest: IngestSettings,
    pub storage: StorageConfig,
    pub issue_capacity: usize,
    pub rebuild_workers: Option<usize>,
}

impl LoadedConfig {
    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(RwLock::new(self.server)),
            admin: Arc::new(RwLock::new(self.admin)),
            query: Arc::new(RwLock::new(self.query)),
            ingest: SettingsStore::new(self.ingest),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = cogito_sdk::config::hash_secret(&file_config.admin.secret)
                .map_err(|e| ConfigError::HashError(e.to_string()))?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(build_loaded_config(file_config, secret_hash))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.admin.secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "admin.secret must not be empty".to_string(),
            ));
        }

        let ingest = &config.ingest;
        if ingest.max_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.max_batch_size must be at least 1".to_string(),
            ));
        }
        if ingest.orphan_timeout_secs == 0 || ingest.orphan_sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.orphan_timeout_secs and ingest.orphan_sweep_interval_secs must be at least 1"
                    .to_string(),
            ));
        }
        if ingest.rebuild_workers == Some(0) {
            return Err(ConfigError::ValidationError(
                "ingest.rebuild_workers must be at least 1".to_string(),
            ));
        }

        let query = &config.query;
        if query.max_limit == 0 || query.default_limit == 0 || query.default_limit > query.max_limit
        {
            return Err(ConfigError::ValidationError(format!(
                "query limits must satisfy 1 <= default_limit ({}) <= max_limit ({})",
                query.default_limit, query.max_limit
            )));
        }

        if config.storage.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "storage.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn build_loaded_config(file_config: FileConfig, secret_hash: String) -> LoadedConfig {
    let FileConfig {
        server,
        ingest,
        storage,
        query,
        ..
    } = file_config;

    LoadedConfig {
        server: ServerConfig {
            listen: server.listen,
        },
        admin: AdminConfig::new(secret_hash),
        query: convert_query(&query),
        issue_capacity: ingest.issue_capacity,
        rebuild_workers: ingest.rebuild_workers,
        ingest: convert_ingest(&ingest),
        storage,
    }
}

fn convert_ingest(i: &IngestConfig) -> IngestSettings {
    IngestSettings {
        reorg_window_blocks: i.reorg_window_blocks,
        orphan_timeout: Duration::from_secs(i.orphan_timeout_secs),
        orphan_sweep_interval: Duration::from_secs(i.orphan_sweep_interval_secs),
        max_batch_size: i.max_batch_size,
    }
}

fn convert_query(q: &QueryConfig) -> PageLimits {
    PageLimits {
        default_limit: q.default_limit,
        max_limit: q.max_limit,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
