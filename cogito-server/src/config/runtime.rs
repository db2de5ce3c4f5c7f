//! Runtime configuration re-exports.
//!
//! The shared config types live in `cogito-core::config`.

pub use cogito_core::config::{
    AdminConfig, IngestSettings, PageLimits, ServerConfig, SettingsStore, SharedConfig,
};
