//! Configuration types shared by the server crates.
//!
//! These are validated runtime values. Parsing the TOML file and applying
//! CLI overrides is handled by the server crate.

mod admin;
mod server;

pub use admin::{AdminConfig, hash_secret};
pub use server::ServerConfig;
