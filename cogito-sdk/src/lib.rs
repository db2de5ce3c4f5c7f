//! Shared types for the c0gito activity read model.
//!
//! - [`objects`]: wire types for chain events, projected views, queries,
//!   subscription frames, and the admin API.
//! - [`config`]: configuration types shared by the server crates.
//! - `client` (feature `client`): typed HTTP and WebSocket clients.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod config;
pub mod objects;

#[cfg(feature = "client")]
pub mod client;
