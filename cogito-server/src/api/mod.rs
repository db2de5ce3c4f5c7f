//! HTTP API.
//!
//! - Query API (`/api/v1/...`): public, read-only, served from snapshots
//! - Admin API (`/api/v1/admin/...`): operator endpoints behind [`extractors::AdminAuth`]

use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod extractors;
pub mod query;

/// Build the versioned API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(query::router())
        .nest("/admin", admin::router())
}
