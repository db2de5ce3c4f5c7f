use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    response::IntoResponse,
};
use cogito_sdk::objects::ActivitiesQuery;

use super::QueryApiError;
use crate::state::AppState;

/// `GET /activities` — activity feed entries, usually filtered by `user`.
pub(super) async fn list_activities(
    state: State<AppState>,
    query: Result<Query<ActivitiesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, QueryApiError> {
    let Query(query) = query?;
    let limits = *state.config.query.read().await;
    Ok(Json(state.reader.snapshot().activities(&query, limits)))
}
