use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::IntoResponse,
};
use cogito_sdk::objects::{TransferId, TransfersQuery};

use super::QueryApiError;
use crate::state::AppState;

/// `GET /transfers` — list transfers, each with its funding deposit embedded.
pub(super) async fn list_transfers(
    state: State<AppState>,
    query: Result<Query<TransfersQuery>, QueryRejection>,
) -> Result<impl IntoResponse, QueryApiError> {
    let Query(query) = query?;
    let limits = *state.config.query.read().await;
    Ok(Json(state.reader.snapshot().transfers(&query, limits)))
}

/// `GET /transfers/{id}` — one transfer, or `null`.
pub(super) async fn get_transfer(
    state: State<AppState>,
    Path(id): Path<TransferId>,
) -> impl IntoResponse {
    Json(state.reader.snapshot().transfer(&id))
}
