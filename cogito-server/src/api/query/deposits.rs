use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::IntoResponse,
};
use cogito_sdk::objects::{DepositId, DepositsQuery};

use super::QueryApiError;
use crate::state::AppState;

/// `GET /deposits` — list deposits, each with its transfers embedded.
pub(super) async fn list_deposits(
    state: State<AppState>,
    query: Result<Query<DepositsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, QueryApiError> {
    let Query(query) = query?;
    let limits = *state.config.query.read().await;
    Ok(Json(state.reader.snapshot().deposits(&query, limits)))
}

/// `GET /deposits/{id}` — one deposit, or `null`.
pub(super) async fn get_deposit(
    state: State<AppState>,
    Path(id): Path<DepositId>,
) -> impl IntoResponse {
    Json(state.reader.snapshot().deposit(&id))
}
