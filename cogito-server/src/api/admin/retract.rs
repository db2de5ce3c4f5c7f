use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use cogito_core::processors::RetractAbove;
use cogito_sdk::objects::admin::RetractRequest;
use kanau::processor::Processor;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `POST /retract` — drop every event above `aboveBlock` and re-project.
pub async fn retract(
    state: State<AppState>,
    _auth: AdminAuth,
    body: Result<Json<RetractRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AdminApiError> {
    let Json(request) = body?;
    let response = state
        .ingest
        .process(RetractAbove {
            above_block: request.above_block,
        })
        .await?;
    Ok(Json(response))
}
