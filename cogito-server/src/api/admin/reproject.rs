use axum::{Json, extract::State, response::IntoResponse};
use cogito_core::processors::Reproject;
use cogito_sdk::objects::admin::ReprojectResponse;
use kanau::processor::Processor;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `POST /reproject` — rebuild the projection from the whole log.
pub async fn reproject(
    state: State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, AdminApiError> {
    let revision = state.ingest.process(Reproject).await?;
    Ok(Json(ReprojectResponse { revision }))
}
