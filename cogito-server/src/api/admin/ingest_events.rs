use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    response::IntoResponse,
};
use cogito_core::processors::IngestBatch;
use cogito_sdk::objects::admin::{IngestOutcome, IngestParams, IngestRequest};
use kanau::processor::Processor;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, wait_projected};

/// `POST /events` — ingest a batch of chain events.
///
/// Replies with one outcome per submitted event. Rejections are part of a
/// successful response; the request fails only when the batch as a whole
/// cannot be processed.
pub async fn ingest_events(
    state: State<AppState>,
    _auth: AdminAuth,
    params: Result<Query<IngestParams>, QueryRejection>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AdminApiError> {
    let Query(params) = params?;
    let Json(request) = body?;
    let submitted = request.events.len();

    let response = state
        .ingest
        .process(IngestBatch {
            events: request.events,
        })
        .await?;

    if params.wait {
        wait_projected(&state, response.revision).await?;
    }

    let rejected = response
        .outcomes
        .iter()
        .filter(|o| matches!(o, IngestOutcome::Rejected { .. }))
        .count();
    tracing::debug!(
        submitted,
        rejected,
        released = response.released.len(),
        revision = response.revision,
        "Admin API: batch ingested"
    );

    Ok(Json(response))
}
