use axum::{Json, extract::State, response::IntoResponse};
use cogito_core::processors::GetIngestStatus;
use cogito_sdk::objects::admin::StatusResponse;
use kanau::processor::Processor;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `GET /status` — ingester progress next to the served snapshot.
pub async fn status(
    state: State<AppState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, AdminApiError> {
    let ingest = state.ingest.process(GetIngestStatus).await?;
    let model = state.reader.snapshot();
    let projection = &model.projection;

    Ok(Json(StatusResponse {
        revision: ingest.revision,
        tip: ingest.tip,
        logged_events: ingest.logged_events,
        pending_orphans: ingest.pending_orphans,
        projected_revision: model.revision,
        projected_head: projection.head(),
        deposits: projection.deposit_count() as u64,
        transfers: projection.transfer_count() as u64,
        activities: projection.activity_count() as u64,
        rejections: projection.rejections().len() as u64,
    }))
}
