//! Admin API handlers.
//!
//! These endpoints are called by the chain listener and operator tooling
//! and require the `Cogito-Admin-Authorization` header with the plaintext
//! admin secret.
//!
//! # Endpoints
//!
//! - `POST /events`     – ingest a batch of chain events (`?wait=true` to await projection)
//! - `POST /retract`    – drop every event above a block (reorg)
//! - `POST /reproject`  – force a full re-projection
//! - `GET  /issues`     – list rejected and orphaned events
//! - `GET  /status`     – log and projection progress

use std::time::Duration;

use axum::{
    Router,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use cogito_core::ingest::IngestError;

use crate::state::AppState;

mod ingest_events;
mod list_issues;
mod reproject;
mod retract;
mod status;

/// How long `?wait=true` waits for the projection to catch up.
const PROJECTION_WAIT: Duration = Duration::from_secs(30);

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", post(ingest_events::ingest_events))
        .route("/retract", post(retract::retract))
        .route("/reproject", post(reproject::reproject))
        .route("/issues", get(list_issues::list_issues))
        .route("/status", get(status::status))
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) enum AdminApiError {
    Ingest(IngestError),
    InvalidBody(JsonRejection),
    InvalidQuery(QueryRejection),
    ProjectionTimeout,
}

impl From<IngestError> for AdminApiError {
    fn from(e: IngestError) -> Self {
        AdminApiError::Ingest(e)
    }
}

impl From<JsonRejection> for AdminApiError {
    fn from(rejection: JsonRejection) -> Self {
        AdminApiError::InvalidBody(rejection)
    }
}

impl From<QueryRejection> for AdminApiError {
    fn from(rejection: QueryRejection) -> Self {
        AdminApiError::InvalidQuery(rejection)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AdminApiError::Ingest(e @ IngestError::BatchTooLarge { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response()
            }
            AdminApiError::Ingest(IngestError::Log(e)) => {
                tracing::error!(error = %e, "Admin API event log error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            AdminApiError::Ingest(e) => {
                tracing::error!(error = %e, "Admin API: processor unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "service unavailable").into_response()
            }
            AdminApiError::InvalidBody(rejection) => {
                (rejection.status(), rejection.body_text()).into_response()
            }
            AdminApiError::InvalidQuery(rejection) => {
                (StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
            }
            AdminApiError::ProjectionTimeout => {
                tracing::warn!("Admin API: timed out waiting for projection");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "timed out waiting for projection",
                )
                    .into_response()
            }
        }
    }
}

/// Wait until the published read model reaches `revision`.
async fn wait_projected(state: &AppState, revision: u64) -> Result<(), AdminApiError> {
    let mut reader = state.reader.clone();
    match tokio::time::timeout(PROJECTION_WAIT, reader.wait_for_revision(revision)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(AdminApiError::Ingest(IngestError::ProjectorClosed)),
        Err(_) => Err(AdminApiError::ProjectionTimeout),
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{TEST_SECRET, TestServer, body_json, deposit_created, initiated};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cogito_core::config::IngestSettings;
    use cogito_sdk::objects::admin::ADMIN_AUTH_HEADER;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_requires_admin_secret() {
        let server = TestServer::start().await;

        let response = server.get("/api/v1/admin/status").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::get("/api/v1/admin/status")
            .header(ADMIN_AUTH_HEADER, format!("{TEST_SECRET}-wrong"))
            .body(Body::empty())
            .unwrap();
        let response = server.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ingest_reports_outcomes() {
        let server = TestServer::start().await;
        let body = server
            .ingest(vec![deposit_created(1, "D1", 100), initiated(2, "T2", "D9")])
            .await;

        assert_eq!(body["outcomes"][0]["status"], "accepted");
        assert_eq!(body["outcomes"][1]["status"], "held");
        assert_eq!(body["outcomes"][1]["depositId"], "D9");

        let status = body_json(server.admin_get("/api/v1/admin/status").await).await;
        assert_eq!(status["loggedEvents"], 1);
        assert_eq!(status["pendingOrphans"], 1);
        assert_eq!(status["deposits"], 1);
        assert_eq!(status["transfers"], 0);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let server = TestServer::with_settings(IngestSettings {
            max_batch_size: 1,
            ..IngestSettings::default()
        })
        .await;

        let events = vec![deposit_created(1, "D1", 100), deposit_created(2, "D2", 5)];
        let response = server
            .admin_post("/api/v1/admin/events", json!({ "events": events }))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let server = TestServer::start().await;
        let response = server
            .admin_post("/api/v1/admin/events", json!({ "events": "nope" }))
            .await;
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_conflict_is_listed_as_issue() {
        let server = TestServer::start().await;
        server.ingest(vec![deposit_created(1, "D1", 100)]).await;
        let body = server.ingest(vec![deposit_created(1, "D1", 5)]).await;
        assert_eq!(body["outcomes"][0]["status"], "rejected");
        assert_eq!(body["outcomes"][0]["category"], "conflict");

        let issues = body_json(server.admin_get("/api/v1/admin/issues").await).await;
        assert_eq!(issues["totalCount"], 1);
        assert_eq!(issues["items"][0]["category"], "conflict");

        let filtered =
            body_json(server.admin_get("/api/v1/admin/issues?category=orphaned").await).await;
        assert_eq!(filtered["totalCount"], 0);

        // The logged body wins.
        let deposit = body_json(server.get("/api/v1/deposits/D1").await).await;
        assert_eq!(deposit["initialAmount"], "100");
    }

    #[tokio::test]
    async fn test_retract_rolls_back_read_model() {
        let server = TestServer::start().await;
        server
            .ingest(vec![deposit_created(1, "D1", 100), initiated(2, "T1", "D1")])
            .await;

        let response = server
            .admin_post("/api/v1/admin/retract", json!({ "aboveBlock": 1 }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["retracted"], 1);

        let revision = body["revision"].as_u64().unwrap();
        server
            .state
            .reader
            .clone()
            .wait_for_revision(revision)
            .await
            .unwrap();

        let transfer = body_json(server.get("/api/v1/transfers/T1").await).await;
        assert!(transfer.is_null());
        let deposit = body_json(server.get("/api/v1/deposits/D1").await).await;
        assert_eq!(deposit["transfers"]["items"], json!([]));
    }

    #[tokio::test]
    async fn test_reproject_keeps_state() {
        let server = TestServer::start().await;
        server.ingest(vec![deposit_created(1, "D1", 100)]).await;

        let response = server.admin_post("/api/v1/admin/reproject", json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);
        let revision = body_json(response).await["revision"].as_u64().unwrap();
        server
            .state
            .reader
            .clone()
            .wait_for_revision(revision)
            .await
            .unwrap();

        let deposit = body_json(server.get("/api/v1/deposits/D1").await).await;
        assert_eq!(deposit["remainingAmount"], "100");
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::start().await;
        let response = server.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }
}
