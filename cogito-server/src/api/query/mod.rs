//! Query API handlers.
//!
//! Public, read-only endpoints answered from the latest [`ReadModel`]
//! snapshot. Unknown ids yield `200 null`.
//!
//! # Endpoints
//!
//! - `GET /deposits`                       – list deposits (filter, order, paginate)
//! - `GET /deposits/{id}`                  – one deposit with its transfers
//! - `GET /transfers`                      – list transfers
//! - `GET /transfers/{id}`                 – one transfer with its deposit
//! - `GET /activities`                     – a user's activity feed
//! - `GET /subscribe/deposits/{id}`        – WebSocket deposit stream
//! - `GET /subscribe/transfers/{id}`       – WebSocket transfer stream
//! - `GET /subscribe/users/{address}`      – WebSocket activity stream
//!
//! [`ReadModel`]: cogito_core::query::ReadModel

use axum::{
    Router,
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::state::AppState;

mod activities;
mod deposits;
mod subscribe;
mod transfers;

/// Build the Query API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deposits", get(deposits::list_deposits))
        .route("/deposits/{id}", get(deposits::get_deposit))
        .route("/transfers", get(transfers::list_transfers))
        .route("/transfers/{id}", get(transfers::get_transfer))
        .route("/activities", get(activities::list_activities))
        .route("/subscribe/deposits/{id}", get(subscribe::deposit_ws))
        .route("/subscribe/transfers/{id}", get(subscribe::transfer_ws))
        .route("/subscribe/users/{address}", get(subscribe::activities_ws))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in Query API handlers.
#[derive(Debug)]
pub(crate) enum QueryApiError {
    /// Unknown filter value, bad `orderBy`, non-numeric limit and the like.
    InvalidQuery(QueryRejection),
}

impl From<QueryRejection> for QueryApiError {
    fn from(rejection: QueryRejection) -> Self {
        QueryApiError::InvalidQuery(rejection)
    }
}

impl IntoResponse for QueryApiError {
    fn into_response(self) -> Response {
        match self {
            QueryApiError::InvalidQuery(rejection) => {
                tracing::debug!(error = %rejection, "Query API: invalid query string");
                (StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{TestServer, body_json, deposit_created, initiated};
    use axum::http::StatusCode;
    use serde_json::Value;

    #[tokio::test]
    async fn test_unknown_ids_are_null() {
        let server = TestServer::start().await;

        let response = server.get("/api/v1/transfers/T404").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, Value::Null);

        let response = server.get("/api/v1/deposits/D404").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, Value::Null);
    }

    #[tokio::test]
    async fn test_deposit_embeds_transfers() {
        let server = TestServer::start().await;
        server
            .ingest(vec![deposit_created(1, "D1", 100), initiated(2, "T1", "D1")])
            .await;

        let deposit = body_json(server.get("/api/v1/deposits/D1").await).await;
        assert_eq!(deposit["depositId"], "D1");
        assert_eq!(deposit["remainingAmount"], "100");
        assert_eq!(deposit["transfers"]["items"][0]["transferId"], "T1");
        assert_eq!(deposit["transfers"]["items"][0]["status"], "INITIATED");

        let transfer = body_json(server.get("/api/v1/transfers/T1").await).await;
        assert_eq!(transfer["deposit"]["depositId"], "D1");
        assert_eq!(transfer["deposit"]["initialAmount"], "100");
    }

    #[tokio::test]
    async fn test_address_filters_ignore_case() {
        let server = TestServer::start().await;
        server
            .ingest(vec![deposit_created(1, "D1", 100), deposit_created(2, "D2", 5)])
            .await;

        let lower = body_json(server.get("/api/v1/deposits?depositor=0xalice").await).await;
        let upper = body_json(server.get("/api/v1/deposits?depositor=0xALICE").await).await;
        assert_eq!(lower, upper);
        assert_eq!(lower["totalCount"], 2);

        let activities =
            body_json(server.get("/api/v1/activities?user=0xAlice&type=DEPOSIT").await).await;
        assert_eq!(activities["totalCount"], 2);
    }

    #[tokio::test]
    async fn test_ordering_and_pagination() {
        let server = TestServer::start().await;
        server
            .ingest(vec![
                deposit_created(1, "D1", 30),
                deposit_created(2, "D2", 10),
                deposit_created(3, "D3", 20),
            ])
            .await;

        let page = body_json(
            server
                .get("/api/v1/deposits?orderBy=initialAmount&orderDirection=asc&limit=2&offset=1")
                .await,
        )
        .await;
        assert_eq!(page["totalCount"], 3);
        let ids: Vec<&str> = page["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["depositId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["D3", "D1"]);
    }

    #[tokio::test]
    async fn test_invalid_query_is_bad_request() {
        let server = TestServer::start().await;
        let response = server.get("/api/v1/transfers?status=LOST").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
