//! Admin API client (operator tooling → read model).
//!
//! All requests carry the plaintext admin secret in the
//! `Cogito-Admin-Authorization` header.

use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::admin::{
    ADMIN_AUTH_HEADER, IngestParams, IngestRequest, IngestResponse, IssueView, ListIssuesQuery,
    ReprojectResponse, RetractRequest, RetractResponse, StatusResponse,
};
use crate::objects::{ChainEvent, Page};

/// Typed HTTP client for the **Admin API**.
///
/// The secret is verified server-side against an argon2-hashed value.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    admin_secret: String,
}

impl AdminClient {
    /// * `base_url` – root URL of the read model server.
    /// * `admin_secret` – the plaintext admin secret.
    pub fn new(base_url: Url, admin_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            admin_secret: admin_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/admin/events` – ingest a batch of chain events.
    pub async fn ingest(&self, events: Vec<ChainEvent>) -> Result<IngestResponse, ClientError> {
        self.post_events(events, IngestParams::default()).await
    }

    /// Like [`ingest`](Self::ingest), but returns only once the batch is
    /// visible to queries.
    pub async fn ingest_and_wait(
        &self,
        events: Vec<ChainEvent>,
    ) -> Result<IngestResponse, ClientError> {
        self.post_events(events, IngestParams { wait: true }).await
    }

    async fn post_events(
        &self,
        events: Vec<ChainEvent>,
        params: IngestParams,
    ) -> Result<IngestResponse, ClientError> {
        let url = self.base_url.join("/api/v1/admin/events")?;

        let resp = self
            .http
            .post(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .query(&params)
            .json(&IngestRequest { events })
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/admin/retract` – drop every event above `above_block`.
    pub async fn retract(&self, above_block: u64) -> Result<RetractResponse, ClientError> {
        let url = self.base_url.join("/api/v1/admin/retract")?;

        let resp = self
            .http
            .post(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .json(&RetractRequest { above_block })
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/admin/reproject` – force a full re-projection.
    pub async fn reproject(&self) -> Result<ReprojectResponse, ClientError> {
        let url = self.base_url.join("/api/v1/admin/reproject")?;

        let resp = self
            .http
            .post(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `GET /api/v1/admin/issues` – list rejected and orphaned events.
    pub async fn issues(&self, query: &ListIssuesQuery) -> Result<Page<IssueView>, ClientError> {
        let url = self.base_url.join("/api/v1/admin/issues")?;

        let resp = self
            .http
            .get(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .query(query)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `GET /api/v1/admin/status`
    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let url = self.base_url.join("/api/v1/admin/status")?;

        let resp = self
            .http
            .get(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .send()
            .await?;

        parse_response(resp).await
    }
}
