//! Query API client (frontend → read model).

use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::{
    ActivitiesQuery, DepositId, DepositView, DepositsQuery, Page, TransferId, TransferView,
    TransfersQuery, UserActivityView,
};

/// Typed HTTP client for the public **Query API**.
///
/// No authentication is required. Single-entity lookups return `None` when
/// the id is not indexed (the server answers `200 null`).
#[derive(Debug, Clone)]
pub struct QueryClient {
    pub(super) http: Client,
    pub(super) base_url: Url,
}

impl QueryClient {
    /// * `base_url` – root URL of the read model server.
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /api/v1/deposits`
    pub async fn deposits(&self, query: &DepositsQuery) -> Result<Page<DepositView>, ClientError> {
        let url = self.base_url.join("/api/v1/deposits")?;
        let resp = self.http.get(url).query(query).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/deposits/{id}`
    pub async fn deposit(&self, id: &DepositId) -> Result<Option<DepositView>, ClientError> {
        let url = self.base_url.join(&format!(
            "/api/v1/deposits/{}",
            urlencoding::encode(id.as_str())
        ))?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/transfers`
    pub async fn transfers(
        &self,
        query: &TransfersQuery,
    ) -> Result<Page<TransferView>, ClientError> {
        let url = self.base_url.join("/api/v1/transfers")?;
        let resp = self.http.get(url).query(query).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/transfers/{id}`
    pub async fn transfer(&self, id: &TransferId) -> Result<Option<TransferView>, ClientError> {
        let url = self.base_url.join(&format!(
            "/api/v1/transfers/{}",
            urlencoding::encode(id.as_str())
        ))?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/activities`
    pub async fn activities(
        &self,
        query: &ActivitiesQuery,
    ) -> Result<Page<UserActivityView>, ClientError> {
        let url = self.base_url.join("/api/v1/activities")?;
        let resp = self.http.get(url).query(query).send().await?;
        parse_response(resp).await
    }
}
