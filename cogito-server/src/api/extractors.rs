//! Custom Axum extractors for request authentication.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use cogito_sdk::objects::admin::ADMIN_AUTH_HEADER;

use crate::state::AppState;

/// Admin API authentication.
///
/// # Header format
///
/// ```text
/// Cogito-Admin-Authorization: {plaintext_admin_secret}
/// ```
///
/// The value is verified against the argon2 hash from `[admin].secret`.
pub struct AdminAuth;

/// Errors returned by the [`AdminAuth`] extractor.
#[derive(Debug)]
pub enum AdminAuthError {
    MissingHeader,
    InvalidHeader,
    InvalidSecret,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminAuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Cogito-Admin-Authorization header",
            ),
            AdminAuthError::InvalidHeader => (StatusCode::BAD_REQUEST, "invalid header format"),
            AdminAuthError::InvalidSecret => (StatusCode::UNAUTHORIZED, "invalid admin secret"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?;

        let admin = state.config.admin.read().await;
        if !admin.verify_secret(secret) {
            drop(admin);
            tracing::warn!("Admin API: rejected invalid secret");
            return Err(AdminAuthError::InvalidSecret);
        }

        drop(admin);
        Ok(AdminAuth)
    }
}
