//! WebSocket message types for the subscription endpoints.
//!
//! `GET /api/v1/subscribe/{deposits|transfers}/{id}` and
//! `GET /api/v1/subscribe/users/{address}` upgrade to a WebSocket and push
//! [`WsServerMessage`] JSON frames.
//!
//! # Protocol
//!
//! 1. Right after the upgrade the server sends the current state, or
//!    [`WsServerMessage::NotFound`] if the entity is not indexed yet. The
//!    connection stays open in that case.
//! 2. A new frame follows every change that touches the subscribed entity.
//! 3. Transfer streams close normally after `COMPLETED`, deposit streams
//!    after the deposit is released. Activity streams stay open.

use serde::{Deserialize, Serialize};

use super::read_model::{DepositView, Page, TransferView, UserActivityView};

/// Server-to-client WebSocket message.
///
/// ```json
/// {"type":"transfer","transfer":{ ... }}
/// {"type":"not_found","id":"T9"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    Deposit { deposit: DepositView },
    Transfer { transfer: TransferView },
    /// The latest page of a user's activity feed.
    Activities { activities: Page<UserActivityView> },
    /// The subscribed entity is not (yet) part of the projection.
    NotFound { id: String },
    Error { code: u16, reason: String },
}

/// Well-known WebSocket close codes used by the subscription streams.
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure after a terminal state has been delivered.
    pub const NORMAL: u16 = 1000;

    /// The server is shutting down.
    pub const GOING_AWAY: u16 = 1001;

    /// An unexpected server-side error prevented the stream from continuing.
    pub const INTERNAL_ERROR: u16 = 1011;
}
