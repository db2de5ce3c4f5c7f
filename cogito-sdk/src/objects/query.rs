//! Query parameters for the list endpoints.
//!
//! Filters are flat query-string parameters (`?depositor=0x..&orderBy=createdAt`).
//! Address filters are normalized to lower case while deserializing.

use serde::{Deserialize, Serialize};

use super::read_model::{ActivityKind, TransferStatus};
use super::{Address, DepositId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepositOrderBy {
    #[default]
    CreatedAt,
    LastUsedAt,
    InitialAmount,
    RemainingAmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferOrderBy {
    #[default]
    InitiatedAt,
    StoredAt,
    AcknowledgedAt,
    ProcessedAt,
    CompletedAt,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityOrderBy {
    #[default]
    Timestamp,
    BlockNumber,
}

/// `deposits(where: {depositor}, orderBy, orderDirection, limit, offset)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depositor: Option<Address>,
    #[serde(default)]
    pub order_by: DepositOrderBy,
    #[serde(default)]
    pub order_direction: OrderDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

/// `transfers(where: {sender | receiver | depositId, status}, ...)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransfersQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_id: Option<DepositId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransferStatus>,
    #[serde(default)]
    pub order_by: TransferOrderBy,
    #[serde(default)]
    pub order_direction: OrderDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

/// `userActivities(where: {user, type}, orderBy, orderDirection, limit)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitiesQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Address>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActivityKind>,
    #[serde(default)]
    pub order_by: ActivityOrderBy,
    #[serde(default)]
    pub order_direction: OrderDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;

/// Page size bounds applied to every list query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl PageLimits {
    /// Resolve a requested limit: missing means the default, and the result
    /// is clamped to `1..=max_limit`.
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}
