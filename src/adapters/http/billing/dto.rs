//! HTTP DTOs for billing, credit and identity endpoints.
//!
//! Response shapes are fixed by the frontend and the payment provider, so
//! field names follow their casing rather than Rust's.

use serde::{Deserialize, Serialize};

use crate::domain::billing::WebhookEventStatus;
use crate::domain::credits::{CreditBalance, CreditTransaction, TransactionQuery};
use crate::domain::user::UserRecord;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query string for `GET /api/credits/transactions`.
///
/// `type` stays a string here so an unknown value can be answered with 400
/// instead of axum's generic query rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body returned to the payment provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookAckResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WebhookEventStatus>,
}

impl WebhookAckResponse {
    pub fn processed() -> Self {
        Self {
            ok: true,
            duplicate: None,
            status: None,
        }
    }

    pub fn duplicate(status: WebhookEventStatus) -> Self {
        Self {
            ok: true,
            duplicate: Some(true),
            status: Some(status),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingStatusResponse {
    pub has_active_subscription: bool,
}

/// Envelope used by the credit endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationResponse>,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            pagination: None,
        }
    }

    pub fn with_pagination(mut self, pagination: PaginationResponse) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummaryResponse {
    pub total: i64,
    pub used: i64,
    pub remaining: i64,
    pub percentage: i64,
    /// ISO 8601, or null when no reset date is set.
    pub reset_date: Option<String>,
    pub subscription_tier: Option<String>,
}

impl From<&UserRecord> for CreditSummaryResponse {
    fn from(user: &UserRecord) -> Self {
        let balance: CreditBalance = user.balance();
        Self {
            total: balance.total,
            used: balance.used,
            remaining: balance.remaining,
            percentage: balance.remaining_percentage(),
            reset_date: user.credits_reset_date.map(|d| d.to_rfc3339()),
            subscription_tier: user.subscription_tier.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditTransactionResponse {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub reference_id: Option<String>,
    pub balance_after: Option<i64>,
    pub created_at: String,
}

impl From<CreditTransaction> for CreditTransactionResponse {
    fn from(tx: CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            user_id: tx.user_id.to_string(),
            amount: tx.amount,
            kind: tx.kind.as_str().to_string(),
            description: tx.description,
            reference_id: tx.reference_id,
            balance_after: tx.balance_after,
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PaginationResponse {
    pub limit: u32,
    pub offset: u32,
    pub count: usize,
}

impl PaginationResponse {
    pub fn new(query: &TransactionQuery, count: usize) -> Self {
        Self {
            limit: query.limit,
            offset: query.offset,
            count,
        }
    }
}

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
