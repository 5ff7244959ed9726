//! HTTP handlers for billing, credit and identity endpoints.
//!
//! These handlers connect Axum routes to the application layer. Webhook
//! endpoints take the raw body so the signature is checked against the
//! exact bytes the sender signed.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::billing::{
    BillingEventDispatcher, HandleBillingWebhookCommand, HandleBillingWebhookHandler,
};
use crate::application::handlers::identity::{
    AuthWebhookError, HandleAuthWebhookCommand, HandleAuthWebhookHandler, HandleAuthWebhookResult,
};
use crate::application::services::{UserService, UserServiceError};
use crate::domain::billing::{
    evaluate_subscription, IdempotentWebhookProcessor, PlanCatalog, StandardWebhookVerifier,
    WebhookError, WebhookOutcome,
};
use crate::domain::credits::{CreditTransactionKind, TransactionQuery};
use crate::domain::foundation::UserId;
use crate::ports::{CreditTransactionRepository, UserRepository, WebhookEventRepository};

use super::dto::{
    BillingStatusResponse, CreditSummaryResponse, CreditTransactionResponse, ErrorResponse,
    MessageResponse, PaginationResponse, SuccessResponse, TransactionListParams,
    WebhookAckResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Signing verifiers resolved at startup. `None` means the secret is not
/// configured and the matching endpoint fails closed.
#[derive(Clone, Default)]
pub struct WebhookVerifiers {
    pub billing: Option<Arc<StandardWebhookVerifier>>,
    pub auth: Option<Arc<StandardWebhookVerifier>>,
}

/// Shared state for every billing route. Cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub users: Arc<UserService>,
    pub billing_webhook: Arc<HandleBillingWebhookHandler>,
    pub auth_webhook: Arc<HandleAuthWebhookHandler>,
}

impl BillingAppState {
    /// Wires the user service, dispatcher and webhook handlers over the
    /// given ports.
    pub fn new(
        users: Arc<dyn UserRepository>,
        transactions: Arc<dyn CreditTransactionRepository>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        catalog: Arc<PlanCatalog>,
        verifiers: WebhookVerifiers,
        welcome_bonus_credits: i64,
    ) -> Self {
        let user_service = Arc::new(
            UserService::new(users, transactions.clone(), welcome_bonus_credits)
                .with_catalog(catalog.clone()),
        );

        let dispatcher = BillingEventDispatcher::standard(user_service.clone(), transactions, catalog);
        for event_type in dispatcher.unhandled_types() {
            tracing::debug!(event_type = %event_type, "No handler registered; event will be acknowledged");
        }
        let processor = Arc::new(IdempotentWebhookProcessor::new(
            webhook_events,
            Arc::new(dispatcher),
        ));

        Self {
            billing_webhook: Arc::new(HandleBillingWebhookHandler::new(verifiers.billing, processor)),
            auth_webhook: Arc::new(HandleAuthWebhookHandler::new(
                verifiers.auth,
                user_service.clone(),
            )),
            users: user_service,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity taken from the `X-User-Id` header set by the fronting
/// auth proxy.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = BillingApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(BillingApiError::AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Handlers (signature verified, no user auth)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/webhook - Payment-provider events
pub async fn handle_billing_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAckResponse>, BillingApiError> {
    let cmd = HandleBillingWebhookCommand {
        headers,
        payload: body.to_vec(),
    };

    match state.billing_webhook.handle(cmd).await {
        Ok(WebhookOutcome::Processed) => Ok(Json(WebhookAckResponse::processed())),
        Ok(WebhookOutcome::Duplicate(status)) => Ok(Json(WebhookAckResponse::duplicate(status))),
        Err(WebhookError::Ignored(reason)) => {
            tracing::debug!(reason = %reason, "Webhook acknowledged without processing");
            Ok(Json(WebhookAckResponse::processed()))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/webhooks/auth - Identity-provider user events
pub async fn handle_auth_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BillingApiError> {
    let cmd = HandleAuthWebhookCommand {
        headers,
        payload: body.to_vec(),
    };

    let response = match state.auth_webhook.handle(cmd).await? {
        HandleAuthWebhookResult::Synced(_) => Json(MessageResponse {
            message: "User synced successfully",
        })
        .into_response(),
        HandleAuthWebhookResult::Deleted { .. } => Json(MessageResponse {
            message: "User deleted successfully",
        })
        .into_response(),
        HandleAuthWebhookResult::Ignored(_) => Json(serde_json::json!({})).into_response(),
    };

    Ok(response)
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/status - Whether the caller has paid access
pub async fn get_billing_status(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<Json<BillingStatusResponse>, BillingApiError> {
    let record = state.users.get_user_by_id(&user.user_id).await?;

    Ok(Json(BillingStatusResponse {
        has_active_subscription: evaluate_subscription(record.as_ref()),
    }))
}

/// GET /api/user/credits - Caller's credit balance
pub async fn get_user_credits(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<Json<SuccessResponse<CreditSummaryResponse>>, BillingApiError> {
    let record = state
        .users
        .get_user_with_credits(&user.user_id)
        .await?
        .ok_or(BillingApiError::UserNotFound)?;

    Ok(Json(SuccessResponse::new(CreditSummaryResponse::from(&record))))
}

/// GET /api/credits/transactions - Caller's ledger, newest first
pub async fn list_credit_transactions(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Query(params): Query<TransactionListParams>,
) -> Result<Json<SuccessResponse<Vec<CreditTransactionResponse>>>, BillingApiError> {
    let kind = params
        .kind
        .as_deref()
        .map(str::parse::<CreditTransactionKind>)
        .transpose()
        .map_err(|_| BillingApiError::InvalidQuery("Invalid transaction type"))?;

    let query = TransactionQuery::new(params.limit, params.offset, kind);
    let transactions = state.users.list_transactions(&user.user_id, &query).await?;

    let pagination = PaginationResponse::new(&query, transactions.len());
    let data = transactions
        .into_iter()
        .map(CreditTransactionResponse::from)
        .collect();

    Ok(Json(SuccessResponse::new(data).with_pagination(pagination)))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that renders `{"error": "<message>"}` with the right status.
#[derive(Debug)]
pub enum BillingApiError {
    AuthenticationRequired,
    UserNotFound,
    InvalidQuery(&'static str),
    Webhook(WebhookError),
    AuthWebhook(AuthWebhookError),
    Service(UserServiceError),
}

impl From<WebhookError> for BillingApiError {
    fn from(err: WebhookError) -> Self {
        Self::Webhook(err)
    }
}

impl From<AuthWebhookError> for BillingApiError {
    fn from(err: AuthWebhookError) -> Self {
        Self::AuthWebhook(err)
    }
}

impl From<UserServiceError> for BillingApiError {
    fn from(err: UserServiceError) -> Self {
        Self::Service(err)
    }
}

impl BillingApiError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            Self::AuthenticationRequired => (StatusCode::UNAUTHORIZED, "Authentication required"),
            Self::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            Self::InvalidQuery(message) => (StatusCode::BAD_REQUEST, message),
            Self::Webhook(e) => (e.status_code(), e.public_message()),
            Self::AuthWebhook(e) => (e.status_code(), e.public_message()),
            Self::Service(e) => match e {
                UserServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "User not found"),
                UserServiceError::InsufficientCredits { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "Insufficient credits")
                }
                UserServiceError::ConcurrentUpdate => (StatusCode::CONFLICT, "Concurrent update"),
                UserServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
                UserServiceError::Infrastructure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            },
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = ?self, "Request failed");
        }

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: BillingApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn not_configured_is_500_with_fixed_message() {
        let (status, body) = body_json(WebhookError::NotConfigured.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Webhook not configured");
    }

    #[tokio::test]
    async fn handler_failure_hides_detail() {
        let (status, body) =
            body_json(WebhookError::HandlerFailed("pool timed out".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Webhook handler failed");
    }

    #[tokio::test]
    async fn missing_auth_is_401() {
        let (status, body) = body_json(BillingApiError::AuthenticationRequired).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn auth_webhook_missing_id_is_400() {
        let (status, body) = body_json(AuthWebhookError::MissingUserId.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No user ID found");
    }

    #[tokio::test]
    async fn service_not_found_is_404() {
        let err = UserServiceError::NotFound(UserId::new("user_1").unwrap());
        let (status, _) = body_json(err.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
