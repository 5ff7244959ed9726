//! Webhook error types.
//!
//! Every failure on the webhook path maps to an HTTP status and a fixed,
//! non-sensitive message. The status decides whether the payment provider
//! retries the delivery.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook intake and processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signing secret is configured; the endpoint fails closed.
    #[error("Webhook not configured")]
    NotConfigured,

    /// The configured signing secret is not valid base64.
    #[error("Invalid webhook secret: {0}")]
    InvalidSecret(String),

    /// One of the id, timestamp or signature headers is absent.
    #[error("Missing webhook headers")]
    MissingHeaders,

    /// No signature in the header matches the payload.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is unparseable or too far in the future.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// The verified body is not a usable event.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Event acknowledged without processing.
    #[error("Event ignored: {0}")]
    Ignored(String),

    /// A handler failed after the event was claimed.
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    /// Storage operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the provider should redeliver.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::NotConfigured
                | WebhookError::InvalidSecret(_)
                | WebhookError::HandlerFailed(_)
                | WebhookError::Database(_)
        )
    }

    /// Maps the error to the HTTP status returned to the provider.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::NotConfigured | WebhookError::InvalidSecret(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            WebhookError::MissingHeaders
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,

            WebhookError::Ignored(_) => StatusCode::OK,

            WebhookError::HandlerFailed(_) | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message placed in the `error` field of the response body.
    ///
    /// Verification failures share one message so a caller cannot tell
    /// which check rejected it.
    pub fn public_message(&self) -> &'static str {
        match self {
            WebhookError::NotConfigured | WebhookError::InvalidSecret(_) => {
                "Webhook not configured"
            }
            WebhookError::MissingHeaders => "Missing webhook headers",
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp => "Invalid signature",
            WebhookError::ParseError(_) => "Invalid payload",
            WebhookError::Ignored(_) => "Event ignored",
            WebhookError::HandlerFailed(_) | WebhookError::Database(_) => "Webhook handler failed",
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}
