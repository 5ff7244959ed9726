//! HandleBillingWebhookHandler - verifies, parses and processes one
//! payment-provider delivery.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::domain::billing::{
    idempotency_key, HeaderScheme, IdempotentWebhookProcessor, PolarEvent, StandardWebhookVerifier,
    WebhookError, WebhookHeaders, WebhookOutcome,
};

/// Command to handle a billing webhook.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    pub headers: HeaderMap,
    /// Raw body, exactly as signed.
    pub payload: Vec<u8>,
}

/// Each step is a gate: configuration, headers, signature, payload, claim.
/// Nothing is claimed until the signature and payload have passed.
pub struct HandleBillingWebhookHandler {
    verifier: Option<Arc<StandardWebhookVerifier>>,
    processor: Arc<IdempotentWebhookProcessor>,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        verifier: Option<Arc<StandardWebhookVerifier>>,
        processor: Arc<IdempotentWebhookProcessor>,
    ) -> Self {
        Self {
            verifier,
            processor,
        }
    }

    pub async fn handle(&self, cmd: HandleBillingWebhookCommand) -> Result<WebhookOutcome, WebhookError> {
        let verifier = self.verifier.as_ref().ok_or(WebhookError::NotConfigured)?;

        let headers = WebhookHeaders::from_header_map(&cmd.headers, HeaderScheme::Standard)?;

        verifier.verify(&headers, &cmd.payload).map_err(|e| {
            tracing::warn!(webhook_id = %headers.id, error = %e, "Webhook signature rejected");
            e
        })?;

        let event = PolarEvent::parse(&cmd.payload)?;
        let key = idempotency_key(Some(&headers.id), &event);

        tracing::debug!(event_id = %key, event_type = %event.event_type, "Webhook verified");
        self.processor.process(&key, &event).await
    }
}
