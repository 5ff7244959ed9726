//! Webhook processor - claims, dispatches and finalises provider events.
//!
//! ## Design
//!
//! 1. Claim the idempotency key with an insert-if-absent `processing` row
//! 2. Dispatch to the handler registered for the event type
//! 3. Mark the row `processed`, or `failed` with the error text
//!
//! ## Race Condition Handling
//!
//! Concurrent deliveries of one key race on the claim insert (PRIMARY KEY
//! on `event_id`). Exactly one wins; the others observe `Duplicate` with
//! the row's current status and never reach a handler.
//!
//! A `failed` row is terminal. A redelivery after a handler failure is
//! answered as a duplicate and the handler does not run again.

use std::sync::Arc;

use async_trait::async_trait;

use crate::ports::WebhookEventRepository;

use super::errors::WebhookError;
use super::polar_event::{PolarEvent, PolarEventType};
use super::webhook_event::{ClaimOutcome, WebhookEventStatus};

/// Handler for one family of provider events.
///
/// Attribution problems (unknown user, unmapped product) are logged and
/// returned as `Ok(())`; only infrastructure failures are errors.
#[async_trait]
pub trait BillingEventHandler: Send + Sync {
    /// Event types this handler is registered for.
    fn handles(&self) -> Vec<PolarEventType>;

    async fn handle(&self, event: &PolarEvent) -> Result<(), WebhookError>;
}

/// Routes events to handlers.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    fn get_handler(&self, event_type: &PolarEventType) -> Option<&dyn BillingEventHandler>;

    /// Dispatches to the registered handler.
    ///
    /// Returns `Err(WebhookError::Ignored)` for types with no handler.
    async fn dispatch(&self, event: &PolarEvent) -> Result<(), WebhookError> {
        let handler = event
            .handled_type()
            .and_then(|event_type| self.get_handler(&event_type));

        match handler {
            Some(handler) => handler.handle(event).await,
            None => Err(WebhookError::Ignored(format!(
                "No handler for event type: {}",
                event.event_type
            ))),
        }
    }
}

/// Result of a delivery that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// This delivery ran the handler (or acknowledged an unhandled type).
    Processed,
    /// Another delivery already claimed the key.
    Duplicate(WebhookEventStatus),
}

/// Processes each idempotency key at most once.
pub struct IdempotentWebhookProcessor {
    repository: Arc<dyn WebhookEventRepository>,
    dispatcher: Arc<dyn WebhookDispatcher>,
}

impl IdempotentWebhookProcessor {
    pub fn new(
        repository: Arc<dyn WebhookEventRepository>,
        dispatcher: Arc<dyn WebhookDispatcher>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
        }
    }

    /// Claims `key`, dispatches `event` and records the result.
    ///
    /// # Returns
    ///
    /// - `Ok(WebhookOutcome::Processed)` - handler succeeded or type unhandled
    /// - `Ok(WebhookOutcome::Duplicate(_))` - key was already claimed
    /// - `Err(WebhookError::HandlerFailed(_))` - handler failed, row marked `failed`
    /// - `Err(WebhookError::Database(_))` - the claim itself failed
    pub async fn process(&self, key: &str, event: &PolarEvent) -> Result<WebhookOutcome, WebhookError> {
        match self.repository.try_claim(key, &event.event_type).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::Duplicate(status) => {
                tracing::info!(event_id = %key, status = %status, "Duplicate webhook delivery");
                return Ok(WebhookOutcome::Duplicate(status));
            }
        }

        let result = match self.dispatcher.dispatch(event).await {
            Ok(()) => Ok(()),
            Err(WebhookError::Ignored(reason)) => {
                tracing::info!(event_id = %key, event_type = %event.event_type, reason = %reason, "Unhandled webhook event acknowledged");
                Ok(())
            }
            Err(e) => Err(e),
        };

        let result = match result {
            Ok(()) => self
                .repository
                .mark_processed(key)
                .await
                .map_err(WebhookError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(WebhookOutcome::Processed),
            Err(e) => {
                let message = e.to_string();
                tracing::error!(event_id = %key, event_type = %event.event_type, error = %message, "Webhook handler failed");
                if let Err(mark_err) = self.repository.mark_failed(key, &message).await {
                    tracing::error!(event_id = %key, error = %mark_err, "Failed to mark webhook event failed");
                }
                Err(WebhookError::HandlerFailed(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryWebhookEventRepository;
    use crate::domain::billing::polar_event::PolarEventKind;
    use crate::domain::billing::webhook_event::MAX_ERROR_LEN;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ══════════════════════════════════════════════════════════════
    // Test Infrastructure
    // ══════════════════════════════════════════════════════════════

    struct MockHandler {
        handles_types: Vec<PolarEventType>,
        call_count: AtomicU32,
        failure: Option<String>,
    }

    impl MockHandler {
        fn new(handles: Vec<PolarEventType>) -> Self {
            Self {
                handles_types: handles,
                call_count: AtomicU32::new(0),
                failure: None,
            }
        }

        fn failing(handles: Vec<PolarEventType>, message: &str) -> Self {
            Self {
                failure: Some(message.to_string()),
                ..Self::new(handles)
            }
        }

        fn call_count(&self) -> u32 {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BillingEventHandler for MockHandler {
        fn handles(&self) -> Vec<PolarEventType> {
            self.handles_types.clone()
        }

        async fn handle(&self, _event: &PolarEvent) -> Result<(), WebhookError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            match &self.failure {
                Some(msg) => Err(WebhookError::Database(msg.clone())),
                None => Ok(()),
            }
        }
    }

    struct MockDispatcher {
        handlers: HashMap<PolarEventType, Arc<MockHandler>>,
    }

    impl MockDispatcher {
        fn with(handler: Arc<MockHandler>) -> Self {
            let handlers = handler
                .handles()
                .into_iter()
                .map(|t| (t, handler.clone()))
                .collect();
            Self { handlers }
        }
    }

    #[async_trait]
    impl WebhookDispatcher for MockDispatcher {
        fn get_handler(&self, event_type: &PolarEventType) -> Option<&dyn BillingEventHandler> {
            self.handlers
                .get(event_type)
                .map(|h| h.as_ref() as &dyn BillingEventHandler)
        }
    }

    fn order_paid() -> PolarEvent {
        PolarEvent {
            id: Some("evt_1".into()),
            event_type: "order.paid".into(),
            timestamp: None,
            kind: PolarEventKind::OrderPaid(Default::default()),
        }
    }

    fn setup(
        handler: MockHandler,
    ) -> (
        IdempotentWebhookProcessor,
        Arc<MockHandler>,
        Arc<InMemoryWebhookEventRepository>,
    ) {
        let handler = Arc::new(handler);
        let repo = Arc::new(InMemoryWebhookEventRepository::new());
        let processor = IdempotentWebhookProcessor::new(
            repo.clone(),
            Arc::new(MockDispatcher::with(handler.clone())),
        );
        (processor, handler, repo)
    }

    // ══════════════════════════════════════════════════════════════
    // Processing
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn first_delivery_runs_handler_and_marks_processed() {
        let (processor, handler, repo) = setup(MockHandler::new(vec![PolarEventType::OrderPaid]));

        let outcome = processor.process("msg_1", &order_paid()).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        assert_eq!(handler.call_count(), 1);
        let record = repo.find_by_event_id("msg_1").await.unwrap().unwrap();
        assert_eq!(record.status, WebhookEventStatus::Processed);
        assert!(record.processed_at.is_some());
    }

    #[tokio::test]
    async fn redelivery_is_duplicate_and_skips_handler() {
        let (processor, handler, _) = setup(MockHandler::new(vec![PolarEventType::OrderPaid]));

        processor.process("msg_1", &order_paid()).await.unwrap();
        let second = processor.process("msg_1", &order_paid()).await.unwrap();

        assert_eq!(second, WebhookOutcome::Duplicate(WebhookEventStatus::Processed));
        assert_eq!(handler.call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_deliveries_run_handler_once() {
        let (processor, handler, _) = setup(MockHandler::new(vec![PolarEventType::OrderPaid]));
        let processor = Arc::new(processor);
        let event = order_paid();

        let (a, b) = tokio::join!(
            processor.process("msg_race", &event),
            processor.process("msg_race", &event)
        );

        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| **o == WebhookOutcome::Processed).count(),
            1
        );
        assert_eq!(handler.call_count(), 1);
    }

    #[tokio::test]
    async fn unhandled_type_is_acknowledged_and_processed() {
        let (processor, handler, repo) = setup(MockHandler::new(vec![PolarEventType::OrderPaid]));
        let event = PolarEvent {
            id: None,
            event_type: "checkout.created".into(),
            timestamp: None,
            kind: PolarEventKind::Unhandled,
        };

        let outcome = processor.process("msg_2", &event).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Processed);
        assert_eq!(handler.call_count(), 0);
        let record = repo.find_by_event_id("msg_2").await.unwrap().unwrap();
        assert_eq!(record.status, WebhookEventStatus::Processed);
    }

    #[tokio::test]
    async fn handler_failure_marks_failed_and_is_never_retried() {
        let (processor, handler, repo) = setup(MockHandler::failing(
            vec![PolarEventType::OrderPaid],
            &"x".repeat(2000),
        ));

        let first = processor.process("msg_3", &order_paid()).await;
        assert!(matches!(first, Err(WebhookError::HandlerFailed(_))));

        let record = repo.find_by_event_id("msg_3").await.unwrap().unwrap();
        assert_eq!(record.status, WebhookEventStatus::Failed);
        assert_eq!(record.error.unwrap().chars().count(), MAX_ERROR_LEN);

        let retry = processor.process("msg_3", &order_paid()).await.unwrap();
        assert_eq!(retry, WebhookOutcome::Duplicate(WebhookEventStatus::Failed));
        assert_eq!(handler.call_count(), 1);
    }
}
