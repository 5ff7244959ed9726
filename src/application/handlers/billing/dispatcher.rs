//! BillingEventDispatcher - finite table from event type to handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::services::UserService;
use crate::domain::billing::{
    BillingEventHandler, CreditGrantPolicy, PlanCatalog, PolarEventType, WebhookDispatcher,
};
use crate::ports::CreditTransactionRepository;

use super::{OrderPaidHandler, SubscriptionLifecycleHandler};

#[derive(Default)]
pub struct BillingEventDispatcher {
    handlers: HashMap<PolarEventType, Arc<dyn BillingEventHandler>>,
}

impl BillingEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the subscription lifecycle and paid-order handlers.
    pub fn standard(
        users: Arc<UserService>,
        transactions: Arc<dyn CreditTransactionRepository>,
        catalog: Arc<PlanCatalog>,
    ) -> Self {
        let lifecycle = SubscriptionLifecycleHandler::new(users.clone(), catalog.clone());
        let orders = OrderPaidHandler::new(users, transactions, CreditGrantPolicy::new(catalog));

        Self::new()
            .with_handler(Arc::new(lifecycle))
            .with_handler(Arc::new(orders))
    }

    /// Registers `handler` for every type it reports. A later registration
    /// for the same type replaces the earlier one.
    pub fn with_handler(mut self, handler: Arc<dyn BillingEventHandler>) -> Self {
        for event_type in handler.handles() {
            self.handlers.insert(event_type, handler.clone());
        }
        self
    }

    /// Known event types with no registered handler.
    pub fn unhandled_types(&self) -> Vec<PolarEventType> {
        PolarEventType::ALL
            .into_iter()
            .filter(|t| !self.handlers.contains_key(t))
            .collect()
    }
}

impl WebhookDispatcher for BillingEventDispatcher {
    fn get_handler(&self, event_type: &PolarEventType) -> Option<&dyn BillingEventHandler> {
        self.handlers.get(event_type).map(|h| h.as_ref())
    }
}
