//! Billing handlers.
//!
//! ## Commands
//! - Processing payment-provider webhooks (claim, dispatch, finalise)
//!
//! ## Event handlers
//! - Subscription lifecycle updates
//! - Credit grants for paid orders
//!
//! ## Background
//! - Retention sweep of processed webhook events

mod dispatcher;
mod handle_billing_webhook;
mod order_paid;
mod retention_sweeper;
mod subscription_lifecycle;

pub use dispatcher::BillingEventDispatcher;
pub use handle_billing_webhook::{HandleBillingWebhookCommand, HandleBillingWebhookHandler};
pub use order_paid::OrderPaidHandler;
pub use retention_sweeper::{RetentionSweeperConfig, WebhookRetentionSweeper};
pub use subscription_lifecycle::SubscriptionLifecycleHandler;

use crate::application::services::UserServiceError;
use crate::domain::billing::WebhookError;

impl From<UserServiceError> for WebhookError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Infrastructure(message) => WebhookError::Database(message),
            other => WebhookError::HandlerFailed(other.to_string()),
        }
    }
}
