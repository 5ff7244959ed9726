//! Application handlers.
//!
//! Command handlers that orchestrate domain operations.

pub mod billing;
pub mod identity;

pub use billing::{
    BillingEventDispatcher, HandleBillingWebhookCommand, HandleBillingWebhookHandler,
    OrderPaidHandler, RetentionSweeperConfig, SubscriptionLifecycleHandler, WebhookRetentionSweeper,
};
pub use identity::{
    AuthWebhookError, HandleAuthWebhookCommand, HandleAuthWebhookHandler, HandleAuthWebhookResult,
};
