//! Application layer - Command handlers and services.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;
pub mod services;

pub use handlers::{
    AuthWebhookError, BillingEventDispatcher, HandleAuthWebhookCommand, HandleAuthWebhookHandler,
    HandleAuthWebhookResult, HandleBillingWebhookCommand, HandleBillingWebhookHandler,
    OrderPaidHandler, RetentionSweeperConfig, SubscriptionLifecycleHandler, WebhookRetentionSweeper,
};
pub use services::{CreditChangeOptions, UserService, UserServiceError};
