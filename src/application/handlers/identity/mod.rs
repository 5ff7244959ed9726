//! Identity handlers.
//!
//! ## Commands
//! - Processing identity-provider webhooks (user created, updated, deleted)

mod handle_auth_webhook;

pub use handle_auth_webhook::{
    AuthWebhookError, HandleAuthWebhookCommand, HandleAuthWebhookHandler, HandleAuthWebhookResult,
};
