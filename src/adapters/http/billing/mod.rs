//! HTTP adapter for billing endpoints.
//!
//! Exposes webhook intake and account reads via REST API:
//! - `POST /api/billing/webhook` - Payment-provider webhooks
//! - `POST /api/webhooks/auth` - Identity-provider webhooks
//! - `GET /api/billing/status` - Whether the caller has paid access
//! - `GET /api/user/credits` - Caller's credit balance
//! - `GET /api/credits/transactions` - Caller's credit ledger
//! - `GET /health` - Liveness

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState, WebhookVerifiers};
pub use routes::{api_routes, billing_router};
