//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `UserRepository` - User rows, balances and identity moves
//! - `CreditTransactionRepository` - Append-only credit ledger
//!
//! ## Webhook Ports
//!
//! - `WebhookEventRepository` - Webhook idempotency ledger

mod credit_transaction_repository;
mod user_repository;
mod webhook_event_repository;

pub use credit_transaction_repository::CreditTransactionRepository;
pub use user_repository::UserRepository;
pub use webhook_event_repository::WebhookEventRepository;
