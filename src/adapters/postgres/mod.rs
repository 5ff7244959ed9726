//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresUserRepository` - user rows, balances and upload ownership
//! - `PostgresCreditTransactionRepository` - append-only credit ledger
//! - `PostgresWebhookEventRepository` - webhook idempotency ledger

mod credit_transaction_repository;
mod user_repository;
mod webhook_event_repository;

pub use credit_transaction_repository::PostgresCreditTransactionRepository;
pub use user_repository::PostgresUserRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
