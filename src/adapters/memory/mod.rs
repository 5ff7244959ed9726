//! In-memory adapters.
//!
//! Used by unit and integration tests, and by the binary when no database
//! URL is configured. Nothing survives a restart.

mod credit_transactions;
mod users;
mod webhook_events;

pub use credit_transactions::InMemoryCreditTransactionRepository;
pub use users::InMemoryUserRepository;
pub use webhook_events::InMemoryWebhookEventRepository;
