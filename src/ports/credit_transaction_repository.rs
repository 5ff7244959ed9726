//! Credit transaction repository port.
//!
//! The ledger is append-only: rows are recorded once and only ever moved
//! between users when identities are merged or migrated.

use async_trait::async_trait;

use crate::domain::credits::{CreditTransaction, NewCreditTransaction, TransactionQuery};
use crate::domain::foundation::{DomainError, TransactionId, UserId};

#[async_trait]
pub trait CreditTransactionRepository: Send + Sync {
    /// Appends an entry, assigning its id and `created_at`.
    async fn record(&self, entry: NewCreditTransaction) -> Result<CreditTransaction, DomainError>;

    /// Lists a user's entries, newest first.
    async fn list(
        &self,
        user_id: &UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>, DomainError>;

    /// Find one entry owned by `user_id`.
    async fn find(
        &self,
        id: &TransactionId,
        user_id: &UserId,
    ) -> Result<Option<CreditTransaction>, DomainError>;

    /// Whether an entry for `user_id` already carries `reference_id`.
    async fn has_reference(&self, user_id: &UserId, reference_id: &str) -> Result<bool, DomainError>;

    /// Sum of grant amounts.
    async fn total_granted(&self, user_id: &UserId) -> Result<i64, DomainError>;

    /// Sum of consumed credits, as a positive number.
    async fn total_consumed(&self, user_id: &UserId) -> Result<i64, DomainError>;

    /// Moves every entry from `from` to `to`. Returns the rows moved.
    async fn reassign_user(&self, from: &UserId, to: &UserId) -> Result<u64, DomainError>;
}
