//! User repository port.
//!
//! Writers take the canonical id; resolving a legacy id to the current one
//! is the caller's job. Writers return `false` when no row matched.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::domain::user::{AuthUserProfile, OwnedTable, SubscriptionUpdate, UserRecord};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find by primary key only.
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, DomainError>;

    /// Find the row that was migrated away from `legacy_id`.
    async fn find_by_legacy_id(&self, legacy_id: &UserId) -> Result<Option<UserRecord>, DomainError>;

    /// Case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DomainError>;

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// - `UserAlreadyExists` if the id is taken
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, user: &UserRecord) -> Result<(), DomainError>;

    /// Refreshes email, name, image and avatar url.
    async fn update_profile(
        &self,
        id: &UserId,
        profile: &AuthUserProfile,
        now: Timestamp,
    ) -> Result<bool, DomainError>;

    /// Writes the present fields of `update` and bumps `updated_at`.
    async fn update_subscription(
        &self,
        id: &UserId,
        update: &SubscriptionUpdate,
        now: Timestamp,
    ) -> Result<bool, DomainError>;

    /// `credits += amount`.
    async fn add_credits(&self, id: &UserId, amount: i64) -> Result<bool, DomainError>;

    /// `credits += amount` and, when given, sets `credits_reset_date`.
    async fn grant_credits_with_reset_date(
        &self,
        id: &UserId,
        amount: i64,
        reset_date: Option<Timestamp>,
    ) -> Result<bool, DomainError>;

    /// Sets `credits_used = new_used` only if it currently equals
    /// `expected_used` (null counts as 0).
    async fn compare_and_set_credits_used(
        &self,
        id: &UserId,
        expected_used: i64,
        new_used: i64,
    ) -> Result<bool, DomainError>;

    async fn delete(&self, id: &UserId) -> Result<bool, DomainError>;

    /// Renames the row `old` to `new`, recording `old` as its legacy id.
    async fn rekey(&self, old: &UserId, new: &UserId, now: Timestamp) -> Result<bool, DomainError>;

    /// Moves rows of a user-owned upload table from `from` to `to`.
    ///
    /// The credit ledger moves through `CreditTransactionRepository`.
    async fn reassign_owned(
        &self,
        table: OwnedTable,
        from: &UserId,
        to: &UserId,
    ) -> Result<u64, DomainError>;
}
