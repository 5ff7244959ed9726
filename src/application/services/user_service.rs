//! UserService - identity sync, subscription writes and credit accounting.
//!
//! Every lookup by id falls back to `legacy_user_id`, so callers holding an
//! id from before an identity migration still reach the right row.
//!
//! Balance updates and their ledger entries are separate writes. A failed
//! ledger write is logged and does not undo the balance change.
//!
//! Yearly subscribers are topped up lazily: every balance read or spend
//! first grants the months that elapsed since the stored reset date.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::billing::{CreditGrantPolicy, PlanCatalog, PlanId, YEARLY_MONTHLY_GRANT_DESCRIPTION};
use crate::domain::credits::{CreditBalance, CreditTransaction, NewCreditTransaction, TransactionQuery};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId, ValidationError};
use crate::domain::user::{AuthUserProfile, OwnedTable, SubscriptionUpdate, UserRecord};
use crate::ports::{CreditTransactionRepository, UserRepository};

/// Compare-and-set attempts before giving up on a contended balance.
const MAX_BALANCE_ATTEMPTS: usize = 3;

pub const WELCOME_BONUS_DESCRIPTION: &str = "welcome_bonus";
const DEFAULT_CONSUME_DESCRIPTION: &str = "consumption";
const DEFAULT_REFUND_DESCRIPTION: &str = "refund";

/// Errors returned by [`UserService`].
#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error("User not found: {0}")]
    NotFound(UserId),

    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Failed to update credits due to concurrent updates")]
    ConcurrentUpdate,

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<DomainError> for UserServiceError {
    fn from(err: DomainError) -> Self {
        UserServiceError::Infrastructure(err.to_string())
    }
}

/// Optional ledger annotations for consume and refund.
#[derive(Debug, Clone, Default)]
pub struct CreditChangeOptions {
    pub description: Option<String>,
    pub reference_id: Option<String>,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    transactions: Arc<dyn CreditTransactionRepository>,
    welcome_bonus: i64,
    grants: CreditGrantPolicy,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        transactions: Arc<dyn CreditTransactionRepository>,
        welcome_bonus: i64,
    ) -> Self {
        Self {
            users,
            transactions,
            welcome_bonus,
            grants: CreditGrantPolicy::new(Arc::new(PlanCatalog::default())),
        }
    }

    /// Plan catalogue used for yearly top-ups. Defaults to the fallback plans.
    pub fn with_catalog(mut self, catalog: Arc<PlanCatalog>) -> Self {
        self.grants = CreditGrantPolicy::new(catalog);
        self
    }

    // ════════════════════════════════════════════════════════════════════════
    // Identity
    // ════════════════════════════════════════════════════════════════════════

    /// Reconciles the local row with an identity-provider profile.
    ///
    /// 1. A row keyed by the profile id wins. A different row holding the
    ///    same email is merged into it and deleted.
    /// 2. A row found only by email is migrated to the new id, keeping the
    ///    old id as `legacy_user_id`.
    /// 3. Otherwise a new row is created with the welcome bonus.
    pub async fn sync_auth_user(&self, profile: &AuthUserProfile) -> Result<UserRecord, UserServiceError> {
        let now = Timestamp::now();
        let by_id = self.users.find_by_id(&profile.id).await?;
        let by_email = match profile.lookup_email() {
            Some(email) => self.users.find_by_email(&email).await?,
            None => None,
        };

        if let Some(mut user) = by_id {
            if let Some(duplicate) = by_email.filter(|d| d.id != user.id) {
                self.merge_users(&duplicate.id, &user.id).await?;
            }
            self.users.update_profile(&user.id, profile, now).await?;
            user.apply_profile(profile, now);
            return Ok(user);
        }

        if let Some(mut user) = by_email {
            let old_id = user.id.clone();
            self.migrate_user(&old_id, &profile.id, now).await?;
            self.users.update_profile(&profile.id, profile, now).await?;
            user.id = profile.id.clone();
            user.legacy_user_id = Some(old_id);
            user.apply_profile(profile, now);
            return Ok(user);
        }

        self.create_user(profile, now).await
    }

    async fn create_user(&self, profile: &AuthUserProfile, now: Timestamp) -> Result<UserRecord, UserServiceError> {
        let user = UserRecord::first_login(profile, self.welcome_bonus, now);

        match self.users.insert(&user).await {
            Ok(()) => {}
            Err(e) if e.code == ErrorCode::UserAlreadyExists => {
                // Lost a creation race; the other request recorded the bonus.
                return self
                    .users
                    .find_by_id(&user.id)
                    .await?
                    .ok_or_else(|| UserServiceError::NotFound(user.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.id, bonus = self.welcome_bonus, "Created user");

        let reference = format!("{}:{}", WELCOME_BONUS_DESCRIPTION, user.id);
        let entry = NewCreditTransaction::grant(user.id.clone(), self.welcome_bonus, WELCOME_BONUS_DESCRIPTION)
            .with_reference(reference)
            .with_balance_after(self.welcome_bonus);
        if let Err(e) = self.transactions.record(entry).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to record welcome bonus transaction");
        }

        Ok(user)
    }

    /// Moves everything owned by `source` to `target`, then deletes `source`.
    async fn merge_users(&self, source: &UserId, target: &UserId) -> Result<(), UserServiceError> {
        tracing::info!(source = %source, target = %target, "Merging duplicate user");
        self.reassign_owned_rows(source, target).await;

        if !self.users.delete(source).await? {
            tracing::warn!(user_id = %source, "Merged user row was already gone");
        }
        Ok(())
    }

    /// Re-keys owned rows and the user row from `old` to `new`.
    async fn migrate_user(&self, old: &UserId, new: &UserId, now: Timestamp) -> Result<(), UserServiceError> {
        tracing::info!(old_id = %old, new_id = %new, "Migrating user to new identity");
        self.reassign_owned_rows(old, new).await;

        if !self.users.rekey(old, new, now).await? {
            return Err(UserServiceError::NotFound(old.clone()));
        }
        Ok(())
    }

    async fn reassign_owned_rows(&self, from: &UserId, to: &UserId) {
        for table in OwnedTable::ALL {
            let result = match table {
                OwnedTable::CreditTransactions => self.transactions.reassign_user(from, to).await,
                other => self.users.reassign_owned(other, from, to).await,
            };
            match result {
                Ok(moved) => tracing::debug!(table = %table, from = %from, to = %to, moved, "Reassigned rows"),
                Err(e) => tracing::warn!(table = %table, from = %from, to = %to, error = %e, "Failed to reassign rows"),
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Lookups
    // ════════════════════════════════════════════════════════════════════════

    /// Finds by primary key, then by legacy id.
    pub async fn get_user_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, UserServiceError> {
        if let Some(user) = self.users.find_by_id(id).await? {
            return Ok(Some(user));
        }
        Ok(self.users.find_by_legacy_id(id).await?)
    }

    /// Canonical id of the row answering to `id`.
    pub async fn resolve_user_id_for_write(&self, id: &UserId) -> Result<Option<UserId>, UserServiceError> {
        Ok(self.get_user_by_id(id).await?.map(|u| u.id))
    }

    async fn resolve_or_warn(&self, id: &UserId, action: &'static str) -> Result<Option<UserId>, UserServiceError> {
        let resolved = self.resolve_user_id_for_write(id).await?;
        if resolved.is_none() {
            tracing::warn!(user_id = %id, action, "No user row for write");
        }
        Ok(resolved)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Writers
    // ════════════════════════════════════════════════════════════════════════

    pub async fn add_credits(&self, id: &UserId, amount: i64) -> Result<(), UserServiceError> {
        if amount <= 0 {
            return Ok(());
        }
        if let Some(resolved) = self.resolve_or_warn(id, "add_credits").await? {
            self.users.add_credits(&resolved, amount).await?;
        }
        Ok(())
    }

    pub async fn grant_credits_with_reset_date(
        &self,
        id: &UserId,
        amount: i64,
        reset_date: Option<Timestamp>,
    ) -> Result<(), UserServiceError> {
        if amount == 0 && reset_date.is_none() {
            return Ok(());
        }
        if let Some(resolved) = self.resolve_or_warn(id, "grant_credits").await? {
            self.users
                .grant_credits_with_reset_date(&resolved, amount, reset_date)
                .await?;
        }
        Ok(())
    }

    pub async fn update_subscription(&self, id: &UserId, update: &SubscriptionUpdate) -> Result<(), UserServiceError> {
        if let Some(resolved) = self.resolve_or_warn(id, "update_subscription").await? {
            self.users
                .update_subscription(&resolved, update, Timestamp::now())
                .await?;
        }
        Ok(())
    }

    /// Sets or clears the tier alone.
    pub async fn update_subscription_tier(&self, id: &UserId, plan: Option<PlanId>) -> Result<(), UserServiceError> {
        let update = SubscriptionUpdate {
            subscription_tier: Some(plan.map(|p| p.as_str().to_string())),
            ..Default::default()
        };
        self.update_subscription(id, &update).await
    }

    /// Deletes the row answering to `id`. Returns whether one was removed.
    pub async fn delete_user(&self, id: &UserId) -> Result<bool, UserServiceError> {
        let Some(resolved) = self.resolve_or_warn(id, "delete_user").await? else {
            return Ok(false);
        };
        let deleted = self.users.delete(&resolved).await?;
        if deleted {
            tracing::info!(user_id = %resolved, "Deleted user");
        }
        Ok(deleted)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Credits
    // ════════════════════════════════════════════════════════════════════════

    /// The user answering to `id` with any yearly top-up applied.
    pub async fn get_user_with_credits(&self, id: &UserId) -> Result<Option<UserRecord>, UserServiceError> {
        match self.get_user_by_id(id).await? {
            Some(user) => Ok(Some(self.sync_subscription_credits(user).await?)),
            None => Ok(None),
        }
    }

    /// Grants the monthly credits an active yearly subscription has accrued
    /// since its reset date and moves the reset date forward.
    ///
    /// Returns the record as it stands after the grant.
    pub async fn sync_subscription_credits(&self, mut user: UserRecord) -> Result<UserRecord, UserServiceError> {
        let Some(top_up) = self.grants.yearly_top_up(&user, Timestamp::now()) else {
            return Ok(user);
        };

        self.users
            .grant_credits_with_reset_date(&user.id, top_up.amount, Some(top_up.reset_date))
            .await?;
        user.credits = Some(user.credits.unwrap_or(0) + top_up.amount);
        user.credits_reset_date = Some(top_up.reset_date);

        if top_up.amount == 0 {
            tracing::debug!(user_id = %user.id, reset_date = %top_up.reset_date.to_rfc3339(), "Moved credit reset date to period start");
            return Ok(user);
        }

        tracing::info!(
            user_id = %user.id,
            plan = %top_up.plan,
            months = top_up.months,
            amount = top_up.amount,
            "Granted yearly plan monthly credits"
        );
        let entry = NewCreditTransaction::grant(user.id.clone(), top_up.amount, YEARLY_MONTHLY_GRANT_DESCRIPTION)
            .with_balance_after(user.balance().remaining);
        if let Err(e) = self.transactions.record(entry).await {
            tracing::warn!(user_id = %user.id, amount = top_up.amount, error = %e, "Failed to record yearly top-up transaction");
        }
        Ok(user)
    }

    /// Current balance, failing when it does not cover `required`.
    pub async fn ensure_credits(&self, id: &UserId, required: i64) -> Result<CreditBalance, UserServiceError> {
        let user = self.require_user(id).await?;
        let user = self.sync_subscription_credits(user).await?;
        let balance = user.balance();
        if !balance.covers(required) {
            return Err(UserServiceError::InsufficientCredits {
                required,
                available: balance.remaining,
            });
        }
        Ok(balance)
    }

    /// Spends `amount` credits with an optimistic update of `credits_used`.
    pub async fn consume_credits(
        &self,
        id: &UserId,
        amount: i64,
        options: CreditChangeOptions,
    ) -> Result<CreditBalance, UserServiceError> {
        if amount <= 0 {
            return self.ensure_credits(id, 0).await;
        }

        let user = self.require_user(id).await?;
        self.sync_subscription_credits(user).await?;

        let (user_id, balance) = self
            .update_credits_used(id, |balance| {
                balance
                    .used_after_consume(amount)
                    .ok_or_else(|| UserServiceError::InsufficientCredits {
                        required: amount,
                        available: balance.remaining,
                    })
            })
            .await?;

        let entry = NewCreditTransaction::consume(
            user_id.clone(),
            amount,
            options.description.unwrap_or_else(|| DEFAULT_CONSUME_DESCRIPTION.to_string()),
        )
        .with_optional_reference(options.reference_id)
        .with_balance_after(balance.remaining);
        if let Err(e) = self.transactions.record(entry).await {
            tracing::warn!(user_id = %user_id, amount, error = %e, "Failed to record consume transaction");
        }

        Ok(balance)
    }

    /// Returns `amount` credits; `credits_used` never drops below zero.
    pub async fn refund_credits(
        &self,
        id: &UserId,
        amount: i64,
        options: CreditChangeOptions,
    ) -> Result<CreditBalance, UserServiceError> {
        if amount <= 0 {
            return self.ensure_credits(id, 0).await;
        }

        let (user_id, balance) = self
            .update_credits_used(id, |balance| Ok(balance.used_after_refund(amount)))
            .await?;

        let entry = NewCreditTransaction::refund(
            user_id.clone(),
            amount,
            options.description.unwrap_or_else(|| DEFAULT_REFUND_DESCRIPTION.to_string()),
        )
        .with_optional_reference(options.reference_id)
        .with_balance_after(balance.remaining);
        if let Err(e) = self.transactions.record(entry).await {
            tracing::warn!(user_id = %user_id, amount, error = %e, "Failed to record refund transaction");
        }

        Ok(balance)
    }

    /// Ledger entries for the user answering to `id`, newest first.
    pub async fn list_transactions(
        &self,
        id: &UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>, UserServiceError> {
        let user_id = self
            .resolve_user_id_for_write(id)
            .await?
            .unwrap_or_else(|| id.clone());
        Ok(self.transactions.list(&user_id, query).await?)
    }

    async fn require_user(&self, id: &UserId) -> Result<UserRecord, UserServiceError> {
        self.get_user_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(id.clone()))
    }

    /// Retries `next_used` against a fresh read until the compare-and-set
    /// lands. Returns the canonical id and the balance after the write.
    async fn update_credits_used<F>(&self, id: &UserId, next_used: F) -> Result<(UserId, CreditBalance), UserServiceError>
    where
        F: Fn(&CreditBalance) -> Result<i64, UserServiceError>,
    {
        for attempt in 1..=MAX_BALANCE_ATTEMPTS {
            let user = self.require_user(id).await?;
            let balance = user.balance();
            let new_used = next_used(&balance)?;

            if self
                .users
                .compare_and_set_credits_used(&user.id, balance.used, new_used)
                .await?
            {
                return Ok((user.id, CreditBalance::new(user.credits, Some(new_used))));
            }
            tracing::debug!(user_id = %user.id, attempt, "credits_used changed underneath, retrying");
        }
        Err(UserServiceError::ConcurrentUpdate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCreditTransactionRepository, InMemoryUserRepository};
    use crate::domain::credits::CreditTransactionKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn profile(id: &str, email: &str) -> AuthUserProfile {
        AuthUserProfile {
            id: uid(id),
            email: Some(email.to_string()),
            name: Some("Ada".to_string()),
            image_url: Some("https://img/a.png".to_string()),
        }
    }

    struct Fixture {
        users: Arc<InMemoryUserRepository>,
        ledger: Arc<InMemoryCreditTransactionRepository>,
        service: UserService,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserRepository::new());
        let ledger = Arc::new(InMemoryCreditTransactionRepository::new());
        let service = UserService::new(users.clone(), ledger.clone(), 100);
        Fixture { users, ledger, service }
    }

    /// Ledger that rejects every write.
    struct FailingLedger;

    #[async_trait]
    impl CreditTransactionRepository for FailingLedger {
        async fn record(&self, _entry: NewCreditTransaction) -> Result<CreditTransaction, DomainError> {
            Err(DomainError::database("ledger down"))
        }
        async fn list(&self, _u: &UserId, _q: &TransactionQuery) -> Result<Vec<CreditTransaction>, DomainError> {
            Ok(vec![])
        }
        async fn find(
            &self,
            _id: &crate::domain::foundation::TransactionId,
            _u: &UserId,
        ) -> Result<Option<CreditTransaction>, DomainError> {
            Ok(None)
        }
        async fn has_reference(&self, _u: &UserId, _r: &str) -> Result<bool, DomainError> {
            Ok(false)
        }
        async fn total_granted(&self, _u: &UserId) -> Result<i64, DomainError> {
            Ok(0)
        }
        async fn total_consumed(&self, _u: &UserId) -> Result<i64, DomainError> {
            Ok(0)
        }
        async fn reassign_user(&self, _f: &UserId, _t: &UserId) -> Result<u64, DomainError> {
            Err(DomainError::database("ledger down"))
        }
    }

    /// User store whose compare-and-set always loses.
    struct ContendedUsers {
        inner: InMemoryUserRepository,
        cas_calls: AtomicU32,
    }

    #[async_trait]
    impl UserRepository for ContendedUsers {
        async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, DomainError> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_legacy_id(&self, id: &UserId) -> Result<Option<UserRecord>, DomainError> {
            self.inner.find_by_legacy_id(id).await
        }
        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DomainError> {
            self.inner.find_by_email(email).await
        }
        async fn insert(&self, user: &UserRecord) -> Result<(), DomainError> {
            self.inner.insert(user).await
        }
        async fn update_profile(&self, id: &UserId, p: &AuthUserProfile, now: Timestamp) -> Result<bool, DomainError> {
            self.inner.update_profile(id, p, now).await
        }
        async fn update_subscription(
            &self,
            id: &UserId,
            u: &SubscriptionUpdate,
            now: Timestamp,
        ) -> Result<bool, DomainError> {
            self.inner.update_subscription(id, u, now).await
        }
        async fn add_credits(&self, id: &UserId, amount: i64) -> Result<bool, DomainError> {
            self.inner.add_credits(id, amount).await
        }
        async fn grant_credits_with_reset_date(
            &self,
            id: &UserId,
            amount: i64,
            reset: Option<Timestamp>,
        ) -> Result<bool, DomainError> {
            self.inner.grant_credits_with_reset_date(id, amount, reset).await
        }
        async fn compare_and_set_credits_used(&self, _id: &UserId, _e: i64, _n: i64) -> Result<bool, DomainError> {
            self.cas_calls.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
        async fn delete(&self, id: &UserId) -> Result<bool, DomainError> {
            self.inner.delete(id).await
        }
        async fn rekey(&self, old: &UserId, new: &UserId, now: Timestamp) -> Result<bool, DomainError> {
            self.inner.rekey(old, new, now).await
        }
        async fn reassign_owned(&self, t: OwnedTable, f: &UserId, to: &UserId) -> Result<u64, DomainError> {
            self.inner.reassign_owned(t, f, to).await
        }
    }

    // ════════════════════════════════════════════════════════════════════
    // sync_auth_user
    // ════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn new_identity_gets_welcome_bonus_and_ledger_entry() {
        let f = fixture();

        let user = f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();

        assert_eq!(user.credits, Some(100));
        let entries = f.ledger.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, CreditTransactionKind::Grant);
        assert_eq!(entries[0].description, WELCOME_BONUS_DESCRIPTION);
        assert_eq!(entries[0].reference_id.as_deref(), Some("welcome_bonus:user_a"));
        assert_eq!(entries[0].balance_after, Some(100));
    }

    #[tokio::test]
    async fn welcome_ledger_failure_still_creates_user() {
        let users = Arc::new(InMemoryUserRepository::new());
        let service = UserService::new(users.clone(), Arc::new(FailingLedger), 100);

        service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();

        assert!(users.find_by_id(&uid("user_a")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn existing_identity_refreshes_profile_without_bonus() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();

        let mut changed = profile("user_a", "a@x.io");
        changed.name = Some("Ada L".to_string());
        let user = f.service.sync_auth_user(&changed).await.unwrap();

        assert_eq!(user.name.as_deref(), Some("Ada L"));
        assert_eq!(f.ledger.len().await, 1);
        let stored = f.users.find_by_id(&uid("user_a")).await.unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("Ada L"));
    }

    #[tokio::test]
    async fn email_duplicate_is_merged_into_auth_id_row() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();
        f.service.sync_auth_user(&profile("user_b", "b@x.io")).await.unwrap();
        f.users
            .seed_owned(OwnedTable::UploadedModels, "model_1", &uid("user_b"))
            .await;

        // user_a now signs in with user_b's email.
        f.service.sync_auth_user(&profile("user_a", "B@x.io")).await.unwrap();

        assert!(f.users.find_by_id(&uid("user_b")).await.unwrap().is_none());
        let a_entries = f.ledger.all().await;
        assert!(a_entries.iter().all(|t| t.user_id == uid("user_a")));
        assert_eq!(
            f.users.owned_by(OwnedTable::UploadedModels, &uid("user_a")).await,
            vec!["model_1"]
        );
    }

    #[tokio::test]
    async fn merge_continues_when_a_table_fails() {
        let users = Arc::new(InMemoryUserRepository::new());
        let service = UserService::new(users.clone(), Arc::new(FailingLedger), 0);
        service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();
        service.sync_auth_user(&profile("user_b", "b@x.io")).await.unwrap();

        service.sync_auth_user(&profile("user_a", "b@x.io")).await.unwrap();

        assert!(users.find_by_id(&uid("user_b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_auth_id_for_known_email_migrates_row() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_old", "a@x.io")).await.unwrap();
        f.users
            .seed_owned(OwnedTable::UploadedLocations, "loc_1", &uid("user_old"))
            .await;

        let user = f.service.sync_auth_user(&profile("user_new", "a@x.io")).await.unwrap();

        assert_eq!(user.id, uid("user_new"));
        assert_eq!(user.legacy_user_id, Some(uid("user_old")));
        assert_eq!(user.credits, Some(100));
        assert!(f.ledger.all().await.iter().all(|t| t.user_id == uid("user_new")));
        assert_eq!(
            f.users.owned_by(OwnedTable::UploadedLocations, &uid("user_new")).await,
            vec!["loc_1"]
        );
        // Stale callers still resolve.
        let found = f.service.get_user_by_id(&uid("user_old")).await.unwrap().unwrap();
        assert_eq!(found.id, uid("user_new"));
    }

    // ════════════════════════════════════════════════════════════════════
    // Writers
    // ════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn writers_follow_legacy_id() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_old", "a@x.io")).await.unwrap();
        f.service.sync_auth_user(&profile("user_new", "a@x.io")).await.unwrap();

        f.service.add_credits(&uid("user_old"), 25).await.unwrap();
        f.service
            .update_subscription_tier(&uid("user_old"), Some(PlanId::Agency))
            .await
            .unwrap();

        let user = f.users.find_by_id(&uid("user_new")).await.unwrap().unwrap();
        assert_eq!(user.credits, Some(125));
        assert_eq!(user.subscription_tier.as_deref(), Some("Agency"));
    }

    #[tokio::test]
    async fn writers_for_unknown_user_are_noops() {
        let f = fixture();

        f.service.add_credits(&uid("ghost"), 10).await.unwrap();
        f.service
            .grant_credits_with_reset_date(&uid("ghost"), 10, Some(Timestamp::now()))
            .await
            .unwrap();
        assert!(!f.service.delete_user(&uid("ghost")).await.unwrap());
        assert!(f.users.is_empty().await);
    }

    #[tokio::test]
    async fn non_positive_add_is_ignored() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();

        f.service.add_credits(&uid("user_a"), -5).await.unwrap();

        let user = f.users.find_by_id(&uid("user_a")).await.unwrap().unwrap();
        assert_eq!(user.credits, Some(100));
    }

    // ════════════════════════════════════════════════════════════════════
    // Credits
    // ════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn consume_updates_balance_and_records_negative_amount() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();

        let balance = f
            .service
            .consume_credits(&uid("user_a"), 30, CreditChangeOptions::default())
            .await
            .unwrap();

        assert_eq!(balance, CreditBalance { total: 100, used: 30, remaining: 70 });
        let consume = f
            .ledger
            .all()
            .await
            .into_iter()
            .find(|t| t.kind == CreditTransactionKind::Consume)
            .unwrap();
        assert_eq!(consume.amount, -30);
        assert_eq!(consume.description, "consumption");
        assert_eq!(consume.balance_after, Some(70));
    }

    #[tokio::test]
    async fn consume_beyond_balance_is_rejected() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();

        let err = f
            .service
            .consume_credits(&uid("user_a"), 101, CreditChangeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UserServiceError::InsufficientCredits { required: 101, available: 100 }
        ));
    }

    #[tokio::test]
    async fn consume_for_unknown_user_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .consume_credits(&uid("ghost"), 1, CreditChangeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn consume_gives_up_after_three_lost_races() {
        let inner = InMemoryUserRepository::new();
        inner
            .insert(&UserRecord::first_login(&profile("user_a", "a@x.io"), 100, Timestamp::now()))
            .await
            .unwrap();
        let users = Arc::new(ContendedUsers {
            inner,
            cas_calls: AtomicU32::new(0),
        });
        let service = UserService::new(users.clone(), Arc::new(InMemoryCreditTransactionRepository::new()), 100);

        let err = service
            .consume_credits(&uid("user_a"), 1, CreditChangeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, UserServiceError::ConcurrentUpdate));
        assert_eq!(users.cas_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn refund_floors_used_at_zero() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();
        f.service
            .consume_credits(&uid("user_a"), 10, CreditChangeOptions::default())
            .await
            .unwrap();

        let balance = f
            .service
            .refund_credits(
                &uid("user_a"),
                25,
                CreditChangeOptions {
                    description: Some("generation_failed".to_string()),
                    reference_id: Some("job_1".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(balance.used, 0);
        let refund = f
            .ledger
            .all()
            .await
            .into_iter()
            .find(|t| t.kind == CreditTransactionKind::Refund)
            .unwrap();
        assert_eq!(refund.amount, 25);
        assert_eq!(refund.reference_id.as_deref(), Some("job_1"));
    }

    #[tokio::test]
    async fn ensure_credits_checks_remaining() {
        let f = fixture();
        f.service.sync_auth_user(&profile("user_a", "a@x.io")).await.unwrap();

        assert_eq!(f.service.ensure_credits(&uid("user_a"), 100).await.unwrap().remaining, 100);
        assert!(matches!(
            f.service.ensure_credits(&uid("user_a"), 101).await,
            Err(UserServiceError::InsufficientCredits { .. })
        ));
    }

    // ════════════════════════════════════════════════════════════════════
    // Yearly top-up
    // ════════════════════════════════════════════════════════════════════

    /// Active Agency subscriber `days_in` days into a period of
    /// `period_days`, with the reset date at the period start.
    async fn seed_subscriber(f: &Fixture, days_in: i64, period_days: i64) {
        let now = Timestamp::now();
        let mut user = UserRecord::first_login(&profile("user_a", "a@x.io"), 0, now);
        user.subscription_tier = Some("Agency".to_string());
        user.subscription_status = Some("active".to_string());
        user.current_period_start = Some(now.minus_days(days_in));
        user.current_period_end = Some(now.minus_days(days_in).add_days(period_days));
        user.credits_reset_date = user.current_period_start;
        f.users.insert(&user).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_credits_grants_elapsed_yearly_months() {
        let f = fixture();
        seed_subscriber(&f, 95, 365).await;

        let balance = f.service.ensure_credits(&uid("user_a"), 0).await.unwrap();

        assert_eq!(balance.remaining, 4 * 5000);
        let stored = f.users.find_by_id(&uid("user_a")).await.unwrap().unwrap();
        assert_eq!(stored.credits, Some(20_000));
        assert!(stored.credits_reset_date.unwrap().is_after(&Timestamp::now()));

        let entries = f.ledger.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, YEARLY_MONTHLY_GRANT_DESCRIPTION);
        assert_eq!(entries[0].amount, 20_000);

        // The reset date moved past now, so a second read grants nothing.
        f.service.ensure_credits(&uid("user_a"), 0).await.unwrap();
        assert_eq!(f.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn consume_spends_topped_up_credits() {
        let f = fixture();
        seed_subscriber(&f, 5, 365).await;

        let balance = f
            .service
            .consume_credits(&uid("user_a"), 1000, CreditChangeOptions::default())
            .await
            .unwrap();

        assert_eq!(balance, CreditBalance { total: 5000, used: 1000, remaining: 4000 });
    }

    #[tokio::test]
    async fn monthly_subscriber_is_not_topped_up() {
        let f = fixture();
        seed_subscriber(&f, 40, 30).await;

        let balance = f.service.ensure_credits(&uid("user_a"), 0).await.unwrap();

        assert_eq!(balance.remaining, 0);
        assert!(f.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn catalog_override_sets_top_up_amount() {
        let users = Arc::new(InMemoryUserRepository::new());
        let ledger = Arc::new(InMemoryCreditTransactionRepository::new());
        let catalog = PlanCatalog::default().with_plan(
            PlanId::Agency,
            &crate::domain::billing::PlanSettings {
                credits: Some(700),
                ..Default::default()
            },
        );
        let service = UserService::new(users.clone(), ledger.clone(), 0).with_catalog(Arc::new(catalog));
        let f = Fixture { users, ledger, service };
        seed_subscriber(&f, 1, 365).await;

        let user = f.service.get_user_with_credits(&uid("user_a")).await.unwrap().unwrap();

        assert_eq!(user.credits, Some(700));
    }
}
