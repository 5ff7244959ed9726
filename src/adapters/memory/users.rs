//! In-memory user store, including the upload tables that follow a user
//! through merges and migrations.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::user::{AuthUserProfile, OwnedTable, SubscriptionUpdate, UserRecord};
use crate::ports::UserRepository;

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserRecord>,
    /// `(row id, owner)` pairs per upload table.
    owned: HashMap<OwnedTable, Vec<(String, UserId)>>,
}

/// In-memory implementation of `UserRepository`.
#[derive(Default)]
pub struct InMemoryUserRepository {
    state: RwLock<State>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an upload row owned by `owner`.
    pub async fn seed_owned(&self, table: OwnedTable, row_id: impl Into<String>, owner: &UserId) {
        self.state
            .write()
            .await
            .owned
            .entry(table)
            .or_default()
            .push((row_id.into(), owner.clone()));
    }

    /// Row ids in `table` owned by `owner`.
    pub async fn owned_by(&self, table: OwnedTable, owner: &UserId) -> Vec<String> {
        self.state
            .read()
            .await
            .owned
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, o)| o == owner)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.users.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, DomainError> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn find_by_legacy_id(&self, legacy_id: &UserId) -> Result<Option<UserRecord>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.legacy_user_id.as_ref() == Some(legacy_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DomainError> {
        let needle = email.trim().to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.email.as_deref().map(str::to_lowercase).as_deref() == Some(needle.as_str()))
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.as_str().cmp(b.id.as_str()))
            })
            .cloned())
    }

    async fn insert(&self, user: &UserRecord) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.id) {
            return Err(DomainError::new(
                ErrorCode::UserAlreadyExists,
                format!("User {} already exists", user.id),
            ));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        id: &UserId,
        profile: &AuthUserProfile,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        Ok(match state.users.get_mut(id) {
            Some(user) => {
                user.apply_profile(profile, now);
                true
            }
            None => false,
        })
    }

    async fn update_subscription(
        &self,
        id: &UserId,
        update: &SubscriptionUpdate,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        Ok(match state.users.get_mut(id) {
            Some(user) => {
                update.apply_to(user, now);
                true
            }
            None => false,
        })
    }

    async fn add_credits(&self, id: &UserId, amount: i64) -> Result<bool, DomainError> {
        self.grant_credits_with_reset_date(id, amount, None).await
    }

    async fn grant_credits_with_reset_date(
        &self,
        id: &UserId,
        amount: i64,
        reset_date: Option<Timestamp>,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        Ok(match state.users.get_mut(id) {
            Some(user) => {
                user.credits = Some(user.credits.unwrap_or(0) + amount);
                if reset_date.is_some() {
                    user.credits_reset_date = reset_date;
                }
                user.updated_at = Timestamp::now();
                true
            }
            None => false,
        })
    }

    async fn compare_and_set_credits_used(
        &self,
        id: &UserId,
        expected_used: i64,
        new_used: i64,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        Ok(match state.users.get_mut(id) {
            Some(user) if user.credits_used.unwrap_or(0) == expected_used => {
                user.credits_used = Some(new_used);
                user.updated_at = Timestamp::now();
                true
            }
            _ => false,
        })
    }

    async fn delete(&self, id: &UserId) -> Result<bool, DomainError> {
        Ok(self.state.write().await.users.remove(id).is_some())
    }

    async fn rekey(&self, old: &UserId, new: &UserId, now: Timestamp) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(new) {
            return Err(DomainError::new(
                ErrorCode::UserAlreadyExists,
                format!("User {} already exists", new),
            ));
        }
        let Some(mut user) = state.users.remove(old) else {
            return Ok(false);
        };
        user.id = new.clone();
        user.legacy_user_id = Some(old.clone());
        user.updated_at = now;
        state.users.insert(new.clone(), user);
        Ok(true)
    }

    async fn reassign_owned(
        &self,
        table: OwnedTable,
        from: &UserId,
        to: &UserId,
    ) -> Result<u64, DomainError> {
        let mut state = self.state.write().await;
        let mut moved = 0;
        if let Some(rows) = state.owned.get_mut(&table) {
            for (_, owner) in rows.iter_mut().filter(|(_, o)| o == from) {
                *owner = to.clone();
                moved += 1;
            }
        }
        Ok(moved)
    }
}
