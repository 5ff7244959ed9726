//! The mutable user row: identity, subscription and balance fields.

use serde::Serialize;

use crate::domain::credits::CreditBalance;
use crate::domain::foundation::{Timestamp, UserId};

use super::AuthUserProfile;

/// Tier assigned to a freshly created user.
pub const FREE_TIER: &str = "free";

/// Canonical user record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    /// Previous primary key, kept after an identity migration.
    pub legacy_user_id: Option<UserId>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub avatar_url: Option<String>,

    pub subscription_tier: Option<String>,
    pub subscription_status: Option<String>,
    pub polar_subscription_id: Option<String>,
    pub polar_customer_id: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: Option<bool>,

    pub credits: Option<i64>,
    pub credits_used: Option<i64>,
    pub credits_reset_date: Option<Timestamp>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserRecord {
    /// Builds the row for a first login: free tier, `bonus` credits and a
    /// reset date one calendar month out.
    pub fn first_login(profile: &AuthUserProfile, bonus: i64, now: Timestamp) -> Self {
        Self {
            id: profile.id.clone(),
            legacy_user_id: None,
            email: profile.email.clone(),
            name: profile.name.clone(),
            image_url: profile.image_url.clone(),
            avatar_url: profile.image_url.clone(),
            subscription_tier: Some(FREE_TIER.to_string()),
            subscription_status: None,
            polar_subscription_id: None,
            polar_customer_id: None,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: None,
            credits: Some(bonus),
            credits_used: Some(0),
            credits_reset_date: Some(now.add_months(1)),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn balance(&self) -> CreditBalance {
        CreditBalance::new(self.credits, self.credits_used)
    }

    /// True when neither billing period boundary has been recorded.
    pub fn lacks_period_metadata(&self) -> bool {
        self.current_period_start.is_none() && self.current_period_end.is_none()
    }

    /// Whether this row answers to `id`, directly or through its legacy id.
    pub fn answers_to(&self, id: &UserId) -> bool {
        &self.id == id || self.legacy_user_id.as_ref() == Some(id)
    }

    /// Refreshes the fields owned by the identity provider.
    pub fn apply_profile(&mut self, profile: &AuthUserProfile, now: Timestamp) {
        self.email = profile.email.clone();
        self.name = profile.name.clone();
        self.image_url = profile.image_url.clone();
        self.avatar_url = profile.image_url.clone();
        self.updated_at = now;
    }
}

/// Partial update of the subscription fields.
///
/// Outer `None` leaves a column untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionUpdate {
    pub polar_subscription_id: Option<Option<String>>,
    pub polar_customer_id: Option<Option<String>>,
    pub subscription_status: Option<Option<String>>,
    pub subscription_tier: Option<Option<String>>,
    pub current_period_start: Option<Option<Timestamp>>,
    pub current_period_end: Option<Option<Timestamp>>,
    pub cancel_at_period_end: Option<bool>,
}

impl SubscriptionUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the present fields to `user` and bumps `updated_at`.
    pub fn apply_to(&self, user: &mut UserRecord, now: Timestamp) {
        if let Some(v) = &self.polar_subscription_id {
            user.polar_subscription_id = v.clone();
        }
        if let Some(v) = &self.polar_customer_id {
            user.polar_customer_id = v.clone();
        }
        if let Some(v) = &self.subscription_status {
            user.subscription_status = v.clone();
        }
        if let Some(v) = &self.subscription_tier {
            user.subscription_tier = v.clone();
        }
        if let Some(v) = self.current_period_start {
            user.current_period_start = v;
        }
        if let Some(v) = self.current_period_end {
            user.current_period_end = v;
        }
        if let Some(v) = self.cancel_at_period_end {
            user.cancel_at_period_end = Some(v);
        }
        user.updated_at = now;
    }
}
