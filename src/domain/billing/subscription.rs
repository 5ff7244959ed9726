//! Subscription lifecycle: how each provider event rewrites the user's
//! subscription fields, and how those fields decide access.

use serde::Serialize;

use crate::domain::foundation::Timestamp;
use crate::domain::user::{SubscriptionUpdate, UserRecord};

use super::plans::{is_active_tier, PlanId};
use super::polar_event::{SubscriptionEvent, SubscriptionSnapshot};

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_TRIALING: &str = "trialing";
pub const STATUS_CANCELED: &str = "canceled";
pub const STATUS_REVOKED: &str = "revoked";
pub const STATUS_ENDED: &str = "ended";

/// What a lifecycle event does to the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTransition {
    /// Status set, tier assigned from the plan.
    Activate { status: String },
    /// Provider reports a terminal status on `updated`.
    Terminate { status: String, clear_tier: bool },
    /// Cancellation; the tier survives when it takes effect at period end.
    Cancel { keep_tier: bool },
    /// Access removed immediately.
    Revoke,
    /// Pending cancellation withdrawn.
    Uncancel { status: String },
}

impl SubscriptionTransition {
    pub fn classify(event: SubscriptionEvent, snapshot: &SubscriptionSnapshot) -> Self {
        let payload_status = snapshot.status.as_deref().map(str::to_lowercase);

        match event {
            SubscriptionEvent::Created | SubscriptionEvent::Active => Self::Activate {
                status: STATUS_ACTIVE.to_string(),
            },
            SubscriptionEvent::Updated => match payload_status.as_deref() {
                Some(s @ (STATUS_CANCELED | STATUS_REVOKED | STATUS_ENDED)) => Self::Terminate {
                    status: s.to_string(),
                    clear_tier: s == STATUS_REVOKED,
                },
                Some(s) => Self::Activate { status: s.to_string() },
                None => Self::Activate {
                    status: STATUS_ACTIVE.to_string(),
                },
            },
            SubscriptionEvent::Canceled => Self::Cancel {
                keep_tier: snapshot.cancel_at_period_end.unwrap_or(false),
            },
            SubscriptionEvent::Revoked => Self::Revoke,
            SubscriptionEvent::Uncanceled => Self::Uncancel {
                status: payload_status.unwrap_or_else(|| STATUS_ACTIVE.to_string()),
            },
        }
    }

    /// Transitions that assign a tier and so need a known plan.
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Activate { .. } | Self::Uncancel { .. })
    }

    /// Builds the partial update for this transition.
    ///
    /// Returns `None` when the transition grants access but no plan is
    /// known: an unmapped product never assigns a tier.
    pub fn apply(
        event: SubscriptionEvent,
        snapshot: &SubscriptionSnapshot,
        plan: Option<PlanId>,
    ) -> Option<SubscriptionUpdate> {
        let transition = Self::classify(event, snapshot);
        if transition.grants_access() && plan.is_none() {
            return None;
        }
        Some(transition.to_update(snapshot, plan))
    }

    fn to_update(&self, snapshot: &SubscriptionSnapshot, plan: Option<PlanId>) -> SubscriptionUpdate {
        let mut update = SubscriptionUpdate {
            polar_subscription_id: snapshot.subscription_id.clone().map(Some),
            polar_customer_id: snapshot.customer_id.clone().map(Some),
            current_period_start: snapshot.current_period_start.map(Some),
            current_period_end: snapshot.current_period_end.map(Some),
            ..Default::default()
        };
        let plan_tier = plan.map(|p| p.as_str().to_string());

        match self {
            Self::Activate { status } => {
                update.subscription_status = Some(Some(status.clone()));
                update.subscription_tier = Some(plan_tier);
                update.cancel_at_period_end = Some(snapshot.cancel_at_period_end.unwrap_or(false));
            }
            Self::Terminate { status, clear_tier } => {
                update.subscription_status = Some(Some(status.clone()));
                if *clear_tier {
                    update.subscription_tier = Some(None);
                }
                update.cancel_at_period_end = snapshot.cancel_at_period_end;
            }
            Self::Cancel { keep_tier } => {
                update.subscription_status = Some(Some(STATUS_CANCELED.to_string()));
                if !keep_tier {
                    update.subscription_tier = Some(None);
                }
                update.cancel_at_period_end = Some(*keep_tier);
            }
            Self::Revoke => {
                update.subscription_status = Some(Some(STATUS_REVOKED.to_string()));
                update.subscription_tier = Some(None);
                update.cancel_at_period_end = Some(false);
            }
            Self::Uncancel { status } => {
                update.subscription_status = Some(Some(status.clone()));
                update.subscription_tier = Some(plan_tier);
                update.cancel_at_period_end = Some(false);
            }
        }
        update
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Access evaluation
// ════════════════════════════════════════════════════════════════════════════

/// Whether the stored subscription fields grant paid access.
pub fn evaluate_subscription(user: Option<&UserRecord>) -> bool {
    let Some(user) = user else {
        return false;
    };

    let status = user.subscription_status.as_deref().map(str::to_lowercase);
    let tier_active = is_active_tier(user.subscription_tier.as_deref());

    // A canceled subscription keeps access while its tier is retained, even
    // past period end; the provider's revoked event is what removes it.
    match status.as_deref() {
        Some(STATUS_ACTIVE | STATUS_TRIALING) => true,
        Some(STATUS_REVOKED | STATUS_ENDED) => false,
        _ => tier_active,
    }
}

/// Subscription summary for account screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDetails {
    pub is_active: bool,
    pub tier: Option<String>,
    pub status: Option<String>,
    pub period_end: Option<Timestamp>,
    pub will_cancel: bool,
}

pub fn subscription_details(user: Option<&UserRecord>) -> SubscriptionDetails {
    SubscriptionDetails {
        is_active: evaluate_subscription(user),
        tier: user.and_then(|u| u.subscription_tier.clone()),
        status: user.and_then(|u| u.subscription_status.clone()),
        period_end: user.and_then(|u| u.current_period_end),
        will_cancel: user.and_then(|u| u.cancel_at_period_end).unwrap_or(false),
    }
}
