//! Credit grants for paid orders and the monthly top-up of yearly plans.
//!
//! Only new subscriptions and renewal cycles carry credits. Monthly plans
//! grant on every paid order. Yearly plans receive a first month from the
//! order only when the user has no billing period recorded yet; after that
//! [`CreditGrantPolicy::yearly_top_up`] grants one month of credits per
//! elapsed reset date.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::user::UserRecord;

use super::plans::{BillingInterval, PlanCatalog, PlanId};
use super::polar_event::OrderSnapshot;
use super::subscription::evaluate_subscription;

pub const MONTHLY_GRANT_DESCRIPTION: &str = "subscription_credits";
pub const YEARLY_INITIAL_GRANT_DESCRIPTION: &str = "subscription_credits_yearly_initial";
pub const YEARLY_MONTHLY_GRANT_DESCRIPTION: &str = "subscription_credits_yearly_monthly";

/// A period of at least this many days is a yearly subscription.
const YEARLY_PERIOD_MIN_DAYS: i64 = 300;

/// Most months granted in one catch-up.
pub const MAX_CATCH_UP_GRANTS: u32 = 12;

/// Why an order produced no grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Billing reason absent or not a subscription create/cycle.
    IneligibleReason(Option<String>),
    /// No user id or order id on the payload.
    MissingAttribution,
    /// Product id absent or not in the catalogue.
    UnknownProduct(Option<String>),
    /// Plan carries no credits.
    NoCredits(PlanId),
    /// No local user row answers to the id.
    UnknownUser(UserId),
    /// A transaction already references this order.
    AlreadyGranted(String),
    /// Yearly plan with period metadata; the monthly granter handles it.
    GrantedMonthly(PlanId),
}

/// A grant-eligible order, resolved against the catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub user_id: UserId,
    pub order_id: String,
    pub plan: PlanId,
    pub interval: BillingInterval,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantDecision {
    Grant {
        user_id: UserId,
        amount: i64,
        reset_date: Timestamp,
        reference_id: String,
        description: &'static str,
        balance_after: i64,
    },
    Skip(SkipReason),
}

/// Outcome of [`CreditGrantPolicy::yearly_top_up`].
///
/// `amount` is zero when only the reset date moves up to the period start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearlyTopUp {
    pub plan: PlanId,
    pub months: u32,
    pub amount: i64,
    pub reset_date: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CreditGrantPolicy {
    catalog: Arc<PlanCatalog>,
}

impl CreditGrantPolicy {
    pub fn new(catalog: Arc<PlanCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Checks the payload-only preconditions.
    pub fn screen(&self, order: &OrderSnapshot) -> Result<GrantRequest, SkipReason> {
        match &order.billing_reason {
            Some(reason) if reason.grants_credits() => {}
            other => {
                return Err(SkipReason::IneligibleReason(
                    other.as_ref().map(|r| r.as_str().to_string()),
                ))
            }
        }

        let (Some(user_id), Some(order_id)) = (order.user_id.clone(), order.order_id.clone()) else {
            return Err(SkipReason::MissingAttribution);
        };

        let product_id = order.product_id.as_deref();
        let resolved = product_id.and_then(|p| {
            Some((
                self.catalog.plan_for_product(p)?,
                self.catalog.interval_for_product(p)?,
            ))
        });
        let Some((plan, interval)) = resolved else {
            return Err(SkipReason::UnknownProduct(order.product_id.clone()));
        };

        let amount = self.catalog.credits_for_plan(plan);
        if amount <= 0 {
            return Err(SkipReason::NoCredits(plan));
        }

        Ok(GrantRequest {
            user_id,
            order_id,
            plan,
            interval,
            amount,
        })
    }

    /// Decides the grant for a screened request against the user's row.
    ///
    /// The caller has already checked that no transaction references the
    /// order.
    pub fn decide(&self, request: &GrantRequest, user: &UserRecord, now: Timestamp) -> GrantDecision {
        let description = match request.interval {
            BillingInterval::Year if !user.lacks_period_metadata() => {
                return GrantDecision::Skip(SkipReason::GrantedMonthly(request.plan));
            }
            BillingInterval::Year => YEARLY_INITIAL_GRANT_DESCRIPTION,
            BillingInterval::Month => MONTHLY_GRANT_DESCRIPTION,
        };

        GrantDecision::Grant {
            user_id: user.id.clone(),
            amount: request.amount,
            reset_date: now.add_months(1),
            reference_id: request.order_id.clone(),
            description,
            balance_after: user.balance().remaining + request.amount,
        }
    }

    /// Monthly credits owed to an active yearly subscriber.
    ///
    /// The reset date never trails `current_period_start`. Every reset
    /// date at or before `now` earns one month of the plan's credits, up to
    /// [`MAX_CATCH_UP_GRANTS`], and the new reset date is one calendar month
    /// past the last one granted.
    ///
    /// Returns `None` when nothing changes: inactive or non-yearly
    /// subscriptions, unknown tiers, plans without credits, or a reset date
    /// still in the future.
    pub fn yearly_top_up(&self, user: &UserRecord, now: Timestamp) -> Option<YearlyTopUp> {
        if !evaluate_subscription(Some(user)) {
            return None;
        }
        let (Some(start), Some(end)) = (user.current_period_start, user.current_period_end) else {
            return None;
        };
        if (*end.as_datetime() - *start.as_datetime()).num_days() < YEARLY_PERIOD_MIN_DAYS {
            return None;
        }
        let plan = user.subscription_tier.as_deref().and_then(PlanId::parse)?;
        let monthly = self.catalog.credits_for_plan(plan);
        if monthly <= 0 {
            return None;
        }

        let (mut cursor, adjusted) = match user.credits_reset_date {
            Some(reset) if !reset.is_before(&start) => (reset, false),
            _ => (start, true),
        };

        let mut months = 0;
        while !cursor.is_after(&now) && months < MAX_CATCH_UP_GRANTS {
            months += 1;
            cursor = cursor.add_months(1);
        }

        if months == 0 && !adjusted {
            return None;
        }
        Some(YearlyTopUp {
            plan,
            months,
            amount: monthly * i64::from(months),
            reset_date: cursor,
        })
    }
}
