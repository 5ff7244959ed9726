//! Billing module - payment-provider webhooks, plans and credit policy.
//!
//! # Webhook Flow
//!
//! ```text
//! raw body + headers
//!   → StandardWebhookVerifier::verify
//!   → PolarEvent::parse
//!   → idempotency_key
//!   → IdempotentWebhookProcessor::process (claim → dispatch → finalise)
//! ```
//!
//! Handlers turn subscription events into [`SubscriptionUpdate`]s through
//! [`SubscriptionTransition`] and paid orders into credit grants through
//! [`CreditGrantPolicy`].
//!
//! [`SubscriptionUpdate`]: crate::domain::user::SubscriptionUpdate

mod credit_policy;
mod errors;
mod plans;
mod polar_event;
mod subscription;
mod webhook_event;
mod webhook_processor;
mod webhook_verifier;

pub use credit_policy::{
    CreditGrantPolicy, GrantDecision, GrantRequest, SkipReason, YearlyTopUp, MAX_CATCH_UP_GRANTS,
    MONTHLY_GRANT_DESCRIPTION, YEARLY_INITIAL_GRANT_DESCRIPTION, YEARLY_MONTHLY_GRANT_DESCRIPTION,
};
pub use errors::WebhookError;
pub use plans::{
    compare_plans, is_active_tier, plan_change_credit_adjustment, BillingInterval,
    CreditAdjustment, PlanCatalog, PlanChange, PlanId, PlanSettings, ProrationOptions,
};
pub use polar_event::{
    idempotency_key, BillingReason, OrderSnapshot, PolarEvent, PolarEventKind, PolarEventType,
    SubscriptionEvent, SubscriptionSnapshot,
};
pub use subscription::{
    evaluate_subscription, subscription_details, SubscriptionDetails, SubscriptionTransition,
};
pub use webhook_event::{
    truncate_error, ClaimOutcome, WebhookEventRecord, WebhookEventStatus, MAX_ERROR_LEN,
};
pub use webhook_processor::{
    BillingEventHandler, IdempotentWebhookProcessor, WebhookDispatcher, WebhookOutcome,
};
pub use webhook_verifier::{HeaderScheme, StandardWebhookVerifier, WebhookHeaders};
