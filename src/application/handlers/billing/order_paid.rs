//! OrderPaidHandler - grants subscription credits for paid orders.
//!
//! The grant and its ledger entry are two writes. When the ledger write
//! fails the credits stay granted and the failure is only logged.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::services::UserService;
use crate::domain::billing::{
    BillingEventHandler, CreditGrantPolicy, GrantDecision, OrderSnapshot, PolarEvent, PolarEventKind,
    PolarEventType, SkipReason, WebhookError,
};
use crate::domain::credits::NewCreditTransaction;
use crate::domain::foundation::Timestamp;
use crate::ports::CreditTransactionRepository;

pub struct OrderPaidHandler {
    users: Arc<UserService>,
    transactions: Arc<dyn CreditTransactionRepository>,
    policy: CreditGrantPolicy,
}

impl OrderPaidHandler {
    pub fn new(
        users: Arc<UserService>,
        transactions: Arc<dyn CreditTransactionRepository>,
        policy: CreditGrantPolicy,
    ) -> Self {
        Self {
            users,
            transactions,
            policy,
        }
    }

    /// Runs the grant path for one order and returns what was decided.
    pub async fn grant_for_order(&self, order: &OrderSnapshot) -> Result<GrantDecision, WebhookError> {
        let request = match self.policy.screen(order) {
            Ok(request) => request,
            Err(reason) => return Ok(GrantDecision::Skip(reason)),
        };

        let Some(user) = self.users.get_user_by_id(&request.user_id).await? else {
            return Ok(GrantDecision::Skip(SkipReason::UnknownUser(request.user_id)));
        };

        if self
            .transactions
            .has_reference(&user.id, &request.order_id)
            .await?
        {
            return Ok(GrantDecision::Skip(SkipReason::AlreadyGranted(request.order_id)));
        }

        let decision = self.policy.decide(&request, &user, Timestamp::now());

        if let GrantDecision::Grant {
            user_id,
            amount,
            reset_date,
            reference_id,
            description,
            balance_after,
        } = &decision
        {
            self.users
                .grant_credits_with_reset_date(user_id, *amount, Some(*reset_date))
                .await?;

            let entry = NewCreditTransaction::grant(user_id.clone(), *amount, *description)
                .with_reference(reference_id.clone())
                .with_balance_after(*balance_after);
            if let Err(e) = self.transactions.record(entry).await {
                tracing::warn!(
                    user_id = %user_id,
                    order_id = %reference_id,
                    amount,
                    error = %e,
                    "Credits granted but transaction record failed"
                );
            }
        }

        Ok(decision)
    }
}

fn log_decision(order: &OrderSnapshot, decision: &GrantDecision) {
    let order_id = order.order_id.as_deref().unwrap_or_default();
    match decision {
        GrantDecision::Grant {
            user_id,
            amount,
            description,
            ..
        } => tracing::info!(order_id, user_id = %user_id, amount, description, "Granted subscription credits"),
        GrantDecision::Skip(SkipReason::IneligibleReason(reason)) => {
            tracing::info!(order_id, billing_reason = ?reason, "Order does not grant credits")
        }
        GrantDecision::Skip(SkipReason::GrantedMonthly(plan)) => {
            tracing::info!(order_id, plan = %plan.as_str(), "Yearly plan, credits granted monthly")
        }
        GrantDecision::Skip(SkipReason::AlreadyGranted(_)) => {
            tracing::info!(order_id, "Credits already granted for order")
        }
        GrantDecision::Skip(SkipReason::UnknownUser(user_id)) => {
            tracing::warn!(order_id, user_id = %user_id, "No user for paid order")
        }
        GrantDecision::Skip(SkipReason::UnknownProduct(product_id)) => {
            tracing::warn!(order_id, product_id = ?product_id, "Unknown product on paid order")
        }
        GrantDecision::Skip(reason) => tracing::warn!(order_id, reason = ?reason, "Paid order skipped"),
    }
}

#[async_trait]
impl BillingEventHandler for OrderPaidHandler {
    fn handles(&self) -> Vec<PolarEventType> {
        vec![PolarEventType::OrderPaid]
    }

    async fn handle(&self, event: &PolarEvent) -> Result<(), WebhookError> {
        let PolarEventKind::OrderPaid(order) = &event.kind else {
            return Ok(());
        };

        let decision = self.grant_for_order(order).await?;
        log_decision(order, &decision);
        Ok(())
    }
}
