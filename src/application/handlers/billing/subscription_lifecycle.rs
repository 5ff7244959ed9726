//! SubscriptionLifecycleHandler - applies subscription events to the user row.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::services::UserService;
use crate::domain::billing::{
    BillingEventHandler, PlanCatalog, PolarEvent, PolarEventKind, PolarEventType, SubscriptionEvent,
    SubscriptionTransition, WebhookError,
};

const SUBSCRIPTION_EVENTS: [SubscriptionEvent; 6] = [
    SubscriptionEvent::Created,
    SubscriptionEvent::Updated,
    SubscriptionEvent::Active,
    SubscriptionEvent::Canceled,
    SubscriptionEvent::Revoked,
    SubscriptionEvent::Uncanceled,
];

/// Handles every `subscription.*` event through [`SubscriptionTransition`].
///
/// A payload without a user id is dropped with a warning. So is one whose
/// product is not in the catalogue, when the transition would grant access.
pub struct SubscriptionLifecycleHandler {
    users: Arc<UserService>,
    catalog: Arc<PlanCatalog>,
}

impl SubscriptionLifecycleHandler {
    pub fn new(users: Arc<UserService>, catalog: Arc<PlanCatalog>) -> Self {
        Self { users, catalog }
    }
}

#[async_trait]
impl BillingEventHandler for SubscriptionLifecycleHandler {
    fn handles(&self) -> Vec<PolarEventType> {
        SUBSCRIPTION_EVENTS
            .iter()
            .map(|e| PolarEventType::Subscription(*e))
            .collect()
    }

    async fn handle(&self, event: &PolarEvent) -> Result<(), WebhookError> {
        let PolarEventKind::Subscription(kind, snapshot) = &event.kind else {
            return Ok(());
        };

        let Some(user_id) = &snapshot.user_id else {
            tracing::warn!(
                event_type = %event.event_type,
                subscription_id = ?snapshot.subscription_id,
                "Subscription event without user id"
            );
            return Ok(());
        };

        let plan = snapshot
            .product_id
            .as_deref()
            .and_then(|p| self.catalog.plan_for_product(p));

        let Some(update) = SubscriptionTransition::apply(*kind, snapshot, plan) else {
            tracing::warn!(
                event_type = %event.event_type,
                user_id = %user_id,
                product_id = ?snapshot.product_id,
                "Unknown product on subscription event"
            );
            return Ok(());
        };

        self.users.update_subscription(user_id, &update).await?;

        tracing::info!(
            event_type = %event.event_type,
            user_id = %user_id,
            status = ?update.subscription_status,
            tier = ?update.subscription_tier,
            "Subscription updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCreditTransactionRepository, InMemoryUserRepository};
    use crate::domain::foundation::{Timestamp, UserId};
    use crate::domain::user::{AuthUserProfile, UserRecord};
    use crate::ports::UserRepository;
    use serde_json::json;

    const AGENCY_MONTHLY: &str = "4afac01f-6437-41b6-9255-87114906fd4e";

    async fn setup() -> (Arc<InMemoryUserRepository>, SubscriptionLifecycleHandler) {
        let users = Arc::new(InMemoryUserRepository::new());
        let profile = AuthUserProfile {
            id: UserId::new("user_1").unwrap(),
            email: Some("a@x.io".to_string()),
            name: None,
            image_url: None,
        };
        users
            .insert(&UserRecord::first_login(&profile, 0, Timestamp::now()))
            .await
            .unwrap();
        let service = Arc::new(UserService::new(
            users.clone(),
            Arc::new(InMemoryCreditTransactionRepository::new()),
            0,
        ));
        let handler = SubscriptionLifecycleHandler::new(service, Arc::new(PlanCatalog::default()));
        (users, handler)
    }

    fn event(event_type: &str, data: serde_json::Value) -> PolarEvent {
        PolarEvent::parse(json!({"type": event_type, "data": data}).to_string().as_bytes()).unwrap()
    }

    async fn stored(users: &InMemoryUserRepository) -> UserRecord {
        users
            .find_by_id(&UserId::new("user_1").unwrap())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn created_assigns_tier_from_product() {
        let (users, handler) = setup().await;

        handler
            .handle(&event(
                "subscription.created",
                json!({
                    "id": "sub_1",
                    "customer": {"id": "cus_1", "external_id": "user_1"},
                    "product_id": AGENCY_MONTHLY,
                    "current_period_start": "2024-01-01T00:00:00Z",
                    "current_period_end": "2024-02-01T00:00:00Z"
                }),
            ))
            .await
            .unwrap();

        let user = stored(&users).await;
        assert_eq!(user.subscription_tier.as_deref(), Some("Agency"));
        assert_eq!(user.subscription_status.as_deref(), Some("active"));
        assert_eq!(user.polar_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(user.polar_customer_id.as_deref(), Some("cus_1"));
        assert!(user.current_period_end.is_some());
    }

    #[tokio::test]
    async fn unknown_product_leaves_user_untouched() {
        let (users, handler) = setup().await;
        let before = stored(&users).await;

        handler
            .handle(&event(
                "subscription.active",
                json!({"customer": {"external_id": "user_1"}, "product_id": "prod_unknown"}),
            ))
            .await
            .unwrap();

        assert_eq!(stored(&users).await, before);
    }

    #[tokio::test]
    async fn revoked_clears_tier_without_product() {
        let (users, handler) = setup().await;
        handler
            .handle(&event(
                "subscription.active",
                json!({"customer": {"external_id": "user_1"}, "product_id": AGENCY_MONTHLY}),
            ))
            .await
            .unwrap();

        handler
            .handle(&event(
                "subscription.revoked",
                json!({"customer": {"external_id": "user_1"}}),
            ))
            .await
            .unwrap();

        let user = stored(&users).await;
        assert_eq!(user.subscription_tier, None);
        assert_eq!(user.subscription_status.as_deref(), Some("revoked"));
    }

    #[tokio::test]
    async fn canceled_at_period_end_keeps_tier() {
        let (users, handler) = setup().await;
        handler
            .handle(&event(
                "subscription.active",
                json!({"customer": {"external_id": "user_1"}, "product_id": AGENCY_MONTHLY}),
            ))
            .await
            .unwrap();

        handler
            .handle(&event(
                "subscription.canceled",
                json!({"customer": {"external_id": "user_1"}, "cancel_at_period_end": true}),
            ))
            .await
            .unwrap();

        let user = stored(&users).await;
        assert_eq!(user.subscription_tier.as_deref(), Some("Agency"));
        assert_eq!(user.cancel_at_period_end, Some(true));
    }

    #[tokio::test]
    async fn missing_user_id_is_not_an_error() {
        let (users, handler) = setup().await;
        let before = stored(&users).await;

        let result = handler
            .handle(&event("subscription.revoked", json!({"id": "sub_1"})))
            .await;

        assert!(result.is_ok());
        assert_eq!(stored(&users).await, before);
    }

    #[test]
    fn registers_all_subscription_types() {
        let handler = SubscriptionLifecycleHandler::new(
            Arc::new(UserService::new(
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(InMemoryCreditTransactionRepository::new()),
                0,
            )),
            Arc::new(PlanCatalog::default()),
        );
        let types = handler.handles();
        assert_eq!(types.len(), 6);
        assert!(!types.contains(&PolarEventType::OrderPaid));
    }
}
