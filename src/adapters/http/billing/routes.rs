//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    get_billing_status, get_user_credits, handle_auth_webhook, handle_billing_webhook, health,
    list_credit_transactions, BillingAppState,
};

/// Billing and credit routes, mounted under `/api`.
///
/// # Routes
///
/// ## Webhook Endpoints (no auth, signature verified)
/// - `POST /billing/webhook` - Payment-provider events
/// - `POST /webhooks/auth` - Identity-provider user events
///
/// ## User Endpoints (require `X-User-Id`)
/// - `GET /billing/status` - Paid-access flag
/// - `GET /user/credits` - Credit balance
/// - `GET /credits/transactions` - Ledger page
pub fn api_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/billing/webhook", post(handle_billing_webhook))
        .route("/webhooks/auth", post(handle_auth_webhook))
        .route("/billing/status", get(get_billing_status))
        .route("/user/credits", get(get_user_credits))
        .route("/credits/transactions", get(list_credit_transactions))
}

/// The complete service router: `/api/...` plus `/health`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::adapters::http::billing::WebhookVerifiers;
    use crate::adapters::memory::{
        InMemoryCreditTransactionRepository, InMemoryUserRepository, InMemoryWebhookEventRepository,
    };
    use crate::domain::billing::{PlanCatalog, StandardWebhookVerifier};
    use crate::domain::credits::NewCreditTransaction;
    use crate::domain::foundation::{Timestamp, UserId};
    use crate::domain::user::{AuthUserProfile, UserRecord};
    use crate::ports::{CreditTransactionRepository, UserRepository};

    const SECRET: &str = "whsec_dGVzdC1zaWduaW5nLWtleQ==";

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    struct Harness {
        users: Arc<InMemoryUserRepository>,
        ledger: Arc<InMemoryCreditTransactionRepository>,
        verifier: Arc<StandardWebhookVerifier>,
        router: Router,
    }

    fn harness(configured: bool) -> Harness {
        let users = Arc::new(InMemoryUserRepository::new());
        let ledger = Arc::new(InMemoryCreditTransactionRepository::new());
        let verifier = Arc::new(StandardWebhookVerifier::from_secret(SECRET).unwrap());
        let verifiers = if configured {
            WebhookVerifiers {
                billing: Some(verifier.clone()),
                auth: Some(verifier.clone()),
            }
        } else {
            WebhookVerifiers::default()
        };

        let state = BillingAppState::new(
            users.clone(),
            ledger.clone(),
            Arc::new(InMemoryWebhookEventRepository::new()),
            Arc::new(PlanCatalog::default()),
            verifiers,
            100,
        );

        Harness {
            users,
            ledger,
            verifier,
            router: billing_router().with_state(state),
        }
    }

    async fn seed_user(users: &InMemoryUserRepository, id: &str, credits: i64, used: i64) {
        let profile = AuthUserProfile {
            id: UserId::new(id).unwrap(),
            email: Some(format!("{}@example.com", id)),
            name: None,
            image_url: None,
        };
        let mut record = UserRecord::first_login(&profile, credits, Timestamp::now());
        record.credits_used = Some(used);
        users.insert(&record).await.unwrap();
    }

    fn signed_post(
        verifier: &StandardWebhookVerifier,
        uri: &str,
        prefix: &str,
        id: &str,
        body: &Value,
    ) -> Request<Body> {
        let payload = body.to_string();
        let ts = chrono::Utc::now().timestamp();
        let signature = verifier.sign(id, ts, payload.as_bytes()).unwrap();

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(format!("{}-id", prefix), id)
            .header(format!("{}-timestamp", prefix), ts.to_string())
            .header(format!("{}-signature", prefix), signature)
            .header("content-type", "application/json")
            .body(Body::from(payload))
            .unwrap()
    }

    fn get_as(uri: &str, user_id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(id) = user_id {
            builder = builder.header("X-User-Id", id);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Billing Webhook
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn billing_webhook_unconfigured_returns_500() {
        let h = harness(false);
        let request = signed_post(
            &h.verifier,
            "/api/billing/webhook",
            "webhook",
            "msg_1",
            &json!({"type": "order.paid", "data": {}}),
        );

        let (status, body) = send(&h.router, request).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Webhook not configured"}));
    }

    #[tokio::test]
    async fn billing_webhook_missing_headers_returns_400() {
        let h = harness(true);
        let request = Request::builder()
            .method("POST")
            .uri("/api/billing/webhook")
            .body(Body::from("{}"))
            .unwrap();

        let (status, body) = send(&h.router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Missing webhook headers"}));
    }

    #[tokio::test]
    async fn billing_webhook_duplicate_is_flagged() {
        let h = harness(true);
        seed_user(&h.users, "user_1", 0, 0).await;
        let event = json!({
            "type": "order.paid",
            "data": {
                "id": "ord_1",
                "billing_reason": "subscription_create",
                "customer": {"external_id": "user_1"},
                "product_id": "4afac01f-6437-41b6-9255-87114906fd4e"
            }
        });

        let (first_status, first) = send(
            &h.router,
            signed_post(&h.verifier, "/api/billing/webhook", "webhook", "msg_1", &event),
        )
        .await;
        let (second_status, second) = send(
            &h.router,
            signed_post(&h.verifier, "/api/billing/webhook", "webhook", "msg_1", &event),
        )
        .await;

        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(first, json!({"ok": true}));
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(second, json!({"ok": true, "duplicate": true, "status": "processed"}));
        assert_eq!(h.ledger.len().await, 1);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Auth Webhook
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn auth_webhook_syncs_user() {
        let h = harness(true);
        let event = json!({
            "type": "user.created",
            "data": {
                "id": "user_new",
                "email_addresses": [{"id": "e1", "email_address": "new@example.com"}],
                "primary_email_address_id": "e1",
                "first_name": "Ada",
                "last_name": null,
                "image_url": ""
            }
        });

        let (status, body) = send(
            &h.router,
            signed_post(&h.verifier, "/api/webhooks/auth", "svix", "msg_a", &event),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "User synced successfully"}));
        let stored = h
            .users
            .find_by_id(&UserId::new("user_new").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.credits, Some(100));
    }

    #[tokio::test]
    async fn auth_webhook_other_event_is_empty_object() {
        let h = harness(true);
        let event = json!({"type": "session.created", "data": {}});

        let (status, body) = send(
            &h.router,
            signed_post(&h.verifier, "/api/webhooks/auth", "svix", "msg_b", &event),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Account Endpoints
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn account_endpoints_require_user_header() {
        let h = harness(true);

        let (status, body) = send(&h.router, get_as("/api/user/credits", None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Authentication required"}));
    }

    #[tokio::test]
    async fn credits_summary_for_known_user() {
        let h = harness(true);
        seed_user(&h.users, "user_1", 200, 50).await;

        let (status, body) = send(&h.router, get_as("/api/user/credits", Some("user_1"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["total"], json!(200));
        assert_eq!(body["data"]["used"], json!(50));
        assert_eq!(body["data"]["remaining"], json!(150));
        assert_eq!(body["data"]["percentage"], json!(75));
        assert_eq!(body["data"]["subscriptionTier"], json!("free"));
    }

    #[tokio::test]
    async fn credits_summary_tops_up_yearly_subscriber() {
        let h = harness(true);
        let now = Timestamp::now();
        let profile = AuthUserProfile {
            id: UserId::new("user_1").unwrap(),
            email: None,
            name: None,
            image_url: None,
        };
        let mut record = UserRecord::first_login(&profile, 0, now);
        record.subscription_tier = Some("Agency".to_string());
        record.subscription_status = Some("active".to_string());
        record.current_period_start = Some(now.minus_days(10));
        record.current_period_end = Some(now.add_days(355));
        record.credits_reset_date = Some(now.minus_days(10));
        h.users.insert(&record).await.unwrap();

        let (status, body) = send(&h.router, get_as("/api/user/credits", Some("user_1"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], json!(5000));
        assert_eq!(h.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn credits_summary_unknown_user_is_404() {
        let h = harness(true);

        let (status, body) = send(&h.router, get_as("/api/user/credits", Some("ghost"))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "User not found"}));
    }

    #[tokio::test]
    async fn billing_status_reflects_tier() {
        let h = harness(true);
        seed_user(&h.users, "user_1", 0, 0).await;

        let (status, body) = send(&h.router, get_as("/api/billing/status", Some("user_1"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"hasActiveSubscription": false}));
    }

    #[tokio::test]
    async fn transactions_are_filtered_and_paginated() {
        let h = harness(true);
        let user = UserId::new("user_1").unwrap();
        seed_user(&h.users, "user_1", 100, 0).await;
        h.ledger
            .record(NewCreditTransaction::grant(user.clone(), 100, "welcome_bonus"))
            .await
            .unwrap();
        h.ledger
            .record(NewCreditTransaction::consume(user.clone(), 5, "image"))
            .await
            .unwrap();

        let (status, body) = send(
            &h.router,
            get_as("/api/credits/transactions?type=consume&limit=10", Some("user_1")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"], json!({"limit": 10, "offset": 0, "count": 1}));
        assert_eq!(body["data"][0]["type"], json!("consume"));
        assert_eq!(body["data"][0]["amount"], json!(-5));
    }

    #[tokio::test]
    async fn transactions_unknown_type_is_400() {
        let h = harness(true);

        let (status, _) = send(
            &h.router,
            get_as("/api/credits/transactions?type=bonus", Some("user_1")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let h = harness(false);
        let response = h
            .router
            .clone()
            .oneshot(get_as("/health", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }
}
