//! Payment-provider webhook events, parsed into a strict internal form.
//!
//! The wire payload is loosely shaped: every field inside `data` is
//! optional and the customer may be nested under `data.customer` or sit
//! directly on `data`. Parsing resolves all of that once, at the boundary,
//! so handlers receive plain snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::foundation::{Timestamp, UserId};

use super::errors::WebhookError;

/// Subscription lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionEvent {
    Created,
    Updated,
    Active,
    Canceled,
    Revoked,
    Uncanceled,
}

/// Event types the service knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolarEventType {
    Subscription(SubscriptionEvent),
    OrderPaid,
}

impl PolarEventType {
    /// Every handled type, in dispatch-table order.
    pub const ALL: [PolarEventType; 7] = [
        PolarEventType::Subscription(SubscriptionEvent::Created),
        PolarEventType::Subscription(SubscriptionEvent::Updated),
        PolarEventType::Subscription(SubscriptionEvent::Active),
        PolarEventType::Subscription(SubscriptionEvent::Canceled),
        PolarEventType::Subscription(SubscriptionEvent::Revoked),
        PolarEventType::Subscription(SubscriptionEvent::Uncanceled),
        PolarEventType::OrderPaid,
    ];

    /// Parses a wire type string; unknown types yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let parsed = match value {
            "subscription.created" => Self::Subscription(SubscriptionEvent::Created),
            "subscription.updated" => Self::Subscription(SubscriptionEvent::Updated),
            "subscription.active" => Self::Subscription(SubscriptionEvent::Active),
            "subscription.canceled" => Self::Subscription(SubscriptionEvent::Canceled),
            "subscription.revoked" => Self::Subscription(SubscriptionEvent::Revoked),
            "subscription.uncanceled" => Self::Subscription(SubscriptionEvent::Uncanceled),
            "order.paid" => Self::OrderPaid,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription(SubscriptionEvent::Created) => "subscription.created",
            Self::Subscription(SubscriptionEvent::Updated) => "subscription.updated",
            Self::Subscription(SubscriptionEvent::Active) => "subscription.active",
            Self::Subscription(SubscriptionEvent::Canceled) => "subscription.canceled",
            Self::Subscription(SubscriptionEvent::Revoked) => "subscription.revoked",
            Self::Subscription(SubscriptionEvent::Uncanceled) => "subscription.uncanceled",
            Self::OrderPaid => "order.paid",
        }
    }
}

impl fmt::Display for PolarEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the provider created an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingReason {
    SubscriptionCreate,
    SubscriptionCycle,
    SubscriptionUpdate,
    Purchase,
    Other(String),
}

impl BillingReason {
    pub fn parse(value: &str) -> Self {
        match value {
            "subscription_create" => Self::SubscriptionCreate,
            "subscription_cycle" => Self::SubscriptionCycle,
            "subscription_update" => Self::SubscriptionUpdate,
            "purchase" => Self::Purchase,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreate => "subscription_create",
            Self::SubscriptionCycle => "subscription_cycle",
            Self::SubscriptionUpdate => "subscription_update",
            Self::Purchase => "purchase",
            Self::Other(s) => s,
        }
    }

    /// Only new subscriptions and renewals carry credits.
    pub fn grants_credits(&self) -> bool {
        matches!(self, Self::SubscriptionCreate | Self::SubscriptionCycle)
    }
}

/// Resolved fields of a subscription payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionSnapshot {
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub user_id: Option<UserId>,
    pub product_id: Option<String>,
    pub status: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: Option<bool>,
}

/// Resolved fields of an order payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSnapshot {
    pub order_id: Option<String>,
    pub billing_reason: Option<BillingReason>,
    pub user_id: Option<UserId>,
    pub product_id: Option<String>,
    pub subscription_id: Option<String>,
}

/// Event payload, one variant per handled family.
#[derive(Debug, Clone, PartialEq)]
pub enum PolarEventKind {
    Subscription(SubscriptionEvent, SubscriptionSnapshot),
    OrderPaid(OrderSnapshot),
    Unhandled,
}

/// A verified, parsed webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarEvent {
    /// Payload-level id, when the provider sends one.
    pub id: Option<String>,
    /// Raw `type` string as delivered.
    pub event_type: String,
    /// Payload-level timestamp string, used only for the idempotency key.
    pub timestamp: Option<String>,
    pub kind: PolarEventKind,
}

impl PolarEvent {
    /// Parses a verified body.
    ///
    /// # Errors
    ///
    /// `ParseError` if the body is not a JSON object with a string `type`.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let raw: RawEvent =
            serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))?;

        if raw.event_type.trim().is_empty() {
            return Err(WebhookError::ParseError("event type is empty".to_string()));
        }

        let kind = match PolarEventType::parse(&raw.event_type) {
            Some(PolarEventType::Subscription(event)) => {
                let data: RawSubscription = decode_data(raw.data)?;
                PolarEventKind::Subscription(event, data.into_snapshot())
            }
            Some(PolarEventType::OrderPaid) => {
                let data: RawOrder = decode_data(raw.data)?;
                PolarEventKind::OrderPaid(data.into_snapshot())
            }
            None => PolarEventKind::Unhandled,
        };

        Ok(Self {
            id: raw.id.filter(|id| !id.trim().is_empty()),
            event_type: raw.event_type,
            timestamp: raw.timestamp.or(raw.created_at),
            kind,
        })
    }

    /// Dispatch key, `None` for unhandled types.
    pub fn handled_type(&self) -> Option<PolarEventType> {
        match &self.kind {
            PolarEventKind::Subscription(event, _) => Some(PolarEventType::Subscription(*event)),
            PolarEventKind::OrderPaid(_) => Some(PolarEventType::OrderPaid),
            PolarEventKind::Unhandled => None,
        }
    }
}

/// Key under which a delivery is claimed.
///
/// Prefers the signed `webhook-id` header, then the payload `id`, then
/// `type:timestamp`.
pub fn idempotency_key(header_id: Option<&str>, event: &PolarEvent) -> String {
    if let Some(id) = header_id.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }
    if let Some(id) = &event.id {
        return id.clone();
    }
    format!(
        "{}:{}",
        event.event_type,
        event.timestamp.as_deref().unwrap_or_default()
    )
}

// ════════════════════════════════════════════════════════════════════════════
// Wire shapes
// ════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawCustomer {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawProduct {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawSubscription {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    customer: Option<RawCustomer>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    product: Option<RawProduct>,
    #[serde(default)]
    current_period_start: Option<String>,
    #[serde(default)]
    current_period_end: Option<String>,
    #[serde(default)]
    cancel_at_period_end: Option<bool>,
}

#[derive(Deserialize, Default)]
struct RawOrder {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    billing_reason: Option<String>,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    customer: Option<RawCustomer>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    product: Option<RawProduct>,
    #[serde(default)]
    subscription_id: Option<String>,
}

fn decode_data<T>(data: Option<serde_json::Value>) -> Result<T, WebhookError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match data {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| WebhookError::ParseError(e.to_string()))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `customer.external_id` when a customer object is nested, else the
/// `external_id` on `data` itself.
fn resolve_user_id(customer: Option<&RawCustomer>, external_id: Option<String>) -> Option<UserId> {
    let external = match customer {
        Some(customer) => customer.external_id.clone(),
        None => external_id,
    };
    external.and_then(|id| UserId::new(id).ok())
}

fn resolve_product_id(product_id: Option<String>, product: Option<RawProduct>) -> Option<String> {
    non_blank(product_id).or_else(|| product.and_then(|p| non_blank(p.id)))
}

fn parse_timestamp(value: Option<String>) -> Option<Timestamp> {
    value
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
}

impl RawSubscription {
    fn into_snapshot(self) -> SubscriptionSnapshot {
        let user_id = resolve_user_id(self.customer.as_ref(), self.external_id);
        let customer_id = non_blank(self.customer_id)
            .or_else(|| self.customer.and_then(|c| non_blank(c.id)));

        SubscriptionSnapshot {
            subscription_id: non_blank(self.id),
            customer_id,
            user_id,
            product_id: resolve_product_id(self.product_id, self.product),
            status: non_blank(self.status),
            current_period_start: parse_timestamp(self.current_period_start),
            current_period_end: parse_timestamp(self.current_period_end),
            cancel_at_period_end: self.cancel_at_period_end,
        }
    }
}

impl RawOrder {
    fn into_snapshot(self) -> OrderSnapshot {
        OrderSnapshot {
            order_id: non_blank(self.id),
            billing_reason: non_blank(self.billing_reason).map(|r| BillingReason::parse(&r)),
            user_id: resolve_user_id(self.customer.as_ref(), self.external_id),
            product_id: resolve_product_id(self.product_id, self.product),
            subscription_id: non_blank(self.subscription_id),
        }
    }
}
