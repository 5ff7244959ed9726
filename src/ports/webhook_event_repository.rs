//! WebhookEventRepository port - Idempotency ledger for provider webhooks.
//!
//! The payment provider delivers at least once: network timeouts, 5xx
//! responses and lost acknowledgements all cause redelivery. One row per
//! idempotency key gates processing.

use async_trait::async_trait;

use crate::domain::billing::{ClaimOutcome, WebhookEventRecord};
use crate::domain::foundation::{DomainError, Timestamp};

/// Port for the webhook event ledger.
///
/// Implementations must make `try_claim` atomic (PRIMARY KEY on
/// `event_id` with `ON CONFLICT DO NOTHING`) so concurrent deliveries of
/// one key produce exactly one `Claimed`.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Inserts a `processing` row unless one exists.
    ///
    /// Returns `Duplicate` with the existing row's status otherwise.
    async fn try_claim(&self, event_id: &str, event_type: &str) -> Result<ClaimOutcome, DomainError>;

    /// Marks a claimed row `processed` and stamps `processed_at`.
    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError>;

    /// Marks a claimed row `failed` with the error text truncated to
    /// 1000 characters.
    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError>;

    /// Find a row by its idempotency key.
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Deletes `processed` rows whose `processed_at` is before `cutoff`.
    ///
    /// Returns the number of rows deleted. `processing` and `failed` rows
    /// are kept.
    async fn delete_processed_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_event_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn WebhookEventRepository) {}
    }
}
