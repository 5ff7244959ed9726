//! In-memory webhook event ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{ClaimOutcome, WebhookEventRecord, WebhookEventStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::WebhookEventRepository;

/// In-memory implementation of `WebhookEventRepository`.
///
/// The claim check-and-insert happens under one write lock, which gives
/// the same first-writer-wins behaviour as the database primary key.
#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<String, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row as-is. Useful for seeding retention tests.
    pub async fn insert_record(&self, record: WebhookEventRecord) {
        self.records
            .write()
            .await
            .insert(record.event_id.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn not_found(event_id: &str) -> DomainError {
    DomainError::new(
        ErrorCode::WebhookEventNotFound,
        format!("No webhook event claimed for {}", event_id),
    )
}

fn transition_error(event_id: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::InvalidStateTransition, err.to_string())
        .with_detail("event_id", event_id)
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn try_claim(&self, event_id: &str, event_type: &str) -> Result<ClaimOutcome, DomainError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(event_id) {
            return Ok(ClaimOutcome::Duplicate(existing.status));
        }
        records.insert(
            event_id.to_string(),
            WebhookEventRecord::claimed(event_id, event_type, Timestamp::now()),
        );
        Ok(ClaimOutcome::Claimed)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(event_id).ok_or_else(|| not_found(event_id))?;
        record
            .complete(Timestamp::now())
            .map_err(|e| transition_error(event_id, e))
    }

    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(event_id).ok_or_else(|| not_found(event_id))?;
        record
            .fail(error, Timestamp::now())
            .map_err(|e| transition_error(event_id, e))
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.records.read().await.get(event_id).cloned())
    }

    async fn delete_processed_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| {
            let expired = r.status == WebhookEventStatus::Processed
                && r.processed_at.map_or(false, |at| at.is_before(&cutoff));
            !expired
        });
        Ok((before - records.len()) as u64)
    }
}
