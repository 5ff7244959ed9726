//! PostgreSQL implementation of WebhookEventRepository.
//!
//! Claiming relies on the `webhook_events` primary key: the insert uses
//! `ON CONFLICT (event_id) DO NOTHING` and a zero row count means another
//! delivery got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::{truncate_error, ClaimOutcome, WebhookEventRecord, WebhookEventStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::WebhookEventRepository;

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    event_id: String,
    event_type: String,
    status: String,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEventRecord {
            status: parse_status(&row.status)?,
            event_id: row.event_id,
            event_type: row.event_type,
            received_at: Timestamp::from_datetime(row.received_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            error: row.error,
        })
    }
}

fn parse_status(s: &str) -> Result<WebhookEventStatus, DomainError> {
    s.parse::<WebhookEventStatus>().map_err(|e| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid status value: {}", e))
    })
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn try_claim(&self, event_id: &str, event_type: &str) -> Result<ClaimOutcome, DomainError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, status, received_at)
            VALUES ($1, $2, 'processing', $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to claim webhook event: {}", e))
        })?;

        if inserted.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::new(
                        ErrorCode::DatabaseError,
                        format!("Failed to read webhook event status: {}", e),
                    )
                })?;

        // A row that vanished between the insert and the read was swept;
        // report it as processed rather than claiming twice.
        match status {
            Some((status,)) => Ok(ClaimOutcome::Duplicate(parse_status(&status)?)),
            None => Ok(ClaimOutcome::Duplicate(WebhookEventStatus::Processed)),
        }
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'processed', processed_at = $2, error = NULL
            WHERE event_id = $1 AND status = 'processing'
            "#,
        )
        .bind(event_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to mark webhook processed: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::WebhookEventNotFound,
                format!("No processing webhook event for {}", event_id),
            ));
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, error: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'failed', processed_at = $2, error = $3
            WHERE event_id = $1 AND status = 'processing'
            "#,
        )
        .bind(event_id)
        .bind(Utc::now())
        .bind(truncate_error(error))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to mark webhook failed: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::WebhookEventNotFound,
                format!("No processing webhook event for {}", event_id),
            ));
        }
        Ok(())
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, status, received_at, processed_at, error
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to find webhook event: {}", e))
        })?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn delete_processed_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_events
            WHERE status = 'processed' AND processed_at < $1
            "#,
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to prune webhook events: {}", e))
        })?;

        Ok(result.rows_affected())
    }
}
