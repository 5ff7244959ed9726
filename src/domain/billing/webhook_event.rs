//! Webhook event ledger entries and their status lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, Timestamp, ValidationError};

/// Longest error text stored against a failed event.
pub const MAX_ERROR_LEN: usize = 1000;

/// Processing status of a claimed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookEventStatus {
    Processing,
    Processed,
    Failed,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl StateMachine for WebhookEventStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Processing => vec![Self::Processed, Self::Failed],
            Self::Processed | Self::Failed => vec![],
        }
    }
}

impl fmt::Display for WebhookEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown webhook event status '{}'", other),
            )),
        }
    }
}

/// Result of attempting to claim an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery inserted the row and owns processing.
    Claimed,
    /// A row already existed, with this status.
    Duplicate(WebhookEventStatus),
}

/// One row of the webhook event ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub status: WebhookEventStatus,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub error: Option<String>,
}

impl WebhookEventRecord {
    /// A freshly claimed row.
    pub fn claimed(event_id: impl Into<String>, event_type: impl Into<String>, now: Timestamp) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            status: WebhookEventStatus::Processing,
            received_at: now,
            processed_at: None,
            error: None,
        }
    }

    /// Moves to `processed`.
    pub fn complete(&mut self, now: Timestamp) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(WebhookEventStatus::Processed)?;
        self.processed_at = Some(now);
        self.error = None;
        Ok(())
    }

    /// Moves to `failed`, keeping at most [`MAX_ERROR_LEN`] characters.
    pub fn fail(&mut self, error: &str, now: Timestamp) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(WebhookEventStatus::Failed)?;
        self.processed_at = Some(now);
        self.error = Some(truncate_error(error));
        Ok(())
    }
}

/// Truncates on a char boundary to at most [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_LEN).collect()
}
