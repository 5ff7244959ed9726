//! WebhookRetentionSweeper - background pruning of processed webhook events.
//!
//! Only `processed` rows are removed. `failed` rows stay for inspection and
//! keep blocking redelivery of their event id.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 24h | Time between sweeps |
//! | `retention_days` | 30 | Age past which processed rows are deleted |

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::WebhookEventRepository;

#[derive(Debug, Clone)]
pub struct RetentionSweeperConfig {
    pub interval: Duration,
    pub retention_days: u32,
}

impl Default for RetentionSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(86_400),
            retention_days: 30,
        }
    }
}

impl RetentionSweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

pub struct WebhookRetentionSweeper {
    repository: Arc<dyn WebhookEventRepository>,
    config: RetentionSweeperConfig,
}

impl WebhookRetentionSweeper {
    pub fn new(repository: Arc<dyn WebhookEventRepository>, config: RetentionSweeperConfig) -> Self {
        Self { repository, config }
    }

    /// Sweeps on every tick until `shutdown` flips to true or its sender is
    /// dropped. A failed sweep is logged and the loop carries on.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("Shutdown sender dropped; webhook retention sweeper stopping");
                        return;
                    }
                    if *shutdown.borrow() {
                        tracing::info!("Webhook retention sweeper stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Webhook retention sweep failed");
                    }
                }
            }
        }
    }

    /// Deletes processed events older than the retention window.
    pub async fn sweep_once(&self) -> Result<u64, DomainError> {
        let cutoff = Timestamp::now().minus_days(i64::from(self.config.retention_days));
        let deleted = self.repository.delete_processed_before(cutoff).await?;
        tracing::info!(deleted, retention_days = self.config.retention_days, "Webhook retention sweep");
        Ok(deleted)
    }
}
