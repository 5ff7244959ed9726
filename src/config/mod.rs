//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `STORYBOARD` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use storyboard_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod error;
mod server;

pub use billing::{BillingConfig, PlanConfig, PlansConfig};
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL connection; absent means in-memory stores
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Webhook secrets, retention and plan catalogue
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// `.env` is read first when present. Then:
    ///
    /// - `STORYBOARD__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `STORYBOARD__DATABASE__URL=...` -> `database.url = ...`
    /// - `STORYBOARD__BILLING__WEBHOOK_SECRET=whsec_...` -> `billing.webhook_secret`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("STORYBOARD")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate(self.is_production())?;
        self.billing.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
