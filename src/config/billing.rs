//! Billing configuration: webhook secrets, retention and plans.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::billing::{PlanCatalog, PlanId, PlanSettings, StandardWebhookVerifier};

use super::error::ValidationError;

/// Billing configuration.
///
/// Secrets are optional: an endpoint whose secret is unset answers every
/// delivery with 500 instead of accepting unsigned payloads.
#[derive(Debug, Deserialize)]
pub struct BillingConfig {
    /// Payment-provider signing secret (`whsec_...`)
    pub webhook_secret: Option<SecretString>,

    /// Identity-provider signing secret (`whsec_...`)
    pub auth_webhook_secret: Option<SecretString>,

    #[serde(default = "default_retention_days")]
    pub webhook_retention_days: u32,

    /// Seconds between retention sweeps; 0 disables the sweeper.
    #[serde(default = "default_sweep_interval")]
    pub retention_sweep_interval_secs: u64,

    #[serde(default = "default_welcome_bonus")]
    pub welcome_bonus_credits: i64,

    #[serde(default)]
    pub plans: PlansConfig,
}

/// Per-plan overrides, e.g. `STORYBOARD__BILLING__PLANS__AGENCY__MONTHLY_PRODUCT_ID`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlansConfig {
    #[serde(default)]
    pub small_brands: PlanConfig,
    #[serde(default)]
    pub agency: PlanConfig,
    #[serde(default)]
    pub studio: PlanConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanConfig {
    pub monthly_product_id: Option<String>,
    pub yearly_product_id: Option<String>,
    pub legacy_monthly_product_id: Option<String>,
    pub credits: Option<i64>,
}

impl From<&PlanConfig> for PlanSettings {
    fn from(config: &PlanConfig) -> Self {
        PlanSettings {
            monthly_product_id: config.monthly_product_id.clone(),
            yearly_product_id: config.yearly_product_id.clone(),
            legacy_monthly_product_id: config.legacy_monthly_product_id.clone(),
            credits: config.credits,
        }
    }
}

impl PlansConfig {
    fn for_plan(&self, plan: PlanId) -> &PlanConfig {
        match plan {
            PlanId::SmallBrands => &self.small_brands,
            PlanId::Agency => &self.agency,
            PlanId::Studio => &self.studio,
        }
    }
}

impl BillingConfig {
    /// Fallback catalogue with every configured override applied.
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanId::ALL
            .into_iter()
            .fold(PlanCatalog::default(), |catalog, plan| {
                catalog.with_plan(plan, &PlanSettings::from(self.plans.for_plan(plan)))
            })
    }

    pub fn billing_verifier(&self) -> Result<Option<StandardWebhookVerifier>, ValidationError> {
        build_verifier(self.webhook_secret.as_ref(), "billing.webhook_secret")
    }

    pub fn auth_verifier(&self) -> Result<Option<StandardWebhookVerifier>, ValidationError> {
        build_verifier(self.auth_webhook_secret.as_ref(), "billing.auth_webhook_secret")
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.retention_sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.retention_sweep_interval_secs))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.billing_verifier()?;
        self.auth_verifier()?;
        if self.webhook_retention_days == 0 {
            return Err(ValidationError::InvalidRetention);
        }
        if self.welcome_bonus_credits < 0 {
            return Err(ValidationError::NegativeWelcomeBonus);
        }
        self.plan_catalog()
            .validate()
            .map_err(|e| ValidationError::InvalidPlans(e.to_string()))
    }
}

fn build_verifier(
    secret: Option<&SecretString>,
    name: &'static str,
) -> Result<Option<StandardWebhookVerifier>, ValidationError> {
    let Some(secret) = secret.filter(|s| !s.expose_secret().trim().is_empty()) else {
        return Ok(None);
    };
    StandardWebhookVerifier::from_secret(secret.expose_secret())
        .map(Some)
        .map_err(|_| ValidationError::InvalidWebhookSecret(name))
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            auth_webhook_secret: None,
            webhook_retention_days: default_retention_days(),
            retention_sweep_interval_secs: default_sweep_interval(),
            welcome_bonus_credits: default_welcome_bonus(),
            plans: PlansConfig::default(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_sweep_interval() -> u64 {
    86_400
}

fn default_welcome_bonus() -> i64 {
    100
}
