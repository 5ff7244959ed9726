//! Plan catalogue: product ids, credit allowances and tier ordering.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Paid plans, in ascending tier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlanId {
    #[serde(rename = "Small Brands")]
    SmallBrands,
    Agency,
    Studio,
}

impl PlanId {
    pub const ALL: [PlanId; 3] = [PlanId::SmallBrands, PlanId::Agency, PlanId::Studio];

    /// Display name, also the value stored in `subscription_tier`.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::SmallBrands => "Small Brands",
            PlanId::Agency => "Agency",
            PlanId::Studio => "Studio",
        }
    }

    /// Case-insensitive parse of a plan name.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().to_lowercase() == normalized)
    }

    /// Position in the tier order; higher is a bigger plan.
    pub fn tier_level(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a stored tier string names a paid plan.
pub fn is_active_tier(tier: Option<&str>) -> bool {
    tier.and_then(PlanId::parse).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

/// Operator overrides for one plan. Blank strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSettings {
    pub monthly_product_id: Option<String>,
    pub yearly_product_id: Option<String>,
    /// Older monthly product id, consulted when no monthly id is set.
    pub legacy_monthly_product_id: Option<String>,
    pub credits: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlanEntry {
    plan: PlanId,
    monthly_product_id: String,
    yearly_product_id: String,
    credits: i64,
}

impl PlanEntry {
    fn fallback(plan: PlanId) -> Self {
        let (monthly, yearly, credits) = match plan {
            PlanId::SmallBrands => (
                "d745917d-ec02-4a2d-b7bb-fd081dc59cf9",
                "7dbbd08a-5a5d-48f4-9293-beb7dfaadc6f",
                2000,
            ),
            PlanId::Agency => (
                "4afac01f-6437-41b6-9255-87114906fd4e",
                "a7310f15-c1e0-48bf-86fe-83bdda9ace00",
                5000,
            ),
            PlanId::Studio => (
                "ef63cb29-ad44-4d53-baa9-023455ba81d4",
                "344185f8-b696-4c5d-baa5-3c1ac34c34a9",
                10000,
            ),
        };
        Self {
            plan,
            monthly_product_id: monthly.to_string(),
            yearly_product_id: yearly.to_string(),
            credits,
        }
    }
}

fn configured(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolved product ids and credits for every plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    entries: Vec<PlanEntry>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            entries: PlanId::ALL.into_iter().map(PlanEntry::fallback).collect(),
        }
    }
}

impl PlanCatalog {
    /// Applies overrides for one plan.
    ///
    /// Monthly ids resolve configured, then legacy, then fallback. Yearly
    /// ids resolve configured, then fallback.
    pub fn with_plan(mut self, plan: PlanId, settings: &PlanSettings) -> Self {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.plan == plan) {
            if let Some(id) = configured(&settings.monthly_product_id)
                .or_else(|| configured(&settings.legacy_monthly_product_id))
            {
                entry.monthly_product_id = id;
            }
            if let Some(id) = configured(&settings.yearly_product_id) {
                entry.yearly_product_id = id;
            }
            if let Some(credits) = settings.credits {
                entry.credits = credits;
            }
        }
        self
    }

    fn entry(&self, plan: PlanId) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.plan == plan)
    }

    fn lookup(&self, product_id: &str) -> Option<(PlanId, BillingInterval)> {
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return None;
        }
        self.entries.iter().find_map(|e| {
            if e.monthly_product_id == product_id {
                Some((e.plan, BillingInterval::Month))
            } else if e.yearly_product_id == product_id {
                Some((e.plan, BillingInterval::Year))
            } else {
                None
            }
        })
    }

    pub fn plan_for_product(&self, product_id: &str) -> Option<PlanId> {
        self.lookup(product_id).map(|(plan, _)| plan)
    }

    pub fn interval_for_product(&self, product_id: &str) -> Option<BillingInterval> {
        self.lookup(product_id).map(|(_, interval)| interval)
    }

    pub fn credits_for_plan(&self, plan: PlanId) -> i64 {
        self.entry(plan).map(|e| e.credits).unwrap_or(0)
    }

    pub fn product_for_plan(&self, plan: PlanId, interval: BillingInterval) -> Option<&str> {
        self.entry(plan).map(|e| match interval {
            BillingInterval::Month => e.monthly_product_id.as_str(),
            BillingInterval::Year => e.yearly_product_id.as_str(),
        })
    }

    /// Rejects catalogues where two slots share a product id or a plan
    /// carries negative credits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            for id in [&entry.monthly_product_id, &entry.yearly_product_id] {
                if !seen.insert(id.as_str()) {
                    return Err(ValidationError::invalid_format(
                        "billing.plans",
                        format!("product id '{}' is assigned to more than one plan slot", id),
                    ));
                }
            }
            if entry.credits < 0 {
                return Err(ValidationError::out_of_range(
                    "billing.plans.credits",
                    0,
                    i64::MAX,
                    entry.credits,
                ));
            }
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Plan changes
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanChange {
    Upgrade,
    Downgrade,
    Same,
    Unknown,
}

pub fn compare_plans(from: Option<PlanId>, to: Option<PlanId>) -> PlanChange {
    match (from, to) {
        (Some(from), Some(to)) => match to.tier_level().cmp(&from.tier_level()) {
            std::cmp::Ordering::Greater => PlanChange::Upgrade,
            std::cmp::Ordering::Less => PlanChange::Downgrade,
            std::cmp::Ordering::Equal => PlanChange::Same,
        },
        _ => PlanChange::Unknown,
    }
}

/// Proration inputs for an upgrade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProrationOptions {
    pub grant_prorated_on_upgrade: bool,
    pub days_remaining: Option<i64>,
    pub total_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditAdjustment {
    pub adjustment: i64,
    pub reason: &'static str,
}

/// Credits to grant when a subscriber moves between plans.
///
/// Downgrades keep what was granted; upgrades wait for renewal unless
/// proration is requested.
pub fn plan_change_credit_adjustment(
    catalog: &PlanCatalog,
    from: Option<PlanId>,
    to: Option<PlanId>,
    options: ProrationOptions,
) -> CreditAdjustment {
    let reason = |reason| CreditAdjustment { adjustment: 0, reason };

    let (from_plan, to_plan) = match (compare_plans(from, to), from, to) {
        (PlanChange::Unknown | PlanChange::Same, _, _) => return reason("no_change"),
        (PlanChange::Downgrade, _, _) => return reason("downgrade_credits_retained"),
        (PlanChange::Upgrade, Some(f), Some(t)) => (f, t),
        (PlanChange::Upgrade, _, _) => return reason("no_change"),
    };

    if !options.grant_prorated_on_upgrade {
        return reason("upgrade_credits_at_renewal");
    }

    match (options.days_remaining, options.total_days) {
        (Some(remaining), Some(total)) if remaining > 0 && total > 0 => {
            let difference = catalog.credits_for_plan(to_plan) - catalog.credits_for_plan(from_plan);
            let prorated = (difference as f64 * remaining as f64 / total as f64).floor() as i64;
            CreditAdjustment {
                adjustment: prorated.max(0),
                reason: "upgrade_prorated_credit_grant",
            }
        }
        _ => reason("upgrade_missing_proration_data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Catalogue Resolution
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn defaults_resolve_fallback_products() {
        let catalog = PlanCatalog::default();

        assert_eq!(
            catalog.plan_for_product("4afac01f-6437-41b6-9255-87114906fd4e"),
            Some(PlanId::Agency)
        );
        assert_eq!(
            catalog.interval_for_product("344185f8-b696-4c5d-baa5-3c1ac34c34a9"),
            Some(BillingInterval::Year)
        );
        assert_eq!(catalog.credits_for_plan(PlanId::Studio), 10000);
        assert_eq!(catalog.plan_for_product("prod_unknown"), None);
        assert_eq!(catalog.plan_for_product("  "), None);
    }

    #[test]
    fn configured_monthly_beats_legacy() {
        let catalog = PlanCatalog::default().with_plan(
            PlanId::SmallBrands,
            &PlanSettings {
                monthly_product_id: Some("prod_new".into()),
                legacy_monthly_product_id: Some("prod_old".into()),
                ..Default::default()
            },
        );
        assert_eq!(catalog.plan_for_product("prod_new"), Some(PlanId::SmallBrands));
        assert_eq!(catalog.plan_for_product("prod_old"), None);
    }

    #[test]
    fn blank_monthly_falls_back_to_legacy() {
        let catalog = PlanCatalog::default().with_plan(
            PlanId::Agency,
            &PlanSettings {
                monthly_product_id: Some("   ".into()),
                legacy_monthly_product_id: Some("prod_pro".into()),
                credits: Some(50),
                ..Default::default()
            },
        );
        assert_eq!(
            catalog.product_for_plan(PlanId::Agency, BillingInterval::Month),
            Some("prod_pro")
        );
        assert_eq!(catalog.credits_for_plan(PlanId::Agency), 50);
        assert_eq!(
            catalog.product_for_plan(PlanId::Agency, BillingInterval::Year),
            Some("a7310f15-c1e0-48bf-86fe-83bdda9ace00")
        );
    }

    #[test]
    fn validate_rejects_shared_product_id() {
        let catalog = PlanCatalog::default()
            .with_plan(
                PlanId::SmallBrands,
                &PlanSettings {
                    monthly_product_id: Some("prod_x".into()),
                    ..Default::default()
                },
            )
            .with_plan(
                PlanId::Studio,
                &PlanSettings {
                    yearly_product_id: Some("prod_x".into()),
                    ..Default::default()
                },
            );
        assert!(catalog.validate().is_err());
        assert!(PlanCatalog::default().validate().is_ok());
    }

    #[test]
    fn plan_names_parse_case_insensitively() {
        assert_eq!(PlanId::parse("small brands"), Some(PlanId::SmallBrands));
        assert_eq!(PlanId::parse("STUDIO"), Some(PlanId::Studio));
        assert_eq!(PlanId::parse("free"), None);
        assert!(is_active_tier(Some("Agency")));
        assert!(!is_active_tier(Some("free")));
        assert!(!is_active_tier(None));
    }

    // ══════════════════════════════════════════════════════════════
    // Plan Changes
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn compare_follows_tier_order() {
        use PlanId::*;
        assert_eq!(compare_plans(Some(SmallBrands), Some(Studio)), PlanChange::Upgrade);
        assert_eq!(compare_plans(Some(Studio), Some(Agency)), PlanChange::Downgrade);
        assert_eq!(compare_plans(Some(Agency), Some(Agency)), PlanChange::Same);
        assert_eq!(compare_plans(None, Some(Agency)), PlanChange::Unknown);
    }

    #[test]
    fn downgrade_retains_credits() {
        let adj = plan_change_credit_adjustment(
            &PlanCatalog::default(),
            Some(PlanId::Studio),
            Some(PlanId::SmallBrands),
            ProrationOptions::default(),
        );
        assert_eq!(adj, CreditAdjustment { adjustment: 0, reason: "downgrade_credits_retained" });
    }

    #[test]
    fn upgrade_without_proration_waits_for_renewal() {
        let adj = plan_change_credit_adjustment(
            &PlanCatalog::default(),
            Some(PlanId::SmallBrands),
            Some(PlanId::Agency),
            ProrationOptions::default(),
        );
        assert_eq!(adj.reason, "upgrade_credits_at_renewal");
    }

    #[test]
    fn prorated_upgrade_floors_difference() {
        let adj = plan_change_credit_adjustment(
            &PlanCatalog::default(),
            Some(PlanId::SmallBrands),
            Some(PlanId::Agency),
            ProrationOptions {
                grant_prorated_on_upgrade: true,
                days_remaining: Some(10),
                total_days: Some(30),
            },
        );
        // (5000 - 2000) * 10 / 30 = 1000
        assert_eq!(adj, CreditAdjustment { adjustment: 1000, reason: "upgrade_prorated_credit_grant" });
    }

    #[test]
    fn prorated_upgrade_without_days_is_flagged() {
        let adj = plan_change_credit_adjustment(
            &PlanCatalog::default(),
            Some(PlanId::Agency),
            Some(PlanId::Studio),
            ProrationOptions {
                grant_prorated_on_upgrade: true,
                days_remaining: Some(0),
                total_days: Some(30),
            },
        );
        assert_eq!(adj.reason, "upgrade_missing_proration_data");
    }
}
