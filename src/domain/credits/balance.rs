//! Running credit balance derived from a user's `credits` and `credits_used`.

use serde::Serialize;

/// Snapshot of a user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditBalance {
    pub total: i64,
    pub used: i64,
    pub remaining: i64,
}

impl CreditBalance {
    /// Builds a balance; missing columns count as zero and remaining never
    /// goes negative.
    pub fn new(credits: Option<i64>, credits_used: Option<i64>) -> Self {
        let total = credits.unwrap_or(0);
        let used = credits_used.unwrap_or(0);
        Self {
            total,
            used,
            remaining: (total - used).max(0),
        }
    }

    pub fn covers(&self, required: i64) -> bool {
        self.remaining >= required
    }

    /// `credits_used` after consuming `amount`, or `None` when the balance
    /// does not cover it.
    pub fn used_after_consume(&self, amount: i64) -> Option<i64> {
        if self.covers(amount) {
            Some(self.used + amount)
        } else {
            None
        }
    }

    /// `credits_used` after refunding `amount`, floored at zero.
    pub fn used_after_refund(&self, amount: i64) -> i64 {
        (self.used - amount).max(0)
    }

    /// Remaining credits as a whole percentage of the total, clamped to 0..=100.
    pub fn remaining_percentage(&self) -> i64 {
        if self.total <= 0 {
            return 0;
        }
        let pct = (self.remaining as f64 / self.total as f64 * 100.0).round() as i64;
        pct.clamp(0, 100)
    }
}
