//! Credit ledger entries.
//!
//! The ledger is append-only: entries are created once per
//! balance-affecting event and never mutated, except for re-keying the
//! owner when two user records are merged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, TransactionId, UserId, ValidationError};

/// Default page size for ledger listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound on a single ledger page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditTransactionKind {
    Grant,
    Consume,
    Refund,
}

impl CreditTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Consume => "consume",
            Self::Refund => "refund",
        }
    }
}

impl fmt::Display for CreditTransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditTransactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(Self::Grant),
            "consume" => Ok(Self::Consume),
            "refund" => Ok(Self::Refund),
            other => Err(ValidationError::invalid_format(
                "type",
                format!("unknown transaction type '{}'", other),
            )),
        }
    }
}

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    /// Signed: consumption is stored negative, grants and refunds positive.
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: CreditTransactionKind,
    pub description: String,
    pub reference_id: Option<String>,
    pub balance_after: Option<i64>,
    pub created_at: Timestamp,
}

/// Input for appending a ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCreditTransaction {
    pub user_id: UserId,
    pub amount: i64,
    pub kind: CreditTransactionKind,
    pub description: String,
    pub reference_id: Option<String>,
    pub balance_after: Option<i64>,
}

impl NewCreditTransaction {
    /// A grant of `amount` credits.
    pub fn grant(user_id: UserId, amount: i64, description: impl Into<String>) -> Self {
        Self {
            user_id,
            amount,
            kind: CreditTransactionKind::Grant,
            description: description.into(),
            reference_id: None,
            balance_after: None,
        }
    }

    /// A consumption of `amount` credits, stored as a negative amount.
    pub fn consume(user_id: UserId, amount: i64, description: impl Into<String>) -> Self {
        Self {
            user_id,
            amount: -amount.abs(),
            kind: CreditTransactionKind::Consume,
            description: description.into(),
            reference_id: None,
            balance_after: None,
        }
    }

    /// A refund of `amount` previously consumed credits.
    pub fn refund(user_id: UserId, amount: i64, description: impl Into<String>) -> Self {
        Self {
            user_id,
            amount: amount.abs(),
            kind: CreditTransactionKind::Refund,
            description: description.into(),
            reference_id: None,
            balance_after: None,
        }
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_optional_reference(mut self, reference_id: Option<String>) -> Self {
        self.reference_id = reference_id;
        self
    }

    pub fn with_balance_after(mut self, balance_after: i64) -> Self {
        self.balance_after = Some(balance_after);
        self
    }

    /// Materializes the entry with a fresh id and creation time.
    pub fn into_transaction(self) -> CreditTransaction {
        CreditTransaction {
            id: TransactionId::new(),
            user_id: self.user_id,
            amount: self.amount,
            kind: self.kind,
            description: self.description,
            reference_id: self.reference_id,
            balance_after: self.balance_after,
            created_at: Timestamp::now(),
        }
    }
}

/// Pagination and filter for ledger listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionQuery {
    pub limit: u32,
    pub offset: u32,
    pub kind: Option<CreditTransactionKind>,
}

impl TransactionQuery {
    /// Builds a query, clamping `limit` into `1..=MAX_PAGE_SIZE`.
    pub fn new(limit: Option<u32>, offset: Option<u32>, kind: Option<CreditTransactionKind>) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Self {
            limit,
            offset: offset.unwrap_or(0),
            kind,
        }
    }
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}
