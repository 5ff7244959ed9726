//! Identity-provider profile and the user-owned tables it anchors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::UserId;

/// Profile as reported by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUserProfile {
    pub id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

impl AuthUserProfile {
    /// Normalised email for duplicate detection (trimmed, lowercase).
    pub fn lookup_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
    }
}

/// Tables whose rows hang off `user_id` and follow a user through
/// merges and identity migrations, in re-key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnedTable {
    UploadedModels,
    UploadedLocations,
    CreditTransactions,
}

impl OwnedTable {
    pub const ALL: [OwnedTable; 3] = [
        OwnedTable::UploadedModels,
        OwnedTable::UploadedLocations,
        OwnedTable::CreditTransactions,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            OwnedTable::UploadedModels => "uploaded_models",
            OwnedTable::UploadedLocations => "uploaded_locations",
            OwnedTable::CreditTransactions => "credit_transactions",
        }
    }
}

impl fmt::Display for OwnedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}
