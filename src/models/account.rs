use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    /// Flagged for deletion by the account-closure flow; waiting out the
    /// grace period.
    PendingDeletion,
    /// Claimed by an erasure in progress. Transient: the claiming run either
    /// deletes the profile document or releases the claim on failure.
    Deleting,
    Deleted,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::PendingDeletion => write!(f, "pending_deletion"),
            AccountStatus::Deleting => write!(f, "deleting"),
            AccountStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// An account profile document.
///
/// Owned by the identity/profile store. The closure flow (external) sets
/// `status` and `deletion_scheduled_for`; the deletion engine only ever reads
/// these fields and finally deletes the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: Option<String>,
    pub status: AccountStatus,
    /// When the grace period elapses. Absent means not yet scheduled; the
    /// account is skipped, not erased.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_scheduled_for: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_reason: Option<String>,
    /// Remaining profile fields, carried opaquely.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}
