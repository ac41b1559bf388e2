//! Retention policy: which accounts are eligible, which collections survive.
//!
//! Pure decision logic, no I/O.

use chrono::{DateTime, Utc};

use crate::models::{Account, AccountStatus};

/// Collection holding account profile documents.
pub const ACCOUNTS_COLLECTION: &str = "accounts";

/// Collections fully deleted on account erasure.
pub const ERASABLE_COLLECTIONS: &[&str] =
    &["generations", "brand_voices", "favorites", "sessions"];

/// Collections preserved for tax/legal compliance. Their documents are
/// tombstoned, never deleted.
///
/// Retention is an explicit allow-list: an unknown collection is erased,
/// never silently retained, so new PII collections default to deletion.
pub const RETAINED_COLLECTIONS: &[&str] = &["payments", "billing_history"];

/// How a collection is treated on account erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionClass {
    Erase,
    Retain,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionPolicy;

impl RetentionPolicy {
    pub fn new() -> Self {
        Self
    }

    /// True iff the account's deletion grace period has elapsed.
    ///
    /// An absent or future `deletion_scheduled_for` means the account is
    /// skipped, not an error: closure flows set the schedule, and a
    /// pending account without one is waiting on that flow.
    pub fn is_eligible(&self, account: &Account, now: DateTime<Utc>) -> bool {
        account.status == AccountStatus::PendingDeletion
            && account
                .deletion_scheduled_for
                .is_some_and(|scheduled| scheduled <= now)
    }

    pub fn classify(&self, collection: &str) -> CollectionClass {
        if RETAINED_COLLECTIONS.contains(&collection) {
            CollectionClass::Retain
        } else {
            CollectionClass::Erase
        }
    }
}
