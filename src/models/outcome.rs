use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one account's storage cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraseReport {
    /// Objects successfully deleted.
    pub deleted: u64,
    /// Objects that failed to delete. Leftovers are harmless until the next
    /// run cleans them, so failures never escalate beyond this count.
    pub failed: u64,
}

impl EraseReport {
    pub fn is_degraded(&self) -> bool {
        self.failed > 0
    }
}

/// Outcome of the identity-record removal step.
///
/// Degradation is an explicit variant rather than a swallowed error so tests
/// can assert on it deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IdentityRemoval {
    Removed,
    /// The identity provider reported the record missing; treated as success
    /// since a retry of an earlier erasure lands here.
    AlreadyAbsent,
    /// Removal failed. The account's data is already gone, so this is a
    /// logged warning, not a failed outcome.
    Degraded { reason: String },
}

/// Terminal status of one account's erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Per-account record inside a batch summary or manual audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub deleted_at: DateTime<Utc>,
    pub status: OutcomeStatus,
    /// The account's recorded deletion reason, when one was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error message for failed outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub storage: EraseReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityRemoval>,
}

impl DeletionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Aggregated result of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_date: DateTime<Utc>,
    pub processed_count: u64,
    pub deletions: Vec<DeletionOutcome>,
}

impl BatchSummary {
    pub fn empty(batch_date: DateTime<Utc>) -> Self {
        Self {
            batch_date,
            processed_count: 0,
            deletions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
    }

    pub fn succeeded(&self) -> u64 {
        self.deletions.iter().filter(|o| o.is_success()).count() as u64
    }

    pub fn failed(&self) -> u64 {
        self.deletions.iter().filter(|o| !o.is_success()).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: OutcomeStatus) -> DeletionOutcome {
        DeletionOutcome {
            account_id: "u1".to_string(),
            email: None,
            deleted_at: Utc::now(),
            status,
            reason: None,
            error: None,
            storage: EraseReport::default(),
            identity: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = BatchSummary {
            batch_date: Utc::now(),
            processed_count: 3,
            deletions: vec![
                outcome(OutcomeStatus::Success),
                outcome(OutcomeStatus::Failed),
                outcome(OutcomeStatus::Success),
            ],
        };
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.is_empty());
        assert!(BatchSummary::empty(Utc::now()).is_empty());
    }

    #[test]
    fn test_erase_report_degraded() {
        assert!(!EraseReport::default().is_degraded());
        assert!(
            EraseReport {
                deleted: 10,
                failed: 1
            }
            .is_degraded()
        );
    }

    #[test]
    fn test_identity_removal_serialization() {
        let degraded = IdentityRemoval::Degraded {
            reason: "provider timeout".to_string(),
        };
        let value = serde_json::to_value(&degraded).unwrap();
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["reason"], "provider timeout");
    }
}
