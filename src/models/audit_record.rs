use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BatchSummary, DeletionOutcome};

/// An immutable entry in the deletion audit trail.
///
/// Append-only: nothing in this system updates or deletes these records.
/// Both forms carry `batch_date` so a single time-filtered query covers the
/// scheduled and manual paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditRecord {
    /// Summary of one scheduled batch run.
    Scheduled {
        id: Uuid,
        batch_date: DateTime<Utc>,
        processed_count: u64,
        deletions: Vec<DeletionOutcome>,
        created_at: DateTime<Utc>,
    },
    /// A single administrator-triggered deletion.
    Manual {
        id: Uuid,
        batch_date: DateTime<Utc>,
        account_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        deleted_at: DateTime<Utc>,
        deleted_by: String,
        reason: String,
    },
}

impl AuditRecord {
    pub fn from_batch(summary: &BatchSummary, created_at: DateTime<Utc>) -> Self {
        AuditRecord::Scheduled {
            id: Uuid::new_v4(),
            batch_date: summary.batch_date,
            processed_count: summary.processed_count,
            deletions: summary.deletions.clone(),
            created_at,
        }
    }

    pub fn from_manual(outcome: &DeletionOutcome, operator: &str, reason: &str) -> Self {
        AuditRecord::Manual {
            id: Uuid::new_v4(),
            batch_date: outcome.deleted_at,
            account_id: outcome.account_id.clone(),
            email: outcome.email.clone(),
            deleted_at: outcome.deleted_at,
            deleted_by: operator.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            AuditRecord::Scheduled { id, .. } | AuditRecord::Manual { id, .. } => *id,
        }
    }

    pub fn batch_date(&self) -> DateTime<Utc> {
        match self {
            AuditRecord::Scheduled { batch_date, .. }
            | AuditRecord::Manual { batch_date, .. } => *batch_date,
        }
    }
}

/// Time-bounded read of the audit trail.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Inclusive start of the `batch_date` range.
    pub start_date: Option<NaiveDate>,
    /// Inclusive end of the `batch_date` range.
    pub end_date: Option<NaiveDate>,
    /// Maximum records returned. Defaults to 50.
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    /// Lower bound as an instant: midnight at the start of `start_date`.
    pub fn start_bound(&self) -> Option<DateTime<Utc>> {
        self.start_date
            .map(|d| d.and_hms_opt(0, 0, 0).expect("valid midnight").and_utc())
    }

    /// Upper bound as an instant: the last representable moment of
    /// `end_date`, keeping the range inclusive.
    pub fn end_bound(&self) -> Option<DateTime<Utc>> {
        self.end_date.map(|d| {
            d.and_hms_micro_opt(23, 59, 59, 999_999)
                .expect("valid end of day")
                .and_utc()
        })
    }
}
