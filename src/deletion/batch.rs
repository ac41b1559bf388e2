//! One pass of the scheduled deletion run.
//!
//! The processor scans for accounts pending deletion, filters them through
//! the retention policy, erases each eligible account in sequence, and hands
//! the aggregated summary to the audit recorder. Account failures are
//! isolated: one bad account becomes a failed outcome, the rest of the batch
//! proceeds. Only two things abort a run: the initial account scan and the
//! final audit append.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use super::{
    eraser::AccountDataEraser,
    policy::{ACCOUNTS_COLLECTION, RetentionPolicy},
};
use crate::{
    audit::AuditRecorder,
    models::{Account, AccountStatus, BatchSummary, DeletionOutcome, OutcomeStatus},
    store::{Document, DocumentStore, Filter, StoreError},
};

#[derive(Debug, Error)]
pub enum RunError {
    /// The eligibility scan itself failed. Nothing was erased and no audit
    /// record was written.
    #[error("Failed to query accounts pending deletion: {0}")]
    Scan(#[source] StoreError),
    /// Accounts were erased but the audit append failed.
    #[error("Failed to record the batch audit entry: {0}")]
    Audit(#[source] StoreError),
}

pub struct DeletionBatchProcessor {
    store: Arc<dyn DocumentStore>,
    eraser: Arc<AccountDataEraser>,
    audit: Arc<AuditRecorder>,
    policy: RetentionPolicy,
    /// Log what would be erased, write nothing.
    dry_run: bool,
}

impl DeletionBatchProcessor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        eraser: Arc<AccountDataEraser>,
        audit: Arc<AuditRecorder>,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            eraser,
            audit,
            policy: RetentionPolicy::new(),
            dry_run,
        }
    }

    /// Run one batch pass at the given instant.
    ///
    /// An empty eligible set returns an empty summary and writes no audit
    /// record, so idle nights leave no trace in the trail.
    pub async fn run_batch(&self, now: DateTime<Utc>) -> Result<BatchSummary, RunError> {
        let docs = self
            .store
            .query(
                ACCOUNTS_COLLECTION,
                Filter::new().field_eq("status", AccountStatus::PendingDeletion.to_string()),
            )
            .await
            .map_err(RunError::Scan)?;

        info!(pending = docs.len(), "Scanned accounts pending deletion");

        let mut summary = BatchSummary::empty(now);
        let mut eligible = Vec::new();
        for doc in docs {
            match doc.parse::<Account>() {
                Ok(account) if self.policy.is_eligible(&account, now) => eligible.push(account),
                Ok(account) => {
                    info!(
                        account_id = %account.id,
                        scheduled_for = ?account.deletion_scheduled_for,
                        "Skipping account, grace period not elapsed"
                    );
                }
                Err(e) => {
                    warn!(account_id = %doc.id, error = %e, "Malformed account document");
                    summary.deletions.push(malformed_outcome(&doc, now, &e));
                }
            }
        }

        if self.dry_run {
            for account in &eligible {
                info!(account_id = %account.id, "Dry run: would erase account");
            }
            info!(eligible = eligible.len(), "Dry run complete, nothing written");
            return Ok(BatchSummary::empty(now));
        }

        for account in eligible {
            summary.deletions.push(self.erase_one(&account, now).await);
        }
        summary.processed_count = summary.deletions.len() as u64;

        if summary.is_empty() {
            info!("No accounts eligible for deletion");
            return Ok(summary);
        }

        self.audit
            .record_batch(&summary)
            .await
            .map_err(RunError::Audit)?;

        info!(
            processed = summary.processed_count,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Deletion batch complete"
        );
        Ok(summary)
    }

    async fn erase_one(&self, account: &Account, now: DateTime<Utc>) -> DeletionOutcome {
        match self.eraser.erase(account, now).await {
            Ok(erased) => DeletionOutcome {
                account_id: account.id.clone(),
                email: account.email.clone(),
                deleted_at: now,
                status: OutcomeStatus::Success,
                reason: account.deletion_reason.clone(),
                error: None,
                storage: erased.storage,
                identity: Some(erased.identity),
            },
            Err(e) => {
                error!(account_id = %account.id, error = %e, "Account erasure failed");
                DeletionOutcome {
                    account_id: account.id.clone(),
                    email: account.email.clone(),
                    deleted_at: now,
                    status: OutcomeStatus::Failed,
                    reason: account.deletion_reason.clone(),
                    error: Some(e.to_string()),
                    storage: Default::default(),
                    identity: None,
                }
            }
        }
    }
}

fn malformed_outcome(doc: &Document, now: DateTime<Utc>, error: &StoreError) -> DeletionOutcome {
    DeletionOutcome {
        account_id: doc.id.clone(),
        email: None,
        deleted_at: now,
        status: OutcomeStatus::Failed,
        reason: None,
        error: Some(format!("Malformed account document: {error}")),
        storage: Default::default(),
        identity: None,
    }
}
