//! Append-only audit trail for deletion runs.
//!
//! Every batch run that touched at least one account, and every manual
//! deletion, appends exactly one record to the `deletion_audit_log`
//! collection. Records are immutable: no update or delete operation exists
//! here, and nothing else in the system writes to that collection.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::{
    models::{AuditQuery, AuditRecord, BatchSummary, DeletionOutcome},
    store::{DocumentStore, Filter, StoreError, StoreResult, WriteOp},
};

/// Collection holding the audit trail.
pub const AUDIT_COLLECTION: &str = "deletion_audit_log";

pub struct AuditRecorder {
    store: Arc<dyn DocumentStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append the summary of one batch run.
    pub async fn record_batch(&self, summary: &BatchSummary) -> StoreResult<AuditRecord> {
        let record = AuditRecord::from_batch(summary, Utc::now());
        self.append(&record).await?;
        info!(
            record_id = %record.id(),
            processed = summary.processed_count,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "Recorded batch deletion audit entry"
        );
        Ok(record)
    }

    /// Append one administrator-triggered deletion.
    pub async fn record_manual(
        &self,
        outcome: &DeletionOutcome,
        operator: &str,
    ) -> StoreResult<AuditRecord> {
        let record =
            AuditRecord::from_manual(outcome, operator, "Manual deletion by administrator");
        self.append(&record).await?;
        info!(
            record_id = %record.id(),
            account_id = %outcome.account_id,
            operator,
            "Recorded manual deletion audit entry"
        );
        Ok(record)
    }

    /// Read the trail, newest first, bounded by the query's limit and
    /// inclusive date range on `batch_date`.
    pub async fn query(&self, query: &AuditQuery) -> StoreResult<Vec<AuditRecord>> {
        let mut filter = Filter::new()
            .order_desc("batch_date")
            .limit(query.effective_limit());

        let min = query.start_bound().map(|t| serde_json::to_value(t)).transpose()?;
        let max = query.end_bound().map(|t| serde_json::to_value(t)).transpose()?;
        if min.is_some() || max.is_some() {
            filter = filter.range("batch_date", min, max);
        }

        let docs = self.store.query(AUDIT_COLLECTION, filter).await?;
        docs.iter().map(|doc| doc.parse()).collect()
    }

    async fn append(&self, record: &AuditRecord) -> StoreResult<()> {
        let data = match serde_json::to_value(record)? {
            Value::Object(map) => map,
            _ => {
                return Err(StoreError::Internal(
                    "Audit record did not serialize to an object".to_string(),
                ));
            }
        };
        self.store
            .atomic_write(vec![WriteOp::insert(
                AUDIT_COLLECTION,
                &record.id().to_string(),
                data,
            )])
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::{
        models::{EraseReport, OutcomeStatus},
        store::MemoryDocumentStore,
    };

    fn recorder_with_store() -> (AuditRecorder, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        (AuditRecorder::new(store.clone()), store)
    }

    fn summary_on(date: &str) -> BatchSummary {
        BatchSummary {
            batch_date: date.parse().unwrap(),
            processed_count: 1,
            deletions: vec![DeletionOutcome {
                account_id: "u1".to_string(),
                email: None,
                deleted_at: date.parse().unwrap(),
                status: OutcomeStatus::Success,
                reason: None,
                error: None,
                storage: EraseReport::default(),
                identity: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_record_and_query_newest_first() {
        let (recorder, _store) = recorder_with_store();
        recorder
            .record_batch(&summary_on("2025-01-05T02:00:00Z"))
            .await
            .unwrap();
        recorder
            .record_batch(&summary_on("2025-01-20T02:00:00Z"))
            .await
            .unwrap();
        recorder
            .record_batch(&summary_on("2025-01-10T02:00:00Z"))
            .await
            .unwrap();

        let records = recorder.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(records.len(), 3);
        let dates: Vec<_> = records.iter().map(|r| r.batch_date()).collect();
        assert!(dates[0] > dates[1] && dates[1] > dates[2]);
    }

    #[tokio::test]
    async fn test_query_date_range_and_limit() {
        let (recorder, _store) = recorder_with_store();
        for day in [1, 10, 20, 31] {
            let date = Utc.with_ymd_and_hms(2025, 1, day, 2, 0, 0).unwrap();
            recorder
                .record_batch(&summary_on(&date.to_rfc3339()))
                .await
                .unwrap();
        }
        // Outside the range on both sides.
        recorder
            .record_batch(&summary_on("2024-12-31T02:00:00Z"))
            .await
            .unwrap();
        recorder
            .record_batch(&summary_on("2025-02-01T02:00:00Z"))
            .await
            .unwrap();

        let query = AuditQuery {
            start_date: Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
            end_date: Some(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()),
            limit: Some(10),
        };
        let records = recorder.query(&query).await.unwrap();
        assert_eq!(records.len(), 4);
        for record in &records {
            let date = record.batch_date();
            assert!(date >= query.start_bound().unwrap());
            assert!(date <= query.end_bound().unwrap());
        }

        let limited = recorder
            .query(&AuditQuery {
                limit: Some(2),
                ..query
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        // Newest in range first.
        assert_eq!(
            limited[0].batch_date(),
            Utc.with_ymd_and_hms(2025, 1, 31, 2, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_manual_records_share_the_trail() {
        let (recorder, store) = recorder_with_store();
        let outcome = DeletionOutcome {
            account_id: "u1".to_string(),
            email: Some("u1@example.com".to_string()),
            deleted_at: Utc::now(),
            status: OutcomeStatus::Success,
            reason: None,
            error: None,
            storage: EraseReport::default(),
            identity: None,
        };
        recorder.record_manual(&outcome, "admin-1").await.unwrap();

        assert_eq!(store.count(AUDIT_COLLECTION), 1);
        let records = recorder.query(&AuditQuery::default()).await.unwrap();
        match &records[0] {
            AuditRecord::Manual {
                deleted_by,
                account_id,
                ..
            } => {
                assert_eq!(deleted_by, "admin-1");
                assert_eq!(account_id, "u1");
            }
            other => panic!("expected manual record, got {other:?}"),
        }
    }
}
