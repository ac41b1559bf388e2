//! Best-effort erasure of an account's storage namespace.
//!
//! Storage cleanup is deliberately the softest step of an account erasure:
//! payment retention and identity removal are the compliance-critical parts,
//! so a listing or delete failure here is logged and absorbed, never allowed
//! to abort the account. Leftover objects are harmless until the next run
//! re-lists the namespace and cleans them, which is also why there is no
//! retry inside a single call.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{ObjectStorage, account_namespace};
use crate::models::EraseReport;

pub struct StorageEraser {
    storage: Arc<dyn ObjectStorage>,
    /// Objects deleted concurrently per batch; batches run sequentially to
    /// bound peak concurrent delete load.
    batch_size: usize,
}

impl StorageEraser {
    pub fn new(storage: Arc<dyn ObjectStorage>, batch_size: usize) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
        }
    }

    /// Delete every object under the account's namespace.
    ///
    /// Infallible by design: failures are tallied in the report.
    pub async fn erase_all(&self, account_id: &str) -> EraseReport {
        let prefix = account_namespace(account_id);

        let keys = match self.storage.list_by_prefix(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(
                    account_id,
                    prefix,
                    error = %e,
                    "Failed to list storage objects; skipping storage cleanup"
                );
                return EraseReport {
                    deleted: 0,
                    failed: 1,
                };
            }
        };

        if keys.is_empty() {
            debug!(account_id, "No storage objects to delete");
            return EraseReport::default();
        }

        debug!(account_id, count = keys.len(), "Deleting storage objects");

        let mut report = EraseReport::default();
        for batch in keys.chunks(self.batch_size) {
            let deletes = batch.iter().map(|key| self.storage.delete(key));
            for (key, result) in batch.iter().zip(join_all(deletes).await) {
                match result {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        warn!(account_id, key, error = %e, "Failed to delete storage object");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            account_id,
            deleted = report.deleted,
            failed = report.failed,
            "Storage namespace erased"
        );
        report
    }
}
