//! Per-account erasure: the atomic unit of work of a deletion run.
//!
//! One call to [`AccountDataEraser::erase`] takes an account from
//! `pending_deletion` to fully erased:
//!
//! 1. claim the account by compare-and-swap on its status, so two concurrent
//!    runs cannot erase the same id
//! 2. collect every owned document and commit one atomic operation list:
//!    delete erasable documents, tombstone retained ones, delete the profile
//! 3. clean the storage namespace (best effort)
//! 4. remove the identity record (best effort)
//!
//! Only step 2 can fail the account. A commit failure releases the claim so
//! the next run picks the account up again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::policy::{
    ACCOUNTS_COLLECTION, CollectionClass, ERASABLE_COLLECTIONS, RETAINED_COLLECTIONS,
    RetentionPolicy,
};
use crate::{
    identity::{IdentityDeletion, IdentityProvider},
    models::{Account, AccountStatus, EraseReport, IdentityRemoval},
    storage::StorageEraser,
    store::{DocumentStore, Fields, Filter, StoreError, WriteOp},
};

#[derive(Debug, Error)]
pub enum EraseError {
    #[error("Account not found: {0}")]
    NotFound(String),
    #[error("Account {0} is already being erased")]
    InProgress(String),
    /// The atomic commit failed. Nothing was partially applied and the
    /// status claim has been released.
    #[error("Failed to commit erasure: {0}")]
    CommitFailed(#[source] StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one successful erasure did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErasedAccount {
    pub docs_deleted: u64,
    pub docs_tombstoned: u64,
    pub storage: EraseReport,
    pub identity: IdentityRemoval,
}

pub struct AccountDataEraser {
    store: Arc<dyn DocumentStore>,
    storage: StorageEraser,
    identity: Arc<dyn IdentityProvider>,
    policy: RetentionPolicy,
}

impl AccountDataEraser {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: StorageEraser,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            storage,
            identity,
            policy: RetentionPolicy::new(),
        }
    }

    /// Fetch an account by id and erase it. Used by the manual admin path,
    /// which starts from an id rather than a scanned document.
    pub async fn erase_by_id(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ErasedAccount, EraseError> {
        let doc = self
            .store
            .get(ACCOUNTS_COLLECTION, account_id)
            .await?
            .ok_or_else(|| EraseError::NotFound(account_id.to_string()))?;
        let account: Account = doc.parse()?;
        self.erase(&account, now).await
    }

    /// Erase one account's data, storage, and identity.
    pub async fn erase(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<ErasedAccount, EraseError> {
        self.claim(account).await?;

        let ops = match self.collect_ops(&account.id, now).await {
            Ok(ops) => ops,
            Err(e) => {
                self.release_claim(account).await;
                return Err(e);
            }
        };
        let docs_deleted = ops
            .iter()
            .filter(|op| matches!(op, WriteOp::Delete { .. }))
            .count() as u64;
        let docs_tombstoned = ops.len() as u64 - docs_deleted;

        if let Err(e) = self.store.atomic_write(ops).await {
            self.release_claim(account).await;
            return Err(EraseError::CommitFailed(e));
        }

        // The documents are gone; everything past this point degrades
        // instead of failing the account.
        let storage = self.storage.erase_all(&account.id).await;
        let identity = self.remove_identity(&account.id).await;

        info!(
            account_id = %account.id,
            docs_deleted,
            docs_tombstoned,
            storage_deleted = storage.deleted,
            storage_failed = storage.failed,
            identity = ?identity,
            "Account erased"
        );

        Ok(ErasedAccount {
            docs_deleted,
            docs_tombstoned,
            storage,
            identity,
        })
    }

    /// Claim the account by swapping its observed status to `deleting`.
    async fn claim(&self, account: &Account) -> Result<(), EraseError> {
        if account.status == AccountStatus::Deleting {
            return Err(EraseError::InProgress(account.id.clone()));
        }
        let claimed = self
            .store
            .compare_and_swap(
                ACCOUNTS_COLLECTION,
                &account.id,
                "status",
                serde_json::to_value(account.status).map_err(StoreError::from)?,
                serde_json::to_value(AccountStatus::Deleting).map_err(StoreError::from)?,
            )
            .await?;
        if !claimed {
            return Err(EraseError::InProgress(account.id.clone()));
        }
        Ok(())
    }

    /// Best-effort rollback of the status claim after a failed commit.
    async fn release_claim(&self, account: &Account) {
        let original = match serde_json::to_value(account.status) {
            Ok(v) => v,
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "Failed to encode status for claim release");
                return;
            }
        };
        let released = self
            .store
            .compare_and_swap(
                ACCOUNTS_COLLECTION,
                &account.id,
                "status",
                json!(AccountStatus::Deleting.to_string()),
                original,
            )
            .await;
        match released {
            Ok(true) => {}
            Ok(false) => {
                warn!(account_id = %account.id, "Claim release found an unexpected status");
            }
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "Failed to release erasure claim");
            }
        }
    }

    /// Build the full operation list for one account: deletes for erasable
    /// collections, tombstone merges for retained ones, and finally the
    /// profile document itself.
    async fn collect_ops(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<WriteOp>, EraseError> {
        let tombstone = self.tombstone_fields(now)?;
        let mut ops = Vec::new();

        for collection in ERASABLE_COLLECTIONS.iter().chain(RETAINED_COLLECTIONS) {
            let docs = self
                .store
                .query(collection, Filter::new().field_eq("account_id", account_id))
                .await?;
            for doc in docs {
                match self.policy.classify(collection) {
                    CollectionClass::Erase => ops.push(WriteOp::delete(collection, &doc.id)),
                    CollectionClass::Retain => {
                        ops.push(WriteOp::update(collection, &doc.id, tombstone.clone()))
                    }
                }
            }
        }

        ops.push(WriteOp::delete(ACCOUNTS_COLLECTION, account_id));
        Ok(ops)
    }

    fn tombstone_fields(&self, now: DateTime<Utc>) -> Result<Fields, EraseError> {
        let mut fields = Fields::new();
        fields.insert("account_deleted".to_string(), json!(true));
        fields.insert(
            "account_deleted_at".to_string(),
            serde_json::to_value(now).map_err(StoreError::from)?,
        );
        Ok(fields)
    }

    async fn remove_identity(&self, account_id: &str) -> IdentityRemoval {
        match self.identity.delete_identity(account_id).await {
            Ok(IdentityDeletion::Deleted) => IdentityRemoval::Removed,
            Ok(IdentityDeletion::NotFound) => IdentityRemoval::AlreadyAbsent,
            Err(e) => {
                warn!(
                    account_id,
                    error = %e,
                    "Identity removal failed; account data is already erased"
                );
                IdentityRemoval::Degraded {
                    reason: e.to_string(),
                }
            }
        }
    }
}
