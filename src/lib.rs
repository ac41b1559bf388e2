//! Account offboarding worker.
//!
//! Nightly (or on demand), this service finds accounts whose deletion grace
//! period has elapsed, erases their personal data and storage artifacts,
//! tombstones compliance-retained billing records, removes their
//! authentication identity, and appends an immutable audit record.
//!
//! The orchestration engine lives in [`deletion`]; the stores it drives are
//! capability traits ([`store::DocumentStore`], [`storage::ObjectStorage`],
//! [`identity::IdentityProvider`]) with pluggable backends selected by
//! configuration.

pub mod audit;
pub mod authz;
pub mod config;
pub mod deletion;
pub mod identity;
pub mod models;
pub mod observability;
pub mod routes;
pub mod storage;
pub mod store;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    audit::AuditRecorder,
    authz::{AdminVerifier, StaticTokenVerifier},
    config::Config,
    deletion::{AccountDataEraser, DeletionBatchProcessor},
    storage::StorageEraser,
    store::DocumentStore,
};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Failed to initialize document store: {0}")]
    Store(#[from] store::StoreError),
    #[error("Failed to initialize object storage: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Shared application state for the admin API and background worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub eraser: Arc<AccountDataEraser>,
    pub processor: Arc<DeletionBatchProcessor>,
    pub audit: Arc<AuditRecorder>,
    pub authz: Arc<dyn AdminVerifier>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, InitError> {
        let store = store::create_document_store(&config.store).await?;
        let object_storage = storage::create_object_storage(&config.storage).await?;
        let identity = identity::create_identity_provider(&config.identity);

        let eraser = Arc::new(AccountDataEraser::new(
            store.clone(),
            StorageEraser::new(object_storage, config.deletion.storage_batch_size),
            identity,
        ));
        let audit = Arc::new(AuditRecorder::new(store.clone()));
        let processor = Arc::new(DeletionBatchProcessor::new(
            store.clone(),
            eraser.clone(),
            audit.clone(),
            config.deletion.dry_run,
        ));
        let authz = StaticTokenVerifier::from_config(&config.auth);

        info!(
            store = store.backend_name(),
            dry_run = config.deletion.dry_run,
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            eraser,
            processor,
            audit,
            authz,
        })
    }
}
