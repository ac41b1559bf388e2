//! Identity provider capability consumed by the deletion engine.
//!
//! The engine only needs one operation: remove the authentication record for
//! an account id. A real deployment implements [`IdentityProvider`] against
//! its IdP; the built-in memory backend keeps tests and local runs
//! self-contained.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::config::IdentityConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider error: {0}")]
    Provider(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Result of an identity deletion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityDeletion {
    Deleted,
    /// No record existed. The deletion path treats this as success, since a
    /// retried erasure lands here.
    NotFound,
}

/// Trait for pluggable identity provider backends.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Delete the authentication record for an account.
    async fn delete_identity(&self, account_id: &str) -> IdentityResult<IdentityDeletion>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// In-process identity provider backend.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    identities: RwLock<HashSet<String>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity. Test setup helper.
    pub fn register(&self, account_id: &str) {
        self.identities.write().insert(account_id.to_string());
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.identities.read().contains(account_id)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn delete_identity(&self, account_id: &str) -> IdentityResult<IdentityDeletion> {
        if self.identities.write().remove(account_id) {
            Ok(IdentityDeletion::Deleted)
        } else {
            Ok(IdentityDeletion::NotFound)
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Create an identity provider backend from configuration.
pub fn create_identity_provider(config: &IdentityConfig) -> Arc<dyn IdentityProvider> {
    match config.backend {
        crate::config::IdentityBackend::Memory => {
            info!("Using in-memory identity provider backend");
            Arc::new(MemoryIdentityProvider::new())
        }
    }
}
