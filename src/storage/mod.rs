//! Pluggable object storage for per-account blobs.
//!
//! This module provides a trait-based abstraction over blob storage,
//! allowing account artifacts to live in different backends:
//!
//! - **Memory**: In-process store (default, used for tests and local runs)
//! - **Filesystem**: Objects as files under a base directory
//! - **S3**: S3-compatible object storage (feature `s3-storage`)
//!
//! The deletion engine only needs two operations: list keys under an
//! account's namespace prefix, and delete one object.

pub mod eraser;
pub mod filesystem;
pub mod memory;
#[cfg(feature = "s3-storage")]
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
pub use eraser::StorageEraser;
pub use filesystem::FilesystemObjectStorage;
pub use memory::MemoryObjectStorage;
#[cfg(feature = "s3-storage")]
pub use s3::S3ObjectStorage;
use thiserror::Error;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};

/// Errors from object storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Namespace prefix under which all of an account's objects live.
pub fn account_namespace(account_id: &str) -> String {
    format!("accounts/{account_id}/")
}

/// Trait for pluggable object storage backends.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// List every object key starting with the given prefix.
    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete one object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Create an object storage backend from configuration.
pub async fn create_object_storage(
    config: &StorageConfig,
) -> StorageResult<Arc<dyn ObjectStorage>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory object storage backend");
            Ok(Arc::new(MemoryObjectStorage::new()))
        }
        StorageBackend::Filesystem => {
            let fs_config = config.filesystem.clone().ok_or_else(|| {
                StorageError::Config(
                    "Filesystem backend requires [storage.filesystem] config".to_string(),
                )
            })?;
            info!(path = %fs_config.path, "Using filesystem object storage backend");
            Ok(Arc::new(FilesystemObjectStorage::new(fs_config)?))
        }
        #[cfg(feature = "s3-storage")]
        StorageBackend::S3 => {
            let s3_config = config.s3.clone().ok_or_else(|| {
                StorageError::Config("S3 backend requires [storage.s3] config".to_string())
            })?;
            info!(bucket = %s3_config.bucket, "Using S3 object storage backend");
            Ok(Arc::new(S3ObjectStorage::new(s3_config).await?))
        }
        #[cfg(not(feature = "s3-storage"))]
        StorageBackend::S3 => Err(StorageError::Config(
            "S3 object storage requires the 's3-storage' feature. \
             Rebuild with: cargo build --features s3-storage"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_namespace() {
        assert_eq!(account_namespace("u1"), "accounts/u1/");
    }
}
