//! Filesystem object storage backend.
//!
//! Object keys map to paths beneath the configured base directory, so an
//! account namespace like `accounts/u1/` is simply a subdirectory tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ObjectStorage, StorageError, StorageResult};
use crate::config::FilesystemStorageConfig;

pub struct FilesystemObjectStorage {
    config: FilesystemStorageConfig,
}

impl FilesystemObjectStorage {
    pub fn new(config: FilesystemStorageConfig) -> StorageResult<Self> {
        let storage = Self { config };

        if storage.config.create_dir {
            let path = Path::new(&storage.config.path);
            if !path.exists() {
                info!(path = %storage.config.path, "Creating object storage directory");
                std::fs::create_dir_all(path)?;
            }
        }

        Ok(storage)
    }

    fn object_path(&self, key: &str) -> PathBuf {
        Path::new(&self.config.path).join(key)
    }

    /// Key (relative path with `/` separators) for a file under the base dir.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.config.path).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStorage for FilesystemObjectStorage {
    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        // The namespace prefix always ends at a directory boundary, so the
        // walk can start from the prefix directory instead of the base.
        let start = self.object_path(prefix.trim_end_matches('/'));
        if tokio::fs::metadata(&start).await.is_err() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_for(&path)
                    && key.starts_with(prefix)
                {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key);
        debug!(path = %path.display(), "Deleting object from filesystem");

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Object not found during deletion");
                Ok(())
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
