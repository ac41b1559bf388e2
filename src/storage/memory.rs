//! In-process object storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ObjectStorage, StorageResult};

#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly. Test setup helper.
    pub fn put(&self, key: &str, content: Vec<u8>) {
        self.objects.write().insert(key.to_string(), content);
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_by_prefix_scopes_to_namespace() {
        let storage = MemoryObjectStorage::new();
        storage.put("accounts/u1/a.png", vec![1]);
        storage.put("accounts/u1/b.png", vec![2]);
        storage.put("accounts/u10/c.png", vec![3]);
        storage.put("accounts/u2/d.png", vec![4]);

        let keys = storage.list_by_prefix("accounts/u1/").await.unwrap();
        assert_eq!(keys, vec!["accounts/u1/a.png", "accounts/u1/b.png"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = MemoryObjectStorage::new();
        storage.put("accounts/u1/a.png", vec![1]);
        storage.delete("accounts/u1/a.png").await.unwrap();
        storage.delete("accounts/u1/a.png").await.unwrap();
        assert!(storage.is_empty());
    }
}
