//! In-process document store backend.
//!
//! Backs tests and local runs. All writes inside [`atomic_write`] are applied
//! under a single write lock, which gives the same all-or-nothing guarantee
//! the SQLite backend gets from a transaction.
//!
//! [`atomic_write`]: DocumentStore::atomic_write

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{Document, DocumentStore, Fields, Filter, StoreResult, WriteOp};

type Collection = BTreeMap<String, Fields>;

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing the write API. Test setup helper.
    pub fn seed(&self, collection: &str, id: &str, data: Fields) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Number of documents currently in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn query(&self, collection: &str, filter: Filter) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let docs = collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, data)| filter.matches(data))
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(filter.sort_and_truncate(docs))
    }

    async fn atomic_write(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let mut collections = self.collections.write();
        for op in ops {
            match op {
                WriteOp::Insert {
                    collection,
                    id,
                    data,
                } => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    if let Some(data) = collections
                        .get_mut(&collection)
                        .and_then(|c| c.get_mut(&id))
                    {
                        for (key, value) in fields {
                            data.insert(key, value);
                        }
                    }
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(c) = collections.get_mut(&collection) {
                        c.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: Value,
        new: Value,
    ) -> StoreResult<bool> {
        let mut collections = self.collections.write();
        let Some(data) = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
        else {
            return Ok(false);
        };
        if data.get(field) != Some(&expected) {
            return Ok(false);
        }
        data.insert(field.to_string(), new);
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
