//! Pluggable document store consumed by the deletion engine.
//!
//! This module provides a trait-based abstraction over a schemaless document
//! database, allowing records to live in different backends:
//!
//! - **Memory**: In-process store (default, used for tests and local runs)
//! - **Sqlite**: SQLite-backed store via sqlx (feature `database-sqlite`)
//!
//! The trait surface is deliberately narrow: the deletion engine only needs
//! equality/range queries, point reads, an atomic multi-document write, and a
//! compare-and-swap used to claim an account before erasing it.

mod error;
pub mod memory;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

use std::{cmp::Ordering, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryDocumentStore;
use serde_json::{Map, Value};
#[cfg(feature = "database-sqlite")]
pub use sqlite::SqliteDocumentStore;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

/// Field map of a document body.
pub type Fields = Map<String, Value>;

/// A document read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Deserialize the document body into a typed model.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// One intended mutation inside an atomic write.
///
/// The deletion engine accumulates the full per-account operation list up
/// front and hands it to [`DocumentStore::atomic_write`] by ownership, making
/// the transaction boundary explicit.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace a whole document.
    Insert {
        collection: String,
        id: String,
        data: Fields,
    },
    /// Merge the given fields into an existing document. A missing target is
    /// a no-op, which keeps tombstone stamping idempotent under retry.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Delete a document if it exists.
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn insert(collection: &str, id: &str, data: Fields) -> Self {
        WriteOp::Insert {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        }
    }

    pub fn update(collection: &str, id: &str, fields: Fields) -> Self {
        WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Inclusive range constraint on a single field.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    pub field: String,
    pub min: Option<Value>,
    pub max: Option<Value>,
}

/// Query filter: field equality, one inclusive range, descending order, limit.
///
/// This is the Firestore-style subset the deletion engine and audit reader
/// actually use.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub equals: Vec<(String, Value)>,
    pub range: Option<RangeFilter>,
    pub order_desc: Option<String>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.equals.push((field.to_string(), value.into()));
        self
    }

    /// Constrain `field` to `min <= field <= max` (both bounds optional).
    pub fn range(mut self, field: &str, min: Option<Value>, max: Option<Value>) -> Self {
        self.range = Some(RangeFilter {
            field: field.to_string(),
            min,
            max,
        });
        self
    }

    pub fn order_desc(mut self, field: &str) -> Self {
        self.order_desc = Some(field.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a document body against the equality and range constraints.
    pub fn matches(&self, data: &Fields) -> bool {
        for (field, expected) in &self.equals {
            if data.get(field) != Some(expected) {
                return false;
            }
        }
        if let Some(range) = &self.range {
            let Some(actual) = data.get(&range.field) else {
                return false;
            };
            if let Some(min) = &range.min
                && compare_values(actual, min) == Ordering::Less
            {
                return false;
            }
            if let Some(max) = &range.max
                && compare_values(actual, max) == Ordering::Greater
            {
                return false;
            }
        }
        true
    }

    /// Apply ordering and limit to an already-filtered result set.
    pub fn sort_and_truncate(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if let Some(field) = &self.order_desc {
            docs.sort_by(|a, b| {
                let av = a.data.get(field).unwrap_or(&Value::Null);
                let bv = b.data.get(field).unwrap_or(&Value::Null);
                compare_values(bv, av)
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Compare two JSON values for filtering and ordering.
///
/// Numbers compare numerically; strings that both parse as RFC 3339
/// timestamps compare as instants (serde-serialized `DateTime<Utc>` fields
/// land here); everything else falls back to the string form.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        if let (Ok(dx), Ok(dy)) = (
            x.parse::<DateTime<Utc>>(),
            y.parse::<DateTime<Utc>>(),
        ) {
            return dx.cmp(&dy);
        }
        return x.cmp(y);
    }
    a.to_string().cmp(&b.to_string())
}

/// Trait for pluggable document store backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document by collection and id.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Query a collection. Results satisfy every filter constraint and honor
    /// its ordering and limit.
    async fn query(&self, collection: &str, filter: Filter) -> StoreResult<Vec<Document>>;

    /// Commit every operation atomically: either all land or none do.
    async fn atomic_write(&self, ops: Vec<WriteOp>) -> StoreResult<()>;

    /// Set `field` to `new` iff it currently equals `expected`.
    ///
    /// Returns false (without writing) when the document is missing or the
    /// current value differs. Used to claim an account so two concurrent
    /// erasures of the same id cannot interleave.
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: Value,
        new: Value,
    ) -> StoreResult<bool>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Create a document store backend from configuration.
pub async fn create_document_store(config: &StoreConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory document store backend");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        #[cfg(feature = "database-sqlite")]
        StoreBackend::Sqlite => {
            let sqlite = config.sqlite.clone().ok_or_else(|| {
                StoreError::Internal(
                    "SQLite backend requires [store.sqlite] config".to_string(),
                )
            })?;
            info!(path = %sqlite.path, "Using SQLite document store backend");
            Ok(Arc::new(SqliteDocumentStore::connect(&sqlite).await?))
        }
        #[cfg(not(feature = "database-sqlite"))]
        StoreBackend::Sqlite => Err(StoreError::Internal(
            "SQLite document store requires the 'database-sqlite' feature. \
             Rebuild with: cargo build --features database-sqlite"
                .to_string(),
        )),
    }
}
