//! SQLite-backed document store (feature `database-sqlite`).
//!
//! Documents live in a single `documents` table keyed by (collection, id)
//! with the body stored as JSON text. [`atomic_write`] runs inside one
//! transaction, which provides the all-or-nothing guarantee the deletion
//! engine relies on for the per-account commit.
//!
//! Filters are evaluated in Rust with the same matcher the memory backend
//! uses, after narrowing to the collection in SQL. Deletion-run working sets
//! (one account's documents, one collection at a time) are small enough that
//! pushing JSON predicates into SQL buys nothing here.
//!
//! [`atomic_write`]: DocumentStore::atomic_write

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use super::{Document, DocumentStore, Fields, Filter, StoreError, StoreResult, WriteOp};
use crate::config::SqliteStoreConfig;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (and if necessary create) the database at the configured path.
    pub async fn connect(config: &SqliteStoreConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(config.create_if_missing);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                data       TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Test helper.
    #[cfg(test)]
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id))",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    fn parse_fields(raw: &str) -> StoreResult<Fields> {
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Internal(format!(
                "Document body is not a JSON object: {other}"
            ))),
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("data");
                Ok(Some(Document::new(id, Self::parse_fields(&raw)?)))
            }
            None => Ok(None),
        }
    }

    async fn query(&self, collection: &str, filter: Filter) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query("SELECT id, data FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut docs = Vec::new();
        for row in rows {
            let raw: String = row.get("data");
            let data = Self::parse_fields(&raw)?;
            if filter.matches(&data) {
                docs.push(Document::new(row.get::<String, _>("id"), data));
            }
        }
        Ok(filter.sort_and_truncate(docs))
    }

    async fn atomic_write(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for op in ops {
            match op {
                WriteOp::Insert {
                    collection,
                    id,
                    data,
                } => {
                    let raw = serde_json::to_string(&Value::Object(data))?;
                    sqlx::query(
                        "INSERT OR REPLACE INTO documents (collection, id, data) VALUES (?, ?, ?)",
                    )
                    .bind(&collection)
                    .bind(&id)
                    .bind(&raw)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                } => {
                    let row = sqlx::query(
                        "SELECT data FROM documents WHERE collection = ? AND id = ?",
                    )
                    .bind(&collection)
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    // Missing target is a no-op, matching the memory backend.
                    let Some(row) = row else { continue };
                    let raw: String = row.get("data");
                    let mut data = Self::parse_fields(&raw)?;
                    for (key, value) in fields {
                        data.insert(key, value);
                    }
                    let raw = serde_json::to_string(&Value::Object(data))?;
                    sqlx::query(
                        "UPDATE documents SET data = ? WHERE collection = ? AND id = ?",
                    )
                    .bind(&raw)
                    .bind(&collection)
                    .bind(&id)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Delete { collection, id } => {
                    sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                        .bind(&collection)
                        .bind(&id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let raw: String = row.get("data");
        let mut data = Self::parse_fields(&raw)?;
        if data.get(field) != Some(&expected) {
            return Ok(false);
        }
        data.insert(field.to_string(), new);

        let raw = serde_json::to_string(&Value::Object(data))?;
        sqlx::query("UPDATE documents SET data = ? WHERE collection = ? AND id = ?")
            .bind(&raw)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
