//! Structured record storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{Record, RecordStore},
};
use sqlx::{
    sqlite::{SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use tracing::debug;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed record store
///
/// Records are stored as JSON text keyed by id. This is the desktop
/// counterpart of the browser's IndexedDB object store.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open the store at `db_path`, creating the file and table if needed
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let store = Self::connect(&db_url, 5).await?;
        debug!(path = ?db_path, "Initialized record store");
        Ok(store)
    }

    /// In-memory store (for testing)
    ///
    /// Every SQLite connection gets its own in-memory database, so the pool
    /// holds exactly one.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to connect to DB: {}", e)))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to create table: {}", e)))?;

        Ok(Self { pool })
    }

    fn decode(id: String, raw: &str) -> Result<Record> {
        let value = serde_json::from_str(raw).map_err(|e| {
            BridgeError::OperationFailed(format!("Record '{}' holds invalid JSON: {}", id, e))
        })?;
        Ok(Record { id, value })
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_all(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query("SELECT id, value FROM records ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to list records: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.get(0);
                let value: String = row.get(1);
                Self::decode(id, &value)
            })
            .collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        let row = sqlx::query("SELECT value FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to get record: {}", e)))?;

        row.map(|row| {
            let value: String = row.get(0);
            Self::decode(id.to_string(), &value)
        })
        .transpose()
    }

    async fn put(&self, record: Record) -> Result<()> {
        let value = serde_json::to_string(&record.value).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode record: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO records (id, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(value)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Failed to store record: {}", e)))?;

        debug!(id = %record.id, "Stored record");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to delete record: {}", e)))?;

        debug!(id = id, "Deleted record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = SqliteRecordStore::in_memory().await.unwrap();

        store
            .put(Record::new("c1", json!({"title": "hello"})))
            .await
            .unwrap();
        let record = store.get("c1").await.unwrap().unwrap();
        assert_eq!(record.value["title"], "hello");

        store.put(Record::new("c1", json!({"title": "edited"}))).await.unwrap();
        assert_eq!(store.get("c1").await.unwrap().unwrap().value["title"], "edited");

        store.delete("c1").await.unwrap();
        assert!(store.get("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_sorted_by_id() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        store.put(Record::new("b", json!(2))).await.unwrap();
        store.put(Record::new("a", json!(1))).await.unwrap();

        let ids: Vec<String> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db").join("records.sqlite");

        {
            let store = SqliteRecordStore::new(path.clone()).await.unwrap();
            store.put(Record::new("c1", json!("hello"))).await.unwrap();
        }

        let reopened = SqliteRecordStore::new(path).await.unwrap();
        assert_eq!(reopened.get("c1").await.unwrap().unwrap().value, json!("hello"));
    }
}
