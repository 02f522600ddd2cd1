//! Storage Abstractions
//!
//! Provides platform-agnostic traits for the three stores the sync engine
//! touches: the remote object store, the flat key-value settings storage and
//! the structured record store.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{error::Result, platform::PlatformSendSync};

/// Listing entry returned by [`ObjectStore::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Full object key, including the listed prefix
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time (Unix millis) when the backend reports one
    pub last_modified: Option<i64>,
}

/// Remote blob store
///
/// Abstracts the shared remote side of synchronization:
/// - S3-compatible buckets
/// - Google Drive `appDataFolder`
/// - A local directory (desktop testing, self-hosted sync folders)
///
/// Keys are `/`-separated paths such as `metadata.json` or
/// `records/chat-1.json`. Bodies are opaque bytes; the engine only stores JSON.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ObjectStore;
///
/// async fn has_manifest(store: &dyn ObjectStore) -> Result<bool> {
///     Ok(store.get("metadata.json").await?.is_some())
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait ObjectStore: PlatformSendSync {
    /// Store `body` under `key`, replacing any existing object
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Fetch the object stored under `key`
    ///
    /// Returns `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// List every object whose key starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Delete the object stored under `key`
    ///
    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Flat key-value settings storage
///
/// Mirrors the browser's `localStorage`: synchronous, string values only.
/// - Web: `window.localStorage`
/// - Desktop: JSON file
/// - Tests: in-memory map
pub trait KeyValueStore: PlatformSendSync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key succeeds
    fn remove(&self, key: &str) -> Result<()>;

    /// Enumerate every stored key
    fn keys(&self) -> Result<Vec<String>>;
}

/// A structured record: an id plus an arbitrary JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub value: serde_json::Value,
}

impl Record {
    pub fn new(id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

/// Structured record store
///
/// One logical table of JSON records keyed by id:
/// - Web: an IndexedDB object store
/// - Desktop: SQLite table
///
/// Every call is a suspension point; implementations run each call in its
/// own transaction.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait RecordStore: PlatformSendSync {
    /// Fetch every record
    async fn get_all(&self) -> Result<Vec<Record>>;

    /// Fetch one record by id
    async fn get(&self, id: &str) -> Result<Option<Record>>;

    /// Insert or replace a record
    async fn put(&self, record: Record) -> Result<()>;

    /// Delete a record; deleting a missing id succeeds
    async fn delete(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_info_serializes_camel_case() {
        let info = ObjectInfo {
            key: "records/c1.json".to_string(),
            size: 42,
            last_modified: Some(1_700_000_000_000),
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["lastModified"], 1_700_000_000_000i64);
        assert_eq!(json["size"], 42);
    }

    #[test]
    fn test_record_new() {
        let record = Record::new("c1", serde_json::json!({"title": "hello"}));
        assert_eq!(record.id, "c1");
        assert_eq!(record.value["title"], "hello");
    }
}
