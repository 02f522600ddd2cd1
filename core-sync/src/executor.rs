//! # Sync Executor
//!
//! Thin adapter over the object store and the local stores. It knows the
//! remote key layout and payload encoding; it makes no sync decisions.
//!
//! ## Remote layout
//!
//! ```text
//! {prefix}metadata.json
//! {prefix}records/{urlencoded id}.json
//! {prefix}settings/{urlencoded key}.json
//! {prefix}backups/backup-{millis}.json
//! ```

use bridge_traits::{KeyValueStore, ObjectInfo, ObjectStore, Record, RecordStore};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, SyncError};
use crate::manifest::{ItemContent, ItemKind, ItemPayload, SyncManifest};

const JSON_CONTENT_TYPE: &str = "application/json";
const MANIFEST_OBJECT: &str = "metadata.json";
const RECORDS_DIR: &str = "records/";
const SETTINGS_DIR: &str = "settings/";
pub(crate) const BACKUPS_DIR: &str = "backups/";

/// State of the remote manifest object.
#[derive(Debug)]
pub enum RemoteManifest {
    Present(SyncManifest),
    /// No `metadata.json` yet
    Absent,
    /// `metadata.json` exists but does not parse
    Corrupt(String),
}

pub struct SyncExecutor {
    remote: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    settings: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl SyncExecutor {
    pub fn new(
        remote: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        settings: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            records,
            settings,
            prefix: prefix.into(),
        }
    }

    // ------------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------------

    pub fn manifest_key(&self) -> String {
        format!("{}{}", self.prefix, MANIFEST_OBJECT)
    }

    pub fn item_key(&self, kind: ItemKind, id: &str) -> String {
        let dir = match kind {
            ItemKind::Structured => RECORDS_DIR,
            ItemKind::Setting => SETTINGS_DIR,
        };
        format!("{}{}{}.json", self.prefix, dir, urlencoding::encode(id))
    }

    pub fn backup_key(&self, created_at: i64) -> String {
        format!("{}{}backup-{}.json", self.prefix, BACKUPS_DIR, created_at)
    }

    pub fn backups_prefix(&self) -> String {
        format!("{}{}", self.prefix, BACKUPS_DIR)
    }

    // ------------------------------------------------------------------------
    // Remote side
    // ------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn fetch_manifest(&self) -> Result<RemoteManifest> {
        let Some(raw) = self.remote.get(&self.manifest_key()).await? else {
            return Ok(RemoteManifest::Absent);
        };

        match SyncManifest::from_json(&raw) {
            Ok(manifest) => Ok(RemoteManifest::Present(manifest)),
            Err(err) => Ok(RemoteManifest::Corrupt(err.to_string())),
        }
    }

    #[instrument(skip(self, manifest), fields(items = manifest.items.len()))]
    pub async fn upload_manifest(&self, manifest: &SyncManifest) -> Result<()> {
        let body = Bytes::from(manifest.to_json()?);
        self.remote
            .put(&self.manifest_key(), body, JSON_CONTENT_TYPE)
            .await?;
        Ok(())
    }

    pub async fn upload_item(&self, payload: &ItemPayload) -> Result<()> {
        let key = self.item_key(payload.kind, &payload.id);
        let body = Bytes::from(serde_json::to_vec(payload)?);
        self.remote.put(&key, body, JSON_CONTENT_TYPE).await?;
        debug!(key = %key, "Uploaded item");
        Ok(())
    }

    /// Download an item object; `None` when the object is missing.
    pub async fn download_item(&self, kind: ItemKind, id: &str) -> Result<Option<ItemPayload>> {
        let Some(raw) = self.remote.get(&self.item_key(kind, id)).await? else {
            return Ok(None);
        };
        let payload: ItemPayload = serde_json::from_slice(&raw)?;
        if payload.id != id || payload.kind != kind {
            return Err(SyncError::Serialization(format!(
                "object for {} '{}' describes {} '{}'",
                kind, id, payload.kind, payload.id
            )));
        }
        Ok(Some(payload))
    }

    /// Delete an item object. Without a known kind both candidate keys go.
    pub async fn delete_remote_item(&self, kind: Option<ItemKind>, id: &str) -> Result<()> {
        match kind {
            Some(kind) => self.remote.delete(&self.item_key(kind, id)).await?,
            None => {
                self.remote
                    .delete(&self.item_key(ItemKind::Structured, id))
                    .await?;
                self.remote
                    .delete(&self.item_key(ItemKind::Setting, id))
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.remote
            .put(key, Bytes::from(body), JSON_CONTENT_TYPE)
            .await?;
        Ok(())
    }

    pub async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.remote.get(key).await?)
    }

    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        Ok(self.remote.list(prefix).await?)
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        Ok(self.remote.delete(key).await?)
    }

    // ------------------------------------------------------------------------
    // Local side
    // ------------------------------------------------------------------------

    /// Write content into the store matching its kind.
    pub async fn write_local(&self, id: &str, content: ItemContent) -> Result<()> {
        match content {
            ItemContent::Record(value) => self.records.put(Record::new(id, value)).await?,
            ItemContent::Setting(value) => self.settings.set(id, &value)?,
        }
        Ok(())
    }

    pub async fn delete_local(&self, kind: ItemKind, id: &str) -> Result<()> {
        match kind {
            ItemKind::Structured => self.records.delete(id).await?,
            ItemKind::Setting => self.settings.remove(id)?,
        }
        Ok(())
    }
}
