//! # Sync Manifest
//!
//! Data model shared by both sides of a sync and the [`MetadataStore`] that
//! persists the local copy.
//!
//! ## Layout
//!
//! The local manifest lives as one JSON blob in key-value storage; the remote
//! one is `metadata.json` in the object store. Both use the same shape:
//!
//! ```text
//! {
//!   "lastSync": 1700000000000,
//!   "lastModified": 1700000000000,
//!   "items": { "c1": { "hash": "…", "modifiedAt": …, "syncedAt": …, "kind": "structured" } },
//!   "deleted": ["old-chat"],
//!   "deletedAt": { "old-chat": 1700000000000 }
//! }
//! ```
//!
//! Timestamps are Unix epoch milliseconds. `deletedAt` stamps each tombstone
//! so the remote side can purge it once it is older than the retention.

use bridge_traits::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::error::{Result, SyncError};

// ============================================================================
// Item Types
// ============================================================================

/// Which local store an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Record in the structured store, keyed by record id
    Structured,
    /// Entry in flat key-value storage, keyed by setting key
    Setting,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Structured => "structured",
            ItemKind::Setting => "setting",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content of a local item as read from its store.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContent {
    Record(serde_json::Value),
    Setting(String),
}

impl ItemContent {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemContent::Record(_) => ItemKind::Structured,
            ItemContent::Setting(_) => ItemKind::Setting,
        }
    }

    fn into_value(self) -> serde_json::Value {
        match self {
            ItemContent::Record(value) => value,
            ItemContent::Setting(value) => serde_json::Value::String(value),
        }
    }
}

/// Per-item sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    /// Content fingerprint
    pub hash: String,
    /// Last time the content was observed to change
    pub modified_at: i64,
    /// Last time the item was pushed or pulled; 0 when never
    #[serde(default)]
    pub synced_at: i64,
    pub kind: ItemKind,
}

impl MetadataEntry {
    /// Changed since the last push or pull.
    pub fn is_dirty(&self) -> bool {
        self.modified_at > self.synced_at
    }
}

/// Map of item id to metadata plus deletion tombstones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    #[serde(default)]
    pub last_sync: i64,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub items: BTreeMap<String, MetadataEntry>,
    /// Ids deleted since the previous manifest
    #[serde(default)]
    pub deleted: BTreeSet<String>,
    /// When each tombstone in `deleted` was recorded
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deleted_at: BTreeMap<String, i64>,
}

impl SyncManifest {
    /// Parse a manifest blob.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| SyncError::ManifestCorrupt(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Record a deletion tombstone for `id` at `now`.
    pub fn tombstone(&mut self, id: impl Into<String>, now: i64) {
        let id = id.into();
        self.deleted_at.insert(id.clone(), now);
        self.deleted.insert(id);
    }

    /// Drop the tombstone for `id`; returns whether there was one.
    pub fn clear_tombstone(&mut self, id: &str) -> bool {
        self.deleted_at.remove(id);
        self.deleted.remove(id)
    }

    /// Drop tombstones recorded more than `retention_ms` before `now`.
    ///
    /// Tombstones without a stamp, or stamped in the future, are restamped
    /// with `now` and age from there. Returns how many were purged.
    pub fn purge_tombstones(&mut self, now: i64, retention_ms: i64) -> usize {
        let cutoff = now.saturating_sub(retention_ms);
        let deleted_at = &mut self.deleted_at;
        let mut purged = 0;

        self.deleted.retain(|id| {
            let stamp = deleted_at.entry(id.clone()).or_insert(now);
            *stamp = (*stamp).min(now);
            if *stamp < cutoff {
                deleted_at.remove(id);
                purged += 1;
                false
            } else {
                true
            }
        });
        self.deleted_at.retain(|id, _| self.deleted.contains(id));

        purged
    }

    /// Ids whose local content changed since they were last synced.
    pub fn dirty_ids(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|(_, entry)| entry.is_dirty())
            .map(|(id, _)| id.as_str())
    }
}

/// Item object uploaded to `records/{id}.json` or `settings/{key}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub id: String,
    pub kind: ItemKind,
    pub hash: String,
    pub modified_at: i64,
    /// Record JSON for structured items, the raw string for settings
    pub content: serde_json::Value,
}

impl ItemPayload {
    pub fn new(id: impl Into<String>, entry: &MetadataEntry, content: ItemContent) -> Self {
        Self {
            id: id.into(),
            kind: entry.kind,
            hash: entry.hash.clone(),
            modified_at: entry.modified_at,
            content: content.into_value(),
        }
    }

    /// Typed content, checked against `kind`.
    pub fn item_content(&self) -> Result<ItemContent> {
        match (self.kind, &self.content) {
            (ItemKind::Structured, value) => Ok(ItemContent::Record(value.clone())),
            (ItemKind::Setting, serde_json::Value::String(value)) => {
                Ok(ItemContent::Setting(value.clone()))
            }
            (ItemKind::Setting, other) => Err(SyncError::Serialization(format!(
                "setting '{}' carries non-string content: {}",
                self.id, other
            ))),
        }
    }
}

// ============================================================================
// Metadata Store
// ============================================================================

/// Persists the local manifest under one key-value key.
pub struct MetadataStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl MetadataStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the local manifest.
    ///
    /// A missing blob is an empty manifest. An unreadable blob is also
    /// replaced by an empty manifest: every item is then re-fingerprinted as
    /// new and the next push rebuilds the remote entries.
    pub fn load(&self) -> Result<SyncManifest> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(SyncManifest::default());
        };

        match SyncManifest::from_json(raw.as_bytes()) {
            Ok(manifest) => Ok(manifest),
            Err(err) => {
                warn!(key = %self.key, "Local manifest unreadable, starting fresh: {}", err);
                Ok(SyncManifest::default())
            }
        }
    }

    pub fn save(&self, manifest: &SyncManifest) -> Result<()> {
        let json = serde_json::to_string(manifest)?;
        self.store.set(&self.key, &json)?;
        Ok(())
    }
}
