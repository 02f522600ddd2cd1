//! # Change Detector
//!
//! Walks every local item, re-fingerprints it and folds the result into the
//! local manifest.
//!
//! For each item:
//! - unknown id: new entry with `syncedAt = 0`
//! - known id, different hash: new hash, `modifiedAt = max(now, syncedAt + 1)`
//! - known id, same hash: untouched
//!
//! Ids that vanished from the local stores are dropped and tombstoned when
//! they had ever been synced. Settings that became excluded are dropped
//! without a tombstone.

use bridge_traits::{KeyValueStore, RecordStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::exclusion::ExclusionFilter;
use crate::hasher::ContentHasher;
use crate::manifest::{ItemContent, ItemKind, MetadataEntry, SyncManifest};

/// Result of one scan.
#[derive(Debug, Default)]
pub struct LocalScan {
    /// The manifest was modified
    pub changed: bool,
    /// Content read during the scan, by id; push uploads exactly this snapshot
    pub contents: HashMap<String, ItemContent>,
}

pub struct ChangeDetector {
    records: Arc<dyn RecordStore>,
    settings: Arc<dyn KeyValueStore>,
    hasher: Arc<ContentHasher>,
    filter: Arc<ExclusionFilter>,
}

impl ChangeDetector {
    pub fn new(
        records: Arc<dyn RecordStore>,
        settings: Arc<dyn KeyValueStore>,
        hasher: Arc<ContentHasher>,
        filter: Arc<ExclusionFilter>,
    ) -> Self {
        Self {
            records,
            settings,
            hasher,
            filter,
        }
    }

    /// Scan local stores and update `manifest` in place.
    ///
    /// Store enumeration errors propagate; nothing is persisted here.
    #[instrument(skip(self, manifest))]
    pub async fn scan(&self, manifest: &mut SyncManifest, now: i64) -> Result<LocalScan> {
        let mut scan = LocalScan::default();

        for record in self.records.get_all().await? {
            let content = ItemContent::Record(record.value);
            let hash = self.hasher.hash(&content)?;
            scan.changed |= observe(manifest, &record.id, hash, ItemKind::Structured, now);
            scan.contents.insert(record.id, content);
        }

        for key in self.settings.keys()? {
            if self.filter.is_excluded(&key) {
                continue;
            }
            if scan.contents.contains_key(&key) {
                warn!(key = %key, "Setting shares an id with a record, skipping it");
                continue;
            }
            // Keys can disappear between enumeration and read.
            let Some(value) = self.settings.get(&key)? else {
                continue;
            };
            let hash = self.hasher.hash_str(&value);
            scan.changed |= observe(manifest, &key, hash, ItemKind::Setting, now);
            scan.contents.insert(key, ItemContent::Setting(value));
        }

        let present: HashSet<&str> = scan.contents.keys().map(String::as_str).collect();
        let vanished: Vec<String> = manifest
            .items
            .keys()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();

        for id in vanished {
            let Some(entry) = manifest.items.remove(&id) else {
                continue;
            };
            scan.changed = true;

            let excluded = entry.kind == ItemKind::Setting && self.filter.is_excluded(&id);
            if excluded {
                debug!(id = %id, "Dropped newly excluded setting from manifest");
            } else if entry.synced_at > 0 {
                debug!(id = %id, "Item deleted locally, recording tombstone");
                manifest.tombstone(id, now);
            }
        }

        if scan.changed {
            manifest.last_modified = now;
        }

        debug!(
            items = scan.contents.len(),
            changed = scan.changed,
            "Local scan finished"
        );
        Ok(scan)
    }
}

/// Fold one observed item into the manifest; returns whether it changed.
fn observe(manifest: &mut SyncManifest, id: &str, hash: String, kind: ItemKind, now: i64) -> bool {
    let resurrected = manifest.clear_tombstone(id);

    match manifest.items.get_mut(id) {
        Some(entry) if entry.hash == hash && entry.kind == kind => resurrected,
        Some(entry) => {
            entry.hash = hash;
            entry.kind = kind;
            entry.modified_at = now.max(entry.synced_at.saturating_add(1));
            true
        }
        None => {
            manifest.items.insert(
                id.to_string(),
                MetadataEntry {
                    hash,
                    modified_at: now.max(1),
                    synced_at: 0,
                    kind,
                },
            );
            true
        }
    }
}
