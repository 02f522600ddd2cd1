//! # Backup Manager
//!
//! Full snapshots of every syncable item, stored next to the incremental
//! objects under `backups/backup-{millis}.json`. Snapshots are independent of
//! the manifests: restoring one writes items back into the local stores and
//! leaves it to the next change-detection pass to mark them dirty.

use bridge_traits::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::detector::ChangeDetector;
use crate::error::{Result, SyncError};
use crate::exclusion::ExclusionFilter;
use crate::executor::SyncExecutor;
use crate::manifest::{ItemKind, ItemPayload, MetadataStore};

const BACKUP_FILE_PREFIX: &str = "backup-";
const BACKUP_FILE_SUFFIX: &str = ".json";

/// Wire shape of a snapshot object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub created_at: i64,
    pub items: Vec<ItemPayload>,
}

/// A snapshot present in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub key: String,
    pub created_at: i64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    pub key: String,
    pub item_count: usize,
    /// Older snapshots deleted by retention
    pub pruned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub key: String,
    pub restored: usize,
}

pub struct BackupManager {
    detector: Arc<ChangeDetector>,
    executor: Arc<SyncExecutor>,
    metadata: Arc<MetadataStore>,
    filter: Arc<ExclusionFilter>,
    clock: Arc<dyn Clock>,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(
        detector: Arc<ChangeDetector>,
        executor: Arc<SyncExecutor>,
        metadata: Arc<MetadataStore>,
        filter: Arc<ExclusionFilter>,
        clock: Arc<dyn Clock>,
        max_backups: usize,
    ) -> Self {
        Self {
            detector,
            executor,
            metadata,
            filter,
            clock,
            max_backups: max_backups.max(1),
        }
    }

    /// Upload a snapshot of all syncable items, then apply retention.
    #[instrument(skip(self))]
    pub async fn create_backup(&self) -> Result<BackupOutcome> {
        let now = self.clock.unix_timestamp_millis();

        let mut manifest = self.metadata.load()?;
        let scan = self.detector.scan(&mut manifest, now).await?;
        if scan.changed {
            self.metadata.save(&manifest)?;
        }

        let mut items: Vec<ItemPayload> = scan
            .contents
            .into_iter()
            .filter_map(|(id, content)| {
                let entry = manifest.items.get(&id)?;
                Some(ItemPayload::new(id, entry, content))
            })
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));

        let snapshot = BackupSnapshot {
            created_at: now,
            items,
        };
        let key = self.executor.backup_key(now);
        self.executor
            .put_object(&key, serde_json::to_vec(&snapshot)?)
            .await?;
        info!(key = %key, items = snapshot.items.len(), "Backup uploaded");

        let pruned = self.prune().await;

        Ok(BackupOutcome {
            key,
            item_count: snapshot.items.len(),
            pruned,
        })
    }

    /// Snapshots in the object store, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let prefix = self.executor.backups_prefix();
        let mut backups: Vec<BackupInfo> = self
            .executor
            .list_objects(&prefix)
            .await?
            .into_iter()
            .filter_map(|object| {
                let file_name = object.key.rsplit('/').next().unwrap_or(&object.key);
                let created_at = parse_backup_timestamp(file_name)?;
                Some(BackupInfo {
                    key: object.key,
                    created_at,
                    size: object.size,
                })
            })
            .collect();

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Write every item of snapshot `key` back into the local stores.
    ///
    /// Restore is additive: local items missing from the snapshot stay.
    #[instrument(skip(self))]
    pub async fn restore_backup(&self, key: &str) -> Result<RestoreOutcome> {
        let raw = self
            .executor
            .get_object(key)
            .await?
            .ok_or_else(|| SyncError::BackupNotFound(key.to_string()))?;
        let snapshot: BackupSnapshot = serde_json::from_slice(&raw)?;

        let mut restored = 0;
        for payload in &snapshot.items {
            if payload.kind == ItemKind::Setting && self.filter.is_excluded(&payload.id) {
                debug!(id = %payload.id, "Skipping excluded setting");
                continue;
            }
            self.executor
                .write_local(&payload.id, payload.item_content()?)
                .await?;
            restored += 1;
        }

        info!(key = %key, restored, "Backup restored");
        Ok(RestoreOutcome {
            key: key.to_string(),
            restored,
        })
    }

    /// Delete snapshots beyond retention. Failures are logged only.
    async fn prune(&self) -> usize {
        let backups = match self.list_backups().await {
            Ok(backups) => backups,
            Err(err) => {
                warn!("Could not list backups for pruning: {}", err);
                return 0;
            }
        };

        let mut pruned = 0;
        for stale in backups.iter().skip(self.max_backups) {
            match self.executor.delete_object(&stale.key).await {
                Ok(()) => pruned += 1,
                Err(err) => warn!(key = %stale.key, "Failed to prune backup: {}", err),
            }
        }
        if pruned > 0 {
            debug!(pruned, "Pruned old backups");
        }
        pruned
    }
}

/// `backup-{millis}.json` to its timestamp.
fn parse_backup_timestamp(file_name: &str) -> Option<i64> {
    file_name
        .strip_prefix(BACKUP_FILE_PREFIX)?
        .strip_suffix(BACKUP_FILE_SUFFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_timestamp() {
        assert_eq!(parse_backup_timestamp("backup-1700000000000.json"), Some(1_700_000_000_000));
        assert_eq!(parse_backup_timestamp("backup-.json"), None);
        assert_eq!(parse_backup_timestamp("notes.json"), None);
        assert_eq!(parse_backup_timestamp("backup-12.txt"), None);
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snapshot = BackupSnapshot {
            created_at: 7,
            items: vec![ItemPayload {
                id: "theme".to_string(),
                kind: ItemKind::Setting,
                hash: "abc".to_string(),
                modified_at: 5,
                content: serde_json::json!("dark"),
            }],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["createdAt"], 7);
        assert_eq!(json["items"][0]["kind"], "setting");
        assert_eq!(json["items"][0]["modifiedAt"], 5);
    }
}
