//! # Remote Metadata Reconciler
//!
//! Diffs the local manifest against the remote one and drives the executor.
//!
//! ## Directions
//!
//! - **Push**: scan local changes, upload every dirty item and every item the
//!   remote manifest does not know, apply local tombstones remotely, then
//!   upload the remote manifest. Local `syncedAt` values are committed only
//!   after that upload succeeds.
//! - **Pull**: fetch the remote manifest (falling back to a push when it is
//!   absent or unreadable), scan local changes, download items the local side
//!   lacks or that changed remotely *and* are newer remotely, and apply remote
//!   tombstones.
//! - **Full**: pull, then push, in one operation.
//!
//! ## Conflict rule
//!
//! A remote item overwrites a local one only when the hashes differ and the
//! remote `modifiedAt` is strictly newer. Otherwise the local copy is kept
//! and, if dirty, pushed on the next push.
//!
//! ## Clocks
//!
//! Peers' clocks disagree. Remote timestamps more than a day ahead of the
//! local clock are clamped when pulled, and `syncedAt` never lands below the
//! `modifiedAt` it covers, so a peer running ahead cannot keep an item dirty.
//!
//! ## Tombstones
//!
//! Push stamps every remote tombstone and purges those older than the
//! configured retention.
//!
//! ## Failure policy
//!
//! Individual transfers that fail are logged and counted in
//! [`SyncReport::failures`]; the operation still succeeds if the manifests
//! are read and written. Manifest transport errors fail the operation.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use bridge_traits::Clock;
use core_runtime::config::DEFAULT_TOMBSTONE_RETENTION;

use crate::detector::ChangeDetector;
use crate::error::{Result, SyncError};
use crate::exclusion::ExclusionFilter;
use crate::executor::{RemoteManifest, SyncExecutor};
use crate::manifest::{ItemContent, ItemKind, ItemPayload, MetadataEntry, MetadataStore, SyncManifest};

/// Furthest a remote timestamp may run ahead of the local clock.
const MAX_REMOTE_CLOCK_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// Which side dominates a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
    Full,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Push => "push",
            SyncDirection::Pull => "pull",
            SyncDirection::Full => "full",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub pushed: usize,
    pub pulled: usize,
    pub deleted_local: usize,
    pub deleted_remote: usize,
    /// Item transfers that failed and were skipped
    pub failures: usize,
    /// The remote manifest was absent or unreadable and has been rebuilt
    pub bootstrapped: bool,
    /// The single `now` used for every timestamp written
    pub completed_at: i64,
}

impl SyncReport {
    fn new(direction: SyncDirection, now: i64) -> Self {
        Self {
            direction,
            pushed: 0,
            pulled: 0,
            deleted_local: 0,
            deleted_remote: 0,
            failures: 0,
            bootstrapped: false,
            completed_at: now,
        }
    }

    fn absorb(&mut self, other: SyncReport) {
        self.pushed += other.pushed;
        self.pulled += other.pulled;
        self.deleted_local += other.deleted_local;
        self.deleted_remote += other.deleted_remote;
        self.failures += other.failures;
        self.bootstrapped |= other.bootstrapped;
    }

    pub fn has_failures(&self) -> bool {
        self.failures > 0
    }
}

pub struct Reconciler {
    detector: Arc<ChangeDetector>,
    executor: Arc<SyncExecutor>,
    metadata: Arc<MetadataStore>,
    filter: Arc<ExclusionFilter>,
    clock: Arc<dyn Clock>,
    max_concurrent_transfers: usize,
    tombstone_retention_ms: i64,
}

enum Upload {
    Item(String, MetadataEntry),
    Tombstone(String),
}

impl Reconciler {
    pub fn new(
        detector: Arc<ChangeDetector>,
        executor: Arc<SyncExecutor>,
        metadata: Arc<MetadataStore>,
        filter: Arc<ExclusionFilter>,
        clock: Arc<dyn Clock>,
        max_concurrent_transfers: usize,
    ) -> Self {
        Self {
            detector,
            executor,
            metadata,
            filter,
            clock,
            max_concurrent_transfers: max_concurrent_transfers.max(1),
            tombstone_retention_ms: duration_millis(DEFAULT_TOMBSTONE_RETENTION),
        }
    }

    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention_ms = duration_millis(retention);
        self
    }

    /// Run one reconciliation in `direction`.
    #[instrument(skip(self), fields(direction = %direction))]
    pub async fn reconcile(&self, direction: SyncDirection) -> Result<SyncReport> {
        let now = self.clock.unix_timestamp_millis();

        let report = match direction {
            SyncDirection::Push => self.push(now).await?,
            SyncDirection::Pull => self.pull(now).await?,
            SyncDirection::Full => {
                let mut report = self.pull(now).await?;
                // A bootstrap pull already pushed everything.
                if !report.bootstrapped {
                    report.absorb(self.push(now).await?);
                }
                report
            }
        };
        let report = SyncReport { direction, ..report };

        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            deleted_local = report.deleted_local,
            deleted_remote = report.deleted_remote,
            failures = report.failures,
            bootstrapped = report.bootstrapped,
            "Reconciliation finished"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    async fn push(&self, now: i64) -> Result<SyncReport> {
        let mut report = SyncReport::new(SyncDirection::Push, now);

        let mut local = self.metadata.load()?;
        let scan = self.detector.scan(&mut local, now).await?;
        if scan.changed {
            self.metadata.save(&local)?;
        }

        let mut remote = match self.executor.fetch_manifest().await? {
            RemoteManifest::Present(manifest) => manifest,
            RemoteManifest::Absent => {
                info!("No remote manifest, bootstrapping remote side");
                report.bootstrapped = true;
                SyncManifest::default()
            }
            RemoteManifest::Corrupt(reason) => {
                warn!("Remote manifest unreadable, bootstrapping remote side: {}", reason);
                report.bootstrapped = true;
                SyncManifest::default()
            }
        };

        // Dirty items, plus clean ones the remote side never heard of.
        let mut uploads: Vec<(String, MetadataEntry, ItemContent)> = Vec::new();
        let mut contents = scan.contents;
        for (id, entry) in &local.items {
            let unknown_remotely =
                !remote.items.contains_key(id) && !remote.deleted.contains(id);
            if !entry.is_dirty() && !unknown_remotely {
                continue;
            }
            match contents.remove(id) {
                Some(content) => uploads.push((id.clone(), entry.clone(), content)),
                None => debug!(id = %id, "Item vanished during push, skipping"),
            }
        }

        let tombstones: Vec<(String, Option<ItemKind>)> = local
            .deleted
            .iter()
            .map(|id| (id.clone(), remote.items.get(id).map(|entry| entry.kind)))
            .collect();

        debug!(
            uploads = uploads.len(),
            tombstones = tombstones.len(),
            "Push set computed"
        );

        let executor = &self.executor;
        let item_results: Vec<std::result::Result<Upload, (String, SyncError)>> =
            stream::iter(uploads)
                .map(|(id, entry, content)| async move {
                    let payload = ItemPayload::new(id.clone(), &entry, content);
                    match executor.upload_item(&payload).await {
                        Ok(()) => Ok(Upload::Item(id, entry)),
                        Err(err) => Err((id, err)),
                    }
                })
                .buffer_unordered(self.max_concurrent_transfers)
                .collect()
                .await;

        let tombstone_results: Vec<std::result::Result<Upload, (String, SyncError)>> =
            stream::iter(tombstones)
                .map(|(id, kind)| async move {
                    match executor.delete_remote_item(kind, &id).await {
                        Ok(()) => Ok(Upload::Tombstone(id)),
                        Err(err) => Err((id, err)),
                    }
                })
                .buffer_unordered(self.max_concurrent_transfers)
                .collect()
                .await;

        let mut synced_ids = Vec::new();
        let mut cleared_tombstones = Vec::new();
        for result in item_results.into_iter().chain(tombstone_results) {
            match result {
                Ok(Upload::Item(id, entry)) => {
                    let synced_at = now.max(entry.modified_at);
                    remote.clear_tombstone(&id);
                    remote.items.insert(
                        id.clone(),
                        MetadataEntry {
                            synced_at,
                            ..entry
                        },
                    );
                    synced_ids.push((id, synced_at));
                    report.pushed += 1;
                }
                Ok(Upload::Tombstone(id)) => {
                    remote.items.remove(&id);
                    remote.tombstone(id.clone(), now);
                    cleared_tombstones.push(id);
                    report.deleted_remote += 1;
                }
                Err((id, err)) => {
                    warn!(id = %id, "Transfer failed, item stays pending: {}", err);
                    report.failures += 1;
                }
            }
        }

        let purged = remote.purge_tombstones(now, self.tombstone_retention_ms);
        if purged > 0 {
            debug!(purged, "Purged expired remote tombstones");
        }

        if report.pushed > 0 || report.deleted_remote > 0 || purged > 0 {
            remote.last_modified = now;
        }
        remote.last_sync = now;

        if let Err(err) = self.executor.upload_manifest(&remote).await {
            warn!("Remote manifest upload failed, local items stay dirty: {}", err);
            return Err(err);
        }

        for (id, synced_at) in &synced_ids {
            if let Some(entry) = local.items.get_mut(id) {
                entry.synced_at = *synced_at;
            }
        }
        for id in &cleared_tombstones {
            local.clear_tombstone(id);
        }
        local.last_sync = now;
        self.metadata.save(&local)?;

        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------------

    async fn pull(&self, now: i64) -> Result<SyncReport> {
        let mut remote = match self.executor.fetch_manifest().await? {
            RemoteManifest::Present(manifest) => manifest,
            RemoteManifest::Absent => {
                info!("No remote manifest to pull, pushing local state instead");
                return self.push(now).await;
            }
            RemoteManifest::Corrupt(reason) => {
                warn!("Remote manifest unreadable, pushing local state instead: {}", reason);
                return self.push(now).await;
            }
        };

        clamp_remote_timestamps(&mut remote, now);

        let mut report = SyncReport::new(SyncDirection::Pull, now);
        let mut local = self.metadata.load()?;
        self.detector.scan(&mut local, now).await?;

        let wanted: Vec<(String, MetadataEntry)> = remote
            .items
            .iter()
            .filter(|(id, remote_entry)| self.should_download(&local, id, remote_entry))
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();

        debug!(downloads = wanted.len(), "Pull set computed");

        let executor = &self.executor;
        let downloads: Vec<(String, MetadataEntry, Result<Option<ItemPayload>>)> =
            stream::iter(wanted)
                .map(|(id, entry)| async move {
                    let result = executor.download_item(entry.kind, &id).await;
                    (id, entry, result)
                })
                .buffer_unordered(self.max_concurrent_transfers)
                .collect()
                .await;

        let mut applied: BTreeMap<String, MetadataEntry> = BTreeMap::new();
        for (id, entry, result) in downloads {
            let payload = match result {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    warn!(id = %id, "Remote manifest lists an item with no object, skipping");
                    report.failures += 1;
                    continue;
                }
                Err(err) => {
                    warn!(id = %id, "Download failed, skipping: {}", err);
                    report.failures += 1;
                    continue;
                }
            };

            let applied_result = match payload.item_content() {
                Ok(content) => self.executor.write_local(&id, content).await,
                Err(err) => Err(err),
            };
            match applied_result {
                Ok(()) => {
                    applied.insert(
                        id,
                        MetadataEntry {
                            synced_at: now.max(entry.modified_at),
                            ..entry
                        },
                    );
                    report.pulled += 1;
                }
                Err(err) => {
                    warn!(id = %id, "Applying remote item failed, skipping: {}", err);
                    report.failures += 1;
                }
            }
        }
        local.items.extend(applied);

        for id in &remote.deleted {
            if remote.items.contains_key(id) {
                continue;
            }
            let Some(entry) = local.items.get(id) else {
                continue;
            };
            match self.executor.delete_local(entry.kind, id).await {
                Ok(()) => {
                    local.items.remove(id);
                    report.deleted_local += 1;
                }
                Err(err) => {
                    warn!(id = %id, "Local delete failed, skipping: {}", err);
                    report.failures += 1;
                }
            }
        }

        local.last_sync = now;
        if report.pulled > 0 || report.deleted_local > 0 {
            local.last_modified = now;
        }
        self.metadata.save(&local)?;

        Ok(report)
    }

    fn should_download(&self, local: &SyncManifest, id: &str, remote_entry: &MetadataEntry) -> bool {
        if local.deleted.contains(id) {
            return false;
        }
        if remote_entry.kind == ItemKind::Setting && self.filter.is_excluded(id) {
            return false;
        }
        match local.items.get(id) {
            None => true,
            Some(local_entry) => {
                remote_entry.hash != local_entry.hash
                    && remote_entry.modified_at > local_entry.modified_at
            }
        }
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Pull remote timestamps that run too far ahead back to the skew bound.
fn clamp_remote_timestamps(remote: &mut SyncManifest, now: i64) {
    let bound = now.saturating_add(MAX_REMOTE_CLOCK_SKEW_MS);
    for (id, entry) in remote.items.iter_mut() {
        if entry.modified_at > bound || entry.synced_at > bound {
            warn!(
                id = %id,
                modified_at = entry.modified_at,
                "Remote timestamp too far in the future, clamping"
            );
            entry.modified_at = entry.modified_at.min(bound);
            entry.synced_at = entry.synced_at.min(bound);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_entry(modified_at: i64, synced_at: i64) -> MetadataEntry {
        MetadataEntry {
            hash: "h".to_string(),
            modified_at,
            synced_at,
            kind: ItemKind::Setting,
        }
    }

    #[test]
    fn test_far_future_remote_timestamps_are_clamped() {
        let mut remote = SyncManifest::default();
        remote
            .items
            .insert("theme".to_string(), remote_entry(i64::MAX, i64::MAX));
        remote
            .items
            .insert("lang".to_string(), remote_entry(5_000, 5_000));

        clamp_remote_timestamps(&mut remote, 1_000);

        let bound = 1_000 + MAX_REMOTE_CLOCK_SKEW_MS;
        assert_eq!(remote.items["theme"].modified_at, bound);
        assert_eq!(remote.items["theme"].synced_at, bound);
        assert_eq!(remote.items["lang"], remote_entry(5_000, 5_000));
    }
}
