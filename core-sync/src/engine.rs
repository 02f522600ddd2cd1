//! # Sync Engine
//!
//! One explicit context object per session. It owns the local and remote
//! plumbing, the operation queue, the periodic scheduler and the optional
//! advisory lease; nothing lives in globals.
//!
//! Every public operation goes through the queue, so a manual sync issued
//! while a timer-triggered one runs simply waits its turn. Status is
//! reported as each operation starts and finishes, and `idle` once the
//! queue empties, both to the host [`StatusSink`] and on the [`EventBus`].
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(config)?;
//! engine.start();
//! let report = engine.sync_to_cloud().await?;
//! println!("pushed {} items", report.pushed);
//! ```

use bridge_traits::{Clock, StatusSink, SyncState};
use core_runtime::config::{FeatureFlags, SyncEngineConfig};
use core_runtime::events::{BackupEvent, CoreEvent, EventBus, EventStream, SyncEvent};
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

use crate::backup::{BackupInfo, BackupManager, BackupOutcome, RestoreOutcome};
use crate::detector::ChangeDetector;
use crate::error::{Result, SyncError};
use crate::exclusion::ExclusionFilter;
use crate::executor::SyncExecutor;
use crate::hasher::ContentHasher;
use crate::lease::{AdvisoryLease, LEASE_KEY};
use crate::manifest::MetadataStore;
use crate::queue::{OperationHandle, OperationQueue, QueueObserver};
use crate::reconciler::{Reconciler, SyncDirection, SyncReport};
use crate::scheduler::SyncScheduler;

pub const SYNC_OPERATION: &str = "sync";
pub const BACKUP_OPERATION: &str = "backup";
pub const RESTORE_OPERATION: &str = "restore";
pub const DETECT_OPERATION: &str = "detect";

/// Work that can be queued on the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    Detect,
    SyncToCloud,
    SyncFromCloud,
    Sync,
    Backup,
    Restore { key: String },
}

impl OperationRequest {
    /// Queue name; all three sync directions share `sync`.
    pub fn name(&self) -> &'static str {
        match self {
            OperationRequest::Detect => DETECT_OPERATION,
            OperationRequest::SyncToCloud
            | OperationRequest::SyncFromCloud
            | OperationRequest::Sync => SYNC_OPERATION,
            OperationRequest::Backup => BACKUP_OPERATION,
            OperationRequest::Restore { .. } => RESTORE_OPERATION,
        }
    }
}

/// Result of a queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Sync(SyncReport),
    Backup(BackupOutcome),
    Restore(RestoreOutcome),
    /// Whether local changes were found
    Detect(bool),
}

struct EngineInner {
    queue: OperationQueue<OperationOutcome>,
    reconciler: Arc<Reconciler>,
    backups: Arc<BackupManager>,
    detector: Arc<ChangeDetector>,
    metadata: Arc<MetadataStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    scheduler: SyncScheduler,
    lease: Option<Arc<AdvisoryLease>>,
    features: FeatureFlags,
}

/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Wire an engine from validated configuration.
    pub fn new(config: SyncEngineConfig) -> Result<Self> {
        config.validate()?;

        let SyncEngineConfig {
            object_store,
            key_value_store,
            record_store,
            status_sink,
            clock,
            remote_prefix,
            manifest_key,
            excluded_settings,
            hash_cache_capacity,
            max_concurrent_transfers,
            sync_interval,
            max_backups,
            lease_ttl,
            tombstone_retention,
            features,
        } = config;

        let filter = Arc::new(ExclusionFilter::new(
            &excluded_settings,
            [manifest_key.as_str(), LEASE_KEY],
        ));
        let hasher = Arc::new(ContentHasher::new(hash_cache_capacity));
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&record_store),
            Arc::clone(&key_value_store),
            hasher,
            Arc::clone(&filter),
        ));
        let executor = Arc::new(SyncExecutor::new(
            object_store,
            record_store,
            Arc::clone(&key_value_store),
            remote_prefix,
        ));
        let metadata = Arc::new(MetadataStore::new(
            Arc::clone(&key_value_store),
            manifest_key,
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&detector),
            Arc::clone(&executor),
            Arc::clone(&metadata),
            Arc::clone(&filter),
            Arc::clone(&clock),
            max_concurrent_transfers,
        )
        .with_tombstone_retention(tombstone_retention));
        let backups = Arc::new(BackupManager::new(
            Arc::clone(&detector),
            executor,
            Arc::clone(&metadata),
            filter,
            Arc::clone(&clock),
            max_backups,
        ));

        let events = EventBus::default();
        let queue = OperationQueue::with_observer_and_clock(
            Arc::new(StatusReporter {
                sink: status_sink,
                events: events.clone(),
            }),
            Arc::clone(&clock),
        );

        let lease = features
            .enable_advisory_lease
            .then(|| Arc::new(AdvisoryLease::new(key_value_store, lease_ttl)));
        let mut scheduler = SyncScheduler::new(sync_interval, Arc::clone(&clock));
        if let Some(lease) = &lease {
            scheduler = scheduler.with_lease(Arc::clone(lease), lease_ttl);
        }

        info!(
            periodic = features.enable_periodic_sync,
            leased = features.enable_advisory_lease,
            "Sync engine created"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                queue,
                reconciler,
                backups,
                detector,
                metadata,
                clock,
                events,
                scheduler,
                lease,
                features,
            }),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    /// Names of queued operations, oldest first.
    pub fn pending_operations(&self) -> Vec<String> {
        self.inner.queue.pending_names()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.queue.is_draining()
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    /// Queue an operation without waiting for it.
    ///
    /// Dropping the returned handle does not cancel the operation.
    pub fn enqueue(&self, request: OperationRequest) -> OperationHandle<OperationOutcome> {
        self.inner.enqueue(request)
    }

    /// Re-fingerprint local items; true when something changed.
    pub async fn detect_local_changes(&self) -> Result<bool> {
        match self.enqueue(OperationRequest::Detect).wait().await? {
            OperationOutcome::Detect(changed) => Ok(changed),
            other => Err(unexpected_outcome(DETECT_OPERATION, &other)),
        }
    }

    pub async fn sync_to_cloud(&self) -> Result<SyncReport> {
        self.sync_in(OperationRequest::SyncToCloud).await
    }

    pub async fn sync_from_cloud(&self) -> Result<SyncReport> {
        self.sync_in(OperationRequest::SyncFromCloud).await
    }

    /// Pull then push in one queued operation.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.sync_in(OperationRequest::Sync).await
    }

    pub async fn backup(&self) -> Result<BackupOutcome> {
        match self.enqueue(OperationRequest::Backup).wait().await? {
            OperationOutcome::Backup(outcome) => Ok(outcome),
            other => Err(unexpected_outcome(BACKUP_OPERATION, &other)),
        }
    }

    /// Snapshots in the object store, newest first. Read-only, not queued.
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.inner.backups.list_backups().await
    }

    pub async fn restore_backup(&self, key: impl Into<String>) -> Result<RestoreOutcome> {
        let request = OperationRequest::Restore { key: key.into() };
        match self.enqueue(request).wait().await? {
            OperationOutcome::Restore(outcome) => Ok(outcome),
            other => Err(unexpected_outcome(RESTORE_OPERATION, &other)),
        }
    }

    /// Restore-on-load pull and periodic sync, as configured.
    ///
    /// Returns `false` when the scheduler was already running.
    pub fn start(&self) -> bool {
        let features = self.inner.features;
        if features.sync_on_start {
            debug!("Queueing initial pull");
            drop(self.enqueue(OperationRequest::SyncFromCloud));
        }
        if !features.enable_periodic_sync {
            return true;
        }

        let engine = Arc::downgrade(&self.inner);
        self.inner.scheduler.start(move || scheduled_tick(&engine))
    }

    /// Stop periodic sync and give up the lease. Queued work still runs.
    pub fn shutdown(&self) {
        self.inner.scheduler.stop();
        if let Some(lease) = &self.inner.lease {
            if let Err(err) = lease.release() {
                warn!("Failed to release sync lease: {}", err);
            }
        }
        info!("Sync engine shut down");
    }

    async fn sync_in(&self, request: OperationRequest) -> Result<SyncReport> {
        match self.enqueue(request).wait().await? {
            OperationOutcome::Sync(report) => Ok(report),
            other => Err(unexpected_outcome(SYNC_OPERATION, &other)),
        }
    }
}

impl EngineInner {
    #[instrument(skip(self), fields(operation = request.name()))]
    fn enqueue(&self, request: OperationRequest) -> OperationHandle<OperationOutcome> {
        let name = request.name();
        let action: core_async::BoxFuture<'static, Result<OperationOutcome>> = match request {
            OperationRequest::Detect => {
                let detector = Arc::clone(&self.detector);
                let metadata = Arc::clone(&self.metadata);
                let clock = Arc::clone(&self.clock);
                Box::pin(async move {
                    let mut manifest = metadata.load()?;
                    let scan = detector
                        .scan(&mut manifest, clock.unix_timestamp_millis())
                        .await?;
                    if scan.changed {
                        metadata.save(&manifest)?;
                    }
                    Ok(OperationOutcome::Detect(scan.changed))
                })
            }
            OperationRequest::SyncToCloud => self.reconcile_action(SyncDirection::Push),
            OperationRequest::SyncFromCloud => self.reconcile_action(SyncDirection::Pull),
            OperationRequest::Sync => self.reconcile_action(SyncDirection::Full),
            OperationRequest::Backup => {
                let backups = Arc::clone(&self.backups);
                Box::pin(async move { Ok(OperationOutcome::Backup(backups.create_backup().await?)) })
            }
            OperationRequest::Restore { key } => {
                let backups = Arc::clone(&self.backups);
                Box::pin(async move {
                    Ok(OperationOutcome::Restore(backups.restore_backup(&key).await?))
                })
            }
        };

        self.queue.enqueue(name, action)
    }

    fn reconcile_action(
        &self,
        direction: SyncDirection,
    ) -> core_async::BoxFuture<'static, Result<OperationOutcome>> {
        let reconciler = Arc::clone(&self.reconciler);
        Box::pin(async move { Ok(OperationOutcome::Sync(reconciler.reconcile(direction).await?)) })
    }
}

/// Scheduler callback; false once the engine is gone.
fn scheduled_tick(engine: &Weak<EngineInner>) -> bool {
    let Some(engine) = engine.upgrade() else {
        return false;
    };

    if engine.queue.contains(SYNC_OPERATION) {
        debug!("Sync already queued, skipping scheduled tick");
    } else {
        debug!("Scheduled sync");
        drop(engine.enqueue(OperationRequest::Sync));
    }
    true
}

fn unexpected_outcome(operation: &str, outcome: &OperationOutcome) -> SyncError {
    SyncError::OperationFailed(format!(
        "{} produced an unexpected outcome: {:?}",
        operation, outcome
    ))
}

// ============================================================================
// Status reporting
// ============================================================================

/// Mirrors queue activity to the host status sink and the event bus.
struct StatusReporter {
    sink: Arc<dyn StatusSink>,
    events: EventBus,
}

impl StatusReporter {
    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine.
        let _ = self.events.emit(event);
    }
}

impl QueueObserver<OperationOutcome> for StatusReporter {
    fn on_start(&self, name: &str) {
        self.sink
            .report_status(SyncState::Syncing, &format!("Running {}", name));
        self.emit(CoreEvent::Sync(SyncEvent::Started {
            operation: name.to_string(),
        }));
    }

    fn on_finish(&self, name: &str, result: &Result<OperationOutcome>) {
        match result {
            Ok(OperationOutcome::Sync(report)) => {
                if report.has_failures() {
                    self.sink.report_status(
                        SyncState::Warning,
                        &format!("{} item(s) could not be synced", report.failures),
                    );
                } else {
                    self.sink.report_status(
                        SyncState::Success,
                        &format!("Synced ({} up, {} down)", report.pushed, report.pulled),
                    );
                }
                self.emit(CoreEvent::Sync(completed_event(name, report)));
            }
            Ok(OperationOutcome::Backup(outcome)) => {
                self.sink.report_status(
                    SyncState::Success,
                    &format!("Backed up {} item(s)", outcome.item_count),
                );
                self.emit(CoreEvent::Backup(BackupEvent::Created {
                    key: outcome.key.clone(),
                    item_count: outcome.item_count as u64,
                    pruned: outcome.pruned as u64,
                }));
            }
            Ok(OperationOutcome::Restore(outcome)) => {
                self.sink.report_status(
                    SyncState::Success,
                    &format!("Restored {} item(s)", outcome.restored),
                );
                self.emit(CoreEvent::Backup(BackupEvent::Restored {
                    key: outcome.key.clone(),
                    item_count: outcome.restored as u64,
                }));
            }
            Ok(OperationOutcome::Detect(changed)) => {
                let message = if *changed {
                    "Local changes detected"
                } else {
                    "No local changes"
                };
                self.sink.report_status(SyncState::Success, message);
            }
            Err(err) => {
                let message = err.to_string();
                self.sink.report_status(SyncState::Error, &message);
                let event = if name == BACKUP_OPERATION || name == RESTORE_OPERATION {
                    CoreEvent::Backup(BackupEvent::Failed { message })
                } else {
                    CoreEvent::Sync(SyncEvent::Failed {
                        operation: name.to_string(),
                        message,
                    })
                };
                self.emit(event);
            }
        }
    }

    fn on_idle(&self) {
        self.sink.report_status(SyncState::Idle, "");
        self.emit(CoreEvent::Sync(SyncEvent::Idle));
    }
}

fn completed_event(name: &str, report: &SyncReport) -> SyncEvent {
    SyncEvent::Completed {
        operation: name.to_string(),
        direction: report.direction.to_string(),
        pushed: report.pushed as u64,
        pulled: report.pulled as u64,
        deleted_local: report.deleted_local as u64,
        deleted_remote: report.deleted_remote as u64,
        failures: report.failures as u64,
        bootstrapped: report.bootstrapped,
    }
}
