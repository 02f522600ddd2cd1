//! # Incremental Sync Engine
//!
//! Mirrors a web app's local state (flat key-value settings and a structured
//! record store) to a remote object store, and restores it on load.
//!
//! ## Overview
//!
//! A local manifest records a fingerprint and timestamps per item. Each sync
//! operation re-fingerprints local items, diffs the local manifest against
//! the remote `metadata.json`, and transfers only what changed:
//!
//! - items dirty locally (`modifiedAt > syncedAt`) are pushed
//! - items that differ remotely *and* are newer remotely are pulled
//! - deletions travel as tombstones in the manifests' `deleted` sets
//!
//! Operations are serialized through a FIFO queue so a manual sync and a
//! timer-triggered one never overlap.
//!
//! ## Components
//!
//! - **Content Hasher** (`hasher`): memoized short SHA-256 fingerprints
//! - **Manifest** (`manifest`): manifest types and the local Metadata Store
//! - **Exclusion Filter** (`exclusion`): which settings never sync
//! - **Change Detector** (`detector`): local scan and manifest update
//! - **Sync Executor** (`executor`): remote key layout and transfers
//! - **Reconciler** (`reconciler`): push / pull / full diff logic
//! - **Operation Queue** (`queue`): serialized operation execution
//! - **Scheduler** (`scheduler`) and **Advisory Lease** (`lease`): periodic sync
//! - **Backup Manager** (`backup`): full snapshots and restore
//! - **Sync Engine** (`engine`): the context object hosts interact with

pub mod backup;
pub mod detector;
pub mod engine;
pub mod error;
pub mod exclusion;
pub mod executor;
pub mod hasher;
pub mod lease;
pub mod manifest;
pub mod queue;
pub mod reconciler;
pub mod scheduler;

pub use backup::{BackupInfo, BackupManager, BackupOutcome, BackupSnapshot, RestoreOutcome};
pub use detector::{ChangeDetector, LocalScan};
pub use engine::{OperationOutcome, OperationRequest, SyncEngine};
pub use error::{Result, SyncError};
pub use exclusion::ExclusionFilter;
pub use executor::{RemoteManifest, SyncExecutor};
pub use hasher::ContentHasher;
pub use lease::{AdvisoryLease, LeaseRecord};
pub use manifest::{
    ItemContent, ItemKind, ItemPayload, MetadataEntry, MetadataStore, SyncManifest,
};
pub use queue::{OperationHandle, OperationQueue, QueueObserver};
pub use reconciler::{Reconciler, SyncDirection, SyncReport};
pub use scheduler::SyncScheduler;
