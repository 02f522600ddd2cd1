//! # Sync Engine Configuration
//!
//! Provides configuration management for the cloud state sync engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`SyncEngineConfig`] holding every host bridge and tuning knob the engine
//! needs. Validation is fail-fast: `build()` refuses to produce a config when
//! a required bridge is missing or a value is out of range, so the engine
//! never discovers a misconfiguration halfway through a sync.
//!
//! ## Required Dependencies
//!
//! - `ObjectStore` - Remote blob store holding `metadata.json` and item objects
//! - `KeyValueStore` - Flat settings storage (also holds the local manifest)
//! - `RecordStore` - Structured record store
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `StatusSink` - UI status signals (default: discard)
//! - `Clock` - Time source for manifest timestamps (default: system clock)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncEngineConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = SyncEngineConfig::builder()
//!     .object_store(Arc::new(MyBucket::new()))
//!     .key_value_store(Arc::new(MyLocalStorage))
//!     .record_store(Arc::new(MyIndexedDb))
//!     .excluded_settings("draft_*, debugMode")
//!     .sync_interval(Duration::from_secs(120))
//!     .enable_advisory_lease(true)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Missing bridges produce [`Error::CapabilityMissing`] with an actionable
//! message; invalid values produce [`Error::Config`].

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, KeyValueStore, NoopStatusSink, ObjectStore, RecordStore, StatusSink, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;

/// Local key-value key holding the local manifest.
pub const DEFAULT_MANIFEST_KEY: &str = "cloudsync::manifest";

/// Fingerprints memoized before the hash cache is cleared.
pub const DEFAULT_HASH_CACHE_CAPACITY: usize = 1000;

/// Item transfers allowed in flight within one reconciliation.
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 4;

/// Period between scheduled sync operations.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Backup snapshots retained after pruning.
pub const DEFAULT_MAX_BACKUPS: usize = 10;

/// Age after which an advisory lease heartbeat is considered stale.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(2 * 60);

/// Age after which a remote deletion tombstone is purged.
pub const DEFAULT_TOMBSTONE_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const MAX_CONCURRENT_TRANSFERS_LIMIT: usize = 64;
const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the sync engine.
///
/// Use [`SyncEngineConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SyncEngineConfig {
    /// Remote blob store (required)
    pub object_store: Arc<dyn ObjectStore>,

    /// Flat settings storage (required)
    pub key_value_store: Arc<dyn KeyValueStore>,

    /// Structured record store (required)
    pub record_store: Arc<dyn RecordStore>,

    /// UI status receiver
    pub status_sink: Arc<dyn StatusSink>,

    /// Time source for manifest timestamps
    pub clock: Arc<dyn Clock>,

    /// Prefix prepended to every remote object key; empty or ending in `/`
    pub remote_prefix: String,

    /// Local key-value key for the local manifest
    pub manifest_key: String,

    /// User exclusion list: comma-separated keys, trailing `*` for prefixes
    pub excluded_settings: String,

    /// Hash memo entries kept before the cache is cleared wholesale
    pub hash_cache_capacity: usize,

    /// Concurrent item transfers per reconciliation
    pub max_concurrent_transfers: usize,

    /// Period between scheduled syncs
    pub sync_interval: Duration,

    /// Backup snapshots kept after pruning
    pub max_backups: usize,

    /// Advisory lease staleness threshold
    pub lease_ttl: Duration,

    /// How long the remote manifest keeps a deletion tombstone; devices
    /// offline longer than this may re-upload the deleted item
    pub tombstone_retention: Duration,

    /// Feature flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for SyncEngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngineConfig")
            .field("object_store", &"ObjectStore { ... }")
            .field("key_value_store", &"KeyValueStore { ... }")
            .field("record_store", &"RecordStore { ... }")
            .field("status_sink", &"StatusSink { ... }")
            .field("clock", &"Clock { ... }")
            .field("remote_prefix", &self.remote_prefix)
            .field("manifest_key", &self.manifest_key)
            .field("excluded_settings", &self.excluded_settings)
            .field("hash_cache_capacity", &self.hash_cache_capacity)
            .field("max_concurrent_transfers", &self.max_concurrent_transfers)
            .field("sync_interval", &self.sync_interval)
            .field("max_backups", &self.max_backups)
            .field("lease_ttl", &self.lease_ttl)
            .field("tombstone_retention", &self.tombstone_retention)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional engine behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Run the timer that enqueues a full sync every `sync_interval`
    pub enable_periodic_sync: bool,

    /// Only the tab holding the advisory lease runs scheduled syncs
    /// (requires periodic sync)
    pub enable_advisory_lease: bool,

    /// Enqueue a pull when the engine starts (restore on load)
    pub sync_on_start: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_periodic_sync: true,
            enable_advisory_lease: false,
            sync_on_start: true,
        }
    }
}

impl SyncEngineConfig {
    /// Creates a new builder for constructing a `SyncEngineConfig`.
    pub fn builder() -> SyncEngineConfigBuilder {
        SyncEngineConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Manifest key is not empty
    /// - Remote prefix is relative and `/`-terminated when set
    /// - Numeric limits are within range
    /// - Feature flags are consistent with each other
    pub fn validate(&self) -> Result<()> {
        if self.manifest_key.trim().is_empty() {
            return Err(Error::Config("Manifest key cannot be empty".to_string()));
        }

        if self.remote_prefix.starts_with('/') {
            return Err(Error::Config(
                "Remote prefix must be relative (no leading '/')".to_string(),
            ));
        }

        if !self.remote_prefix.is_empty() && !self.remote_prefix.ends_with('/') {
            return Err(Error::Config(
                "Remote prefix must end with '/' when set".to_string(),
            ));
        }

        if self.hash_cache_capacity == 0 {
            return Err(Error::Config(
                "Hash cache capacity must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_transfers == 0
            || self.max_concurrent_transfers > MAX_CONCURRENT_TRANSFERS_LIMIT
        {
            return Err(Error::Config(format!(
                "Concurrent transfers must be between 1 and {}",
                MAX_CONCURRENT_TRANSFERS_LIMIT
            )));
        }

        if self.sync_interval < MIN_SYNC_INTERVAL {
            return Err(Error::Config(
                "Sync interval must be at least 1 second".to_string(),
            ));
        }

        if self.max_backups == 0 {
            return Err(Error::Config(
                "At least one backup must be retained".to_string(),
            ));
        }

        if self.lease_ttl.is_zero() {
            return Err(Error::Config(
                "Lease TTL must be greater than 0".to_string(),
            ));
        }

        if self.tombstone_retention.is_zero() {
            return Err(Error::Config(
                "Tombstone retention must be greater than 0".to_string(),
            ));
        }

        if self.features.enable_advisory_lease && !self.features.enable_periodic_sync {
            return Err(Error::Config(
                "Advisory lease enabled but periodic sync is disabled. \
                 The lease only gates scheduled syncs; enable both or neither."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`SyncEngineConfig`] instances.
///
/// Call [`build()`](SyncEngineConfigBuilder::build) once every required
/// bridge is set.
#[derive(Default)]
pub struct SyncEngineConfigBuilder {
    object_store: Option<Arc<dyn ObjectStore>>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    record_store: Option<Arc<dyn RecordStore>>,
    status_sink: Option<Arc<dyn StatusSink>>,
    clock: Option<Arc<dyn Clock>>,
    remote_prefix: Option<String>,
    manifest_key: Option<String>,
    excluded_settings: Option<String>,
    hash_cache_capacity: Option<usize>,
    max_concurrent_transfers: Option<usize>,
    sync_interval: Option<Duration>,
    max_backups: Option<usize>,
    lease_ttl: Option<Duration>,
    tombstone_retention: Option<Duration>,
    features: FeatureFlags,
}

impl SyncEngineConfigBuilder {
    /// Sets the remote object store.
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Sets the local key-value settings storage.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    /// Sets the structured record store.
    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    /// Sets the status sink notified on every state transition.
    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    /// Sets the clock. Tests inject a fixed clock here.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the remote key prefix.
    ///
    /// A missing trailing `/` is added, so `"users/42"` and `"users/42/"`
    /// are equivalent.
    pub fn remote_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.remote_prefix = Some(prefix);
        self
    }

    /// Sets the local key-value key holding the local manifest.
    pub fn manifest_key(mut self, key: impl Into<String>) -> Self {
        self.manifest_key = Some(key.into());
        self
    }

    /// Sets the user exclusion list (`"a, b, prefix_*"`).
    pub fn excluded_settings(mut self, list: impl Into<String>) -> Self {
        self.excluded_settings = Some(list.into());
        self
    }

    pub fn hash_cache_capacity(mut self, capacity: usize) -> Self {
        self.hash_cache_capacity = Some(capacity);
        self
    }

    pub fn max_concurrent_transfers(mut self, limit: usize) -> Self {
        self.max_concurrent_transfers = Some(limit);
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    pub fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = Some(count);
        self
    }

    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = Some(ttl);
        self
    }

    /// Sets how long deletion tombstones stay in the remote manifest.
    pub fn tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = Some(retention);
        self
    }

    /// Enables or disables the periodic sync timer.
    pub fn enable_periodic_sync(mut self, enabled: bool) -> Self {
        self.features.enable_periodic_sync = enabled;
        self
    }

    /// Enables or disables the cross-tab advisory lease.
    pub fn enable_advisory_lease(mut self, enabled: bool) -> Self {
        self.features.enable_advisory_lease = enabled;
        self
    }

    /// Enables or disables the initial pull when the engine starts.
    pub fn sync_on_start(mut self, enabled: bool) -> Self {
        self.features.sync_on_start = enabled;
        self
    }

    /// Replaces all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `SyncEngineConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(SyncEngineConfig)` on success, or an error if:
    /// - Required bridges are missing (ObjectStore, KeyValueStore, RecordStore)
    /// - Configuration values are invalid
    /// - Feature flags are inconsistent
    pub fn build(self) -> Result<SyncEngineConfig> {
        let object_store = self.object_store.ok_or_else(|| {
            Error::capability_missing(
                "ObjectStore",
                "An ObjectStore implementation is required to reach the remote side. \
                 Desktop: use bridge_desktop::FsObjectStore or an HTTP-backed store. \
                 Web: inject provider_google_drive::GoogleDriveObjectStore or an S3 adapter.",
            )
        })?;

        let key_value_store = self.key_value_store.ok_or_else(|| {
            Error::capability_missing(
                "KeyValueStore",
                "A KeyValueStore implementation is required for settings and the local manifest. \
                 Desktop: use bridge_desktop::JsonFileKeyValueStore. \
                 Web: use bridge_wasm::LocalStorageKeyValueStore.",
            )
        })?;

        let record_store = self.record_store.ok_or_else(|| {
            Error::capability_missing(
                "RecordStore",
                "A RecordStore implementation is required for structured records. \
                 Desktop: use bridge_desktop::SqliteRecordStore. \
                 Web: use bridge_wasm::WasmRecordStore over IndexedDB.",
            )
        })?;

        let config = SyncEngineConfig {
            object_store,
            key_value_store,
            record_store,
            status_sink: self
                .status_sink
                .unwrap_or_else(|| Arc::new(NoopStatusSink)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            remote_prefix: self.remote_prefix.unwrap_or_default(),
            manifest_key: self
                .manifest_key
                .unwrap_or_else(|| DEFAULT_MANIFEST_KEY.to_string()),
            excluded_settings: self.excluded_settings.unwrap_or_default(),
            hash_cache_capacity: self
                .hash_cache_capacity
                .unwrap_or(DEFAULT_HASH_CACHE_CAPACITY),
            max_concurrent_transfers: self
                .max_concurrent_transfers
                .unwrap_or(DEFAULT_MAX_CONCURRENT_TRANSFERS),
            sync_interval: self.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL),
            max_backups: self.max_backups.unwrap_or(DEFAULT_MAX_BACKUPS),
            lease_ttl: self.lease_ttl.unwrap_or(DEFAULT_LEASE_TTL),
            tombstone_retention: self
                .tombstone_retention
                .unwrap_or(DEFAULT_TOMBSTONE_RETENTION),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{BridgeError, ObjectInfo, Record};
    use bytes::Bytes;

    type BridgeResult<T> = std::result::Result<T, BridgeError>;

    struct NullObjectStore;

    #[async_trait]
    impl ObjectStore for NullObjectStore {
        async fn put(&self, _key: &str, _body: Bytes, _content_type: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get(&self, _key: &str) -> BridgeResult<Option<Bytes>> {
            Ok(None)
        }

        async fn list(&self, _prefix: &str) -> BridgeResult<Vec<ObjectInfo>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullKeyValueStore;

    impl KeyValueStore for NullKeyValueStore {
        fn get(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        fn remove(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        fn keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct NullRecordStore;

    #[async_trait]
    impl RecordStore for NullRecordStore {
        async fn get_all(&self) -> BridgeResult<Vec<Record>> {
            Ok(Vec::new())
        }

        async fn get(&self, _id: &str) -> BridgeResult<Option<Record>> {
            Ok(None)
        }

        async fn put(&self, _record: Record) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete(&self, _id: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn complete_builder() -> SyncEngineConfigBuilder {
        SyncEngineConfig::builder()
            .object_store(Arc::new(NullObjectStore))
            .key_value_store(Arc::new(NullKeyValueStore))
            .record_store(Arc::new(NullRecordStore))
    }

    #[test]
    fn test_builder_applies_defaults() {
        let config = complete_builder().build().unwrap();

        assert_eq!(config.manifest_key, DEFAULT_MANIFEST_KEY);
        assert_eq!(config.remote_prefix, "");
        assert_eq!(config.hash_cache_capacity, 1000);
        assert_eq!(config.max_concurrent_transfers, 4);
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.max_backups, 10);
        assert_eq!(config.lease_ttl, Duration::from_secs(120));
        assert_eq!(config.tombstone_retention, Duration::from_secs(30 * 86_400));
        assert_eq!(config.features, FeatureFlags::default());
    }

    #[test]
    fn test_builder_requires_object_store() {
        let result = SyncEngineConfig::builder()
            .key_value_store(Arc::new(NullKeyValueStore))
            .record_store(Arc::new(NullRecordStore))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "ObjectStore")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_requires_key_value_store() {
        let result = SyncEngineConfig::builder()
            .object_store(Arc::new(NullObjectStore))
            .record_store(Arc::new(NullRecordStore))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "KeyValueStore"
        ));
    }

    #[test]
    fn test_builder_requires_record_store() {
        let result = SyncEngineConfig::builder()
            .object_store(Arc::new(NullObjectStore))
            .key_value_store(Arc::new(NullKeyValueStore))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { ref capability, .. }) if capability == "RecordStore"
        ));
    }

    #[test]
    fn test_remote_prefix_is_normalized() {
        let config = complete_builder().remote_prefix("users/42").build().unwrap();

        assert_eq!(config.remote_prefix, "users/42/");

        let unchanged = complete_builder().remote_prefix("users/42/").build().unwrap();
        assert_eq!(unchanged.remote_prefix, "users/42/");
    }

    #[test]
    fn test_validate_rejects_absolute_prefix() {
        let result = complete_builder().remote_prefix("/root").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(complete_builder().hash_cache_capacity(0).build().is_err());
        assert!(complete_builder().max_concurrent_transfers(0).build().is_err());
        assert!(complete_builder().max_concurrent_transfers(65).build().is_err());
        assert!(complete_builder().max_backups(0).build().is_err());
        assert!(complete_builder().lease_ttl(Duration::ZERO).build().is_err());
        assert!(complete_builder()
            .tombstone_retention(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_sub_second_interval() {
        let result = complete_builder()
            .sync_interval(Duration::from_millis(10))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_manifest_key() {
        let result = complete_builder().manifest_key("  ").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_lease_requires_periodic_sync() {
        let result = complete_builder()
            .enable_periodic_sync(false)
            .enable_advisory_lease(true)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let config = complete_builder()
            .enable_periodic_sync(true)
            .enable_advisory_lease(true)
            .build()
            .unwrap();
        assert!(config.features.enable_advisory_lease);
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = complete_builder().excluded_settings("draft_*").build().unwrap();
        let debug = format!("{:?}", config);

        assert!(debug.contains("ObjectStore { ... }"));
        assert!(debug.contains("draft_*"));
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = complete_builder().build().unwrap();
        let cloned = config.clone();
        assert!(Arc::ptr_eq(&config.object_store, &cloned.object_store));
    }
}
