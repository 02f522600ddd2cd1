//! In-memory bridges shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::{
    error::Result as BridgeResult, BridgeError, Clock, KeyValueStore, ObjectInfo, ObjectStore,
    Record, RecordStore, StatusSink, SyncState,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_runtime::config::{SyncEngineConfig, SyncEngineConfigBuilder};
use core_sync::{SyncEngine, SyncManifest};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const MANIFEST_KEY: &str = "cloudsync::manifest";

// ============================================================================
// Object store
// ============================================================================

/// Remote side shared by several simulated devices.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    failing_puts: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every `put` to `key` fail until cleared.
    pub fn fail_puts_to(&self, key: &str) {
        self.failing_puts.lock().unwrap().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_puts.lock().unwrap().clear();
    }

    pub fn insert_raw(&self, key: &str, body: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::copy_from_slice(body));
    }

    pub fn remove_raw(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn json(&self, key: &str) -> serde_json::Value {
        let objects = self.objects.lock().unwrap();
        let body = objects.get(key).unwrap_or_else(|| panic!("missing object {}", key));
        serde_json::from_slice(body).unwrap()
    }

    pub fn manifest(&self) -> SyncManifest {
        let objects = self.objects.lock().unwrap();
        SyncManifest::from_json(objects.get("metadata.json").expect("remote manifest")).unwrap()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> BridgeResult<()> {
        if self.failing_puts.lock().unwrap().contains(key) {
            return Err(BridgeError::OperationFailed(format!("injected failure for {}", key)));
        }
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> BridgeResult<Option<Bytes>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> BridgeResult<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, body)| ObjectInfo {
                key: key.clone(),
                size: body.len() as u64,
                last_modified: None,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Local stores
// ============================================================================

#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn delete(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.value(key))
    }

    fn set(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.put(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> BridgeResult<()> {
        self.delete(key);
        Ok(())
    }

    fn keys(&self) -> BridgeResult<Vec<String>> {
        Ok(self.values.lock().unwrap().keys().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryRecordStore {
    pub fn insert(&self, id: &str, value: serde_json::Value) {
        self.records.lock().unwrap().insert(id.to_string(), value);
    }

    pub fn value(&self, id: &str) -> Option<serde_json::Value> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.records.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_all(&self) -> BridgeResult<Vec<Record>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(id, value)| Record::new(id.clone(), value.clone()))
            .collect())
    }

    async fn get(&self, id: &str) -> BridgeResult<Option<Record>> {
        Ok(self.value(id).map(|value| Record::new(id, value)))
    }

    async fn put(&self, record: Record) -> BridgeResult<()> {
        self.insert(&record.id, record.value);
        Ok(())
    }

    async fn delete(&self, id: &str) -> BridgeResult<()> {
        self.remove(id);
        Ok(())
    }
}

// ============================================================================
// Host integration
// ============================================================================

/// Clock the test moves by hand.
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(millis)))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0.load(Ordering::SeqCst))
            .single()
            .expect("valid timestamp")
    }

    fn unix_timestamp_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingStatusSink {
    reports: Mutex<Vec<(SyncState, String)>>,
}

impl RecordingStatusSink {
    pub fn states(&self) -> Vec<SyncState> {
        self.reports.lock().unwrap().iter().map(|(state, _)| *state).collect()
    }
}

impl StatusSink for RecordingStatusSink {
    fn report_status(&self, state: SyncState, message: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((state, message.to_string()));
    }
}

// ============================================================================
// Device
// ============================================================================

/// One simulated app instance talking to a shared remote.
pub struct Device {
    pub records: Arc<MemoryRecordStore>,
    pub settings: Arc<MemoryKeyValueStore>,
    pub clock: Arc<ManualClock>,
    pub status: Arc<RecordingStatusSink>,
    pub engine: SyncEngine,
}

impl Device {
    pub fn new(remote: &Arc<MemoryObjectStore>, now: i64) -> Self {
        Self::with_config(remote, now, |builder| builder)
    }

    pub fn with_config(
        remote: &Arc<MemoryObjectStore>,
        now: i64,
        customize: impl FnOnce(SyncEngineConfigBuilder) -> SyncEngineConfigBuilder,
    ) -> Self {
        let records = Arc::new(MemoryRecordStore::default());
        let settings = Arc::new(MemoryKeyValueStore::default());
        let clock = ManualClock::at(now);
        let status = Arc::new(RecordingStatusSink::default());

        let builder = SyncEngineConfig::builder()
            .object_store(remote.clone())
            .key_value_store(settings.clone())
            .record_store(records.clone())
            .status_sink(status.clone())
            .clock(clock.clone())
            .enable_periodic_sync(false)
            .sync_on_start(false);
        let config = customize(builder).build().expect("valid config");

        Self {
            records,
            settings,
            clock,
            status,
            engine: SyncEngine::new(config).expect("engine"),
        }
    }

    /// Local manifest as persisted.
    pub fn manifest(&self) -> SyncManifest {
        match self.settings.value(MANIFEST_KEY) {
            Some(raw) => SyncManifest::from_json(raw.as_bytes()).unwrap(),
            None => SyncManifest::default(),
        }
    }
}
