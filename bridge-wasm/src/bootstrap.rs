//! Convenience helpers for wiring the browser bridges together.
//!
//! Host shells can use [`build_wasm_bridges`] to construct every adapter the
//! sync engine needs in one call. This mirrors what `bridge-desktop` offers
//! natively and gives `core-service` a single entry point on `wasm32`.

use std::sync::Arc;

use bridge_traits::{
    error::Result as BridgeResult,
    http::HttpClient,
    status::{NoopStatusSink, StatusSink},
    storage::{KeyValueStore, RecordStore},
};

use crate::{JsStatusSink, LocalStorageKeyValueStore, WasmHttpClient, WasmRecordStore};

/// Configuration for [`build_wasm_bridges`].
#[derive(Debug, Clone)]
pub struct WasmBridgeConfig {
    /// Host object store holding the structured records.
    pub record_store: String,
    /// Scope settings under this namespace instead of all of `localStorage`.
    pub settings_namespace: Option<String>,
    /// Receives `(state, message)` for each status change.
    pub status_callback: Option<js_sys::Function>,
}

impl WasmBridgeConfig {
    /// Records in `record_store`, settings over all of `localStorage`.
    pub fn new(record_store: impl Into<String>) -> Self {
        Self {
            record_store: record_store.into(),
            settings_namespace: None,
            status_callback: None,
        }
    }

    /// Scope settings under `namespace`.
    pub fn with_settings_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.settings_namespace = Some(namespace.into());
        self
    }

    /// Forward status changes to `callback`.
    pub fn with_status_callback(mut self, callback: js_sys::Function) -> Self {
        self.status_callback = Some(callback);
        self
    }
}

impl Default for WasmBridgeConfig {
    fn default() -> Self {
        Self::new("records")
    }
}

/// Browser bridge objects ready for injection into the engine.
pub struct WasmBridgeSet {
    /// `fetch`-backed HTTP client for HTTP object stores.
    pub http_client: Arc<dyn HttpClient>,
    /// `localStorage` settings.
    pub settings: Arc<dyn KeyValueStore>,
    /// Host IndexedDB records.
    pub records: Arc<dyn RecordStore>,
    /// JS callback sink, or a no-op when none was configured.
    pub status: Arc<dyn StatusSink>,
}

/// Build the default browser bridge stack.
pub fn build_wasm_bridges(config: WasmBridgeConfig) -> BridgeResult<WasmBridgeSet> {
    let settings: Arc<dyn KeyValueStore> = match &config.settings_namespace {
        Some(namespace) => Arc::new(LocalStorageKeyValueStore::scoped(namespace)?),
        None => Arc::new(LocalStorageKeyValueStore::new()?),
    };
    let status: Arc<dyn StatusSink> = match config.status_callback {
        Some(callback) => Arc::new(JsStatusSink::new(callback)),
        None => Arc::new(NoopStatusSink),
    };

    Ok(WasmBridgeSet {
        http_client: Arc::new(WasmHttpClient::new()?),
        settings,
        records: Arc::new(WasmRecordStore::new(config.record_store)),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn builds_scoped_settings() {
        let ns = format!("bootstrap-{}", js_sys::Date::now());
        let set = build_wasm_bridges(WasmBridgeConfig::default().with_settings_namespace(&ns))
            .unwrap();

        set.settings.set("theme", "dark").unwrap();
        assert_eq!(set.settings.keys().unwrap(), vec!["theme"]);
        set.settings.remove("theme").unwrap();
    }
}
