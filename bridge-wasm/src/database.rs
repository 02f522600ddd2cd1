//! `RecordStore` bridged to a host-provided JavaScript store
//!
//! The extension keeps its structured data (chats, prompts) in IndexedDB,
//! which is far easier to drive from JavaScript than through raw `web-sys`
//! cursors. This adapter only converts values and errors; the host owns the
//! database.
//!
//! # Host Requirements
//!
//! The page must expose a global `bridgeWasmRecords` namespace whose async
//! functions (returning `Promise`) operate on a named object store:
//!
//! - `getAll(store) -> [{ id, value }]`
//! - `get(store, id) -> { id, value } | null | undefined`
//! - `put(store, { id, value })`
//! - `delete(store, id)`
//!
//! Each call is expected to run in its own IndexedDB transaction.

use async_trait::async_trait;
use bridge_traits::{
    error::Result as BridgeResult,
    storage::{Record, RecordStore},
};
use js_sys::Promise;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::error::{WasmError, WasmResult};

/// Record store backed by one host object store
#[derive(Debug, Clone)]
pub struct WasmRecordStore {
    store_name: String,
}

impl WasmRecordStore {
    /// Address the host object store called `store_name`
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
        }
    }

    /// Name of the host object store
    pub fn store_name(&self) -> &str {
        &self.store_name
    }
}

#[async_trait(?Send)]
impl RecordStore for WasmRecordStore {
    async fn get_all(&self) -> BridgeResult<Vec<Record>> {
        let rows = call_host(host_get_all(&self.store_name), "getAll").await?;
        let records: Vec<Record> = from_value(rows).map_err(WasmError::from)?;
        debug!(store = %self.store_name, count = records.len(), "Loaded records");
        Ok(records)
    }

    async fn get(&self, id: &str) -> BridgeResult<Option<Record>> {
        let row = call_host(host_get(&self.store_name, id), "get").await?;
        if row.is_null() || row.is_undefined() {
            return Ok(None);
        }
        Ok(Some(from_value(row).map_err(WasmError::from)?))
    }

    async fn put(&self, record: Record) -> BridgeResult<()> {
        let js_record = to_js_value(&record)?;
        call_host(host_put(&self.store_name, &js_record), "put").await?;
        debug!(store = %self.store_name, id = %record.id, "Stored record");
        Ok(())
    }

    async fn delete(&self, id: &str) -> BridgeResult<()> {
        call_host(host_delete(&self.store_name, id), "delete").await?;
        debug!(store = %self.store_name, id = id, "Deleted record");
        Ok(())
    }
}

/// JSON documents must arrive as plain objects, not `Map`s
fn to_js_value<T: Serialize + ?Sized>(value: &T) -> WasmResult<JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(WasmError::from)
}

async fn call_host(promise: Result<Promise, JsValue>, call: &str) -> WasmResult<JsValue> {
    let context = format!("bridgeWasmRecords.{call}");
    let promise = promise.map_err(|err| WasmError::from_js(&context, err))?;
    JsFuture::from(promise)
        .await
        .map_err(|err| WasmError::from_js(&context, err))
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = bridgeWasmRecords, js_name = getAll)]
    fn host_get_all(store: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = bridgeWasmRecords, js_name = get)]
    fn host_get(store: &str, id: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = bridgeWasmRecords, js_name = put)]
    fn host_put(store: &str, record: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = bridgeWasmRecords, js_name = delete)]
    fn host_delete(store: &str, id: &str) -> Result<Promise, JsValue>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn record_crosses_as_plain_object() {
        let record = Record::new("c1", json!({"title": "hello", "tags": ["a"]}));
        let js = to_js_value(&record).unwrap();

        assert!(js.is_object());
        assert!(!js.is_instance_of::<js_sys::Map>());
        let back: Record = from_value(js).unwrap();
        assert_eq!(back, record);
    }

    #[wasm_bindgen_test]
    async fn missing_host_namespace_is_an_error() {
        // No bridgeWasmRecords global is installed in the test page.
        let store = WasmRecordStore::new("records");
        assert!(store.get_all().await.is_err());
    }
}
