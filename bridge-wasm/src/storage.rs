//! `KeyValueStore` over `window.localStorage`
//!
//! The extension's settings live directly in `localStorage`, so the default
//! store is unscoped: `keys()` enumerates everything the page has stored.
//! Tests and multi-tenant shells can scope the store under a namespace
//! (`{namespace}::settings::{key}`) to avoid clobbering each other.

use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::KeyValueStore,
};

use crate::error::js_error;

const SETTINGS_PREFIX: &str = "settings";

fn local_storage() -> BridgeResult<web_sys::Storage> {
    let window = web_sys::window().ok_or_else(|| BridgeError::NotAvailable("window".into()))?;
    window
        .local_storage()
        .map_err(|err| js_error("localStorage", err))?
        .ok_or_else(|| BridgeError::NotAvailable("localStorage".into()))
}

fn namespaced_prefix(namespace: &str) -> String {
    format!("{namespace}::{SETTINGS_PREFIX}::")
}

/// Browser settings storage
#[derive(Clone)]
pub struct LocalStorageKeyValueStore {
    storage: web_sys::Storage,
    prefix: String,
}

impl LocalStorageKeyValueStore {
    /// Store over the whole of `localStorage`
    pub fn new() -> BridgeResult<Self> {
        Ok(Self {
            storage: local_storage()?,
            prefix: String::new(),
        })
    }

    /// Store confined to keys under `namespace`
    pub fn scoped(namespace: &str) -> BridgeResult<Self> {
        Ok(Self {
            storage: local_storage()?,
            prefix: namespaced_prefix(namespace),
        })
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl KeyValueStore for LocalStorageKeyValueStore {
    fn get(&self, key: &str) -> BridgeResult<Option<String>> {
        self.storage
            .get_item(&self.key_for(key))
            .map_err(|err| js_error("get setting", err))
    }

    fn set(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.storage
            .set_item(&self.key_for(key), value)
            .map_err(|err| js_error("set setting", err))
    }

    fn remove(&self, key: &str) -> BridgeResult<()> {
        self.storage
            .remove_item(&self.key_for(key))
            .map_err(|err| js_error("remove setting", err))
    }

    fn keys(&self) -> BridgeResult<Vec<String>> {
        list_prefixed_keys(&self.storage, &self.prefix)
    }
}

fn list_prefixed_keys(storage: &web_sys::Storage, prefix: &str) -> BridgeResult<Vec<String>> {
    let len = storage
        .length()
        .map_err(|err| js_error("storage length", err))?;
    let mut keys = Vec::new();
    for idx in 0..len {
        if let Some(entry) = storage
            .key(idx)
            .map_err(|err| js_error("storage key", err))?
        {
            if let Some(key) = entry.strip_prefix(prefix) {
                keys.push(key.to_string());
            }
        }
    }
    keys.sort();
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn unique_namespace(prefix: &str) -> String {
        format!("{prefix}-{}", js_sys::Date::now())
    }

    #[wasm_bindgen_test]
    fn scoped_store_roundtrip() {
        console_error_panic_hook::set_once();
        let store = LocalStorageKeyValueStore::scoped(&unique_namespace("kv")).unwrap();

        store.set("theme", "dark").unwrap();
        store.set("font", "mono").unwrap();
        assert_eq!(store.get("theme").unwrap(), Some("dark".to_string()));
        assert_eq!(store.keys().unwrap(), vec!["font", "theme"]);

        store.remove("font").unwrap();
        store.remove("font").unwrap();
        assert_eq!(store.get("font").unwrap(), None);
        assert_eq!(store.keys().unwrap(), vec!["theme"]);
    }

    #[wasm_bindgen_test]
    fn scopes_do_not_see_each_other() {
        let a = LocalStorageKeyValueStore::scoped(&unique_namespace("a")).unwrap();
        let b = LocalStorageKeyValueStore::scoped(&unique_namespace("b")).unwrap();

        a.set("shared", "from-a").unwrap();
        assert_eq!(b.get("shared").unwrap(), None);
        assert!(b.keys().unwrap().is_empty());
    }

    #[wasm_bindgen_test]
    fn unscoped_store_sees_raw_keys() {
        let ns = unique_namespace("raw");
        let scoped = LocalStorageKeyValueStore::scoped(&ns).unwrap();
        scoped.set("theme", "dark").unwrap();

        let raw = LocalStorageKeyValueStore::new().unwrap();
        let raw_key = format!("{ns}::settings::theme");
        assert!(raw.keys().unwrap().contains(&raw_key));
        raw.remove(&raw_key).unwrap();
        assert_eq!(scoped.get("theme").unwrap(), None);
    }
}
