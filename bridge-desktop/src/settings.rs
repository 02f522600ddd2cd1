//! Settings storage in a single JSON file
//!
//! The desktop stand-in for browser `localStorage`: a flat string map kept
//! in memory and written through to disk on every change.

use bridge_traits::{
    error::{BridgeError, Result},
    storage::KeyValueStore,
};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// JSON-file-backed key-value store
///
/// Writes replace the file atomically (write to a sibling, then rename).
/// A corrupt file is logged and treated as empty; it is overwritten by the
/// next write.
pub struct JsonFileKeyValueStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileKeyValueStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = ?path, "Settings file unreadable, starting empty: {}", e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        debug!(path = ?path, keys = values.len(), "Opened settings store");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(values).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode settings: {}", e))
        })?;
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.lock();
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&values) {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => values.insert(key.to_string(), previous),
                None => values.remove(key),
            };
            return Err(e);
        }
        debug!(key = key, "Stored setting");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.lock();
        let Some(previous) = values.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&values) {
            values.insert(key.to_string(), previous);
            return Err(e);
        }
        debug!(key = key, "Deleted setting");
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }
}
