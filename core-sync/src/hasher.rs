//! Content fingerprinting.
//!
//! A fingerprint is the first 16 hex characters of the SHA-256 digest of the
//! item's canonical serialization. It is a change signal only, never a
//! security boundary.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::manifest::ItemContent;

const FINGERPRINT_LEN: usize = 16;

/// Fingerprints content with a bounded memo cache.
///
/// The cache maps serialized content to its fingerprint. When it grows past
/// `capacity` it is cleared wholesale rather than evicted entry by entry.
pub struct ContentHasher {
    capacity: usize,
    cache: Mutex<HashMap<String, String>>,
}

impl ContentHasher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fingerprint typed item content.
    pub fn hash(&self, content: &ItemContent) -> Result<String> {
        match content {
            ItemContent::Setting(raw) => Ok(self.hash_str(raw)),
            ItemContent::Record(value) => Ok(self.hash_str(&canonical_json(value)?)),
        }
    }

    /// Fingerprint an already serialized string.
    pub fn hash_str(&self, serialized: &str) -> String {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(serialized) {
            return hit.clone();
        }

        let fingerprint = fingerprint(serialized);
        if cache.len() >= self.capacity {
            cache.clear();
        }
        cache.insert(serialized.to_string(), fingerprint.clone());
        fingerprint
    }

    pub fn cached_entries(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn fingerprint(serialized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Serialize JSON with object keys sorted at every depth.
///
/// `serde_json::to_string` sorts keys only while its `preserve_order`
/// feature is off, and any crate in the build graph can turn it on. Hashes
/// must agree between desktop and browser builds, so ordering is explicit.
pub(crate) fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &serde_json::Value, out: &mut String) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_short_hex() {
        let hasher = ContentHasher::new(10);
        let hash = hasher.hash_str("hello");

        assert_eq!(hash.len(), 16);
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(hash, "2cf24dba5fb0a30e");
    }

    #[test]
    fn test_record_hash_ignores_key_order() {
        let hasher = ContentHasher::new(10);
        let a = hasher
            .hash(&ItemContent::Record(json!({"title": "x", "meta": {"b": 1, "a": 2}})))
            .unwrap();
        let b = hasher
            .hash(&ItemContent::Record(json!({"meta": {"a": 2, "b": 1}, "title": "x"})))
            .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_different_hash() {
        let hasher = ContentHasher::new(10);
        assert_ne!(hasher.hash_str("dark"), hasher.hash_str("light"));
    }

    #[test]
    fn test_cache_cleared_when_full() {
        let hasher = ContentHasher::new(2);
        hasher.hash_str("a");
        hasher.hash_str("b");
        assert_eq!(hasher.cached_entries(), 2);

        hasher.hash_str("a");
        assert_eq!(hasher.cached_entries(), 2);

        hasher.hash_str("c");
        assert_eq!(hasher.cached_entries(), 1);
    }

    #[test]
    fn test_canonical_json_nested_arrays() {
        let value = json!([{"z": 1, "a": [true, null]}, "s"]);
        assert_eq!(canonical_json(&value).unwrap(), r#"[{"a":[true,null],"z":1},"s"]"#);
    }
}
