//! Directory-backed object store using Tokio
//!
//! Each object key maps to a file below a root directory, `/` separating
//! path segments. Useful as a local "remote" for a synced folder (Dropbox,
//! a NAS mount) and in tests.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{ObjectInfo, ObjectStore},
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::debug;

const TEMP_SUFFIX: &str = ".partial";

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Store objects below `root`, created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the platform data directory, e.g.
    /// `~/.local/share/{app_name}/remote` on Linux.
    pub fn in_data_dir(app_name: &str) -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(app_name)
            .join("remote");
        Self::new(data_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path, rejecting keys that escape the root.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid object key: '{}'",
                key
            )));
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect();
        Some(segments?.join("/"))
    }

    async fn collect_files(&self, dir: PathBuf, out: &mut Vec<PathBuf>) -> Result<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(BridgeError::Io(e)),
            };

            while let Some(entry) = read_dir.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    out.push(entry.path());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see half an object.
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        fs::write(&temp, body.as_ref()).await?;
        fs::rename(&temp, &path).await?;

        debug!(key = key, size = body.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        // Walk from the deepest directory the prefix names.
        let start = match prefix.rfind('/') {
            Some(idx) => self.path_for(&prefix[..idx])?,
            None => self.root.clone(),
        };

        let mut files = Vec::new();
        self.collect_files(start, &mut files).await?;

        let mut objects = Vec::new();
        for path in files {
            let Some(key) = self.key_for(&path) else {
                continue;
            };
            if !key.starts_with(prefix) || key.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let metadata = fs::metadata(&path).await?;
            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .and_then(|d| i64::try_from(d.as_millis()).ok());
            objects.push(ObjectInfo {
                key,
                size: metadata.len(),
                last_modified,
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(prefix = prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path().join("remote"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, store) = store();

        store
            .put("records/c1.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert_eq!(
            store.get("records/c1.json").await.unwrap(),
            Some(Bytes::from_static(b"{}"))
        );

        store.delete("records/c1.json").await.unwrap();
        assert_eq!(store.get("records/c1.json").await.unwrap(), None);
        // Deleting again is fine.
        store.delete("records/c1.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_object_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.get("metadata.json").await.unwrap(), None);
        assert!(store.list("backups/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let (_dir, store) = store();
        for key in [
            "metadata.json",
            "backups/backup-1.json",
            "backups/backup-2.json",
            "records/backup-3.json",
        ] {
            store.put(key, Bytes::from_static(b"x"), "").await.unwrap();
        }

        let keys: Vec<String> = store
            .list("backups/")
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.key)
            .collect();
        assert_eq!(keys, vec!["backups/backup-1.json", "backups/backup-2.json"]);

        let all = store.list("").await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|info| info.size == 1 && info.last_modified.is_some()));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, store) = store();
        for key in ["../outside.json", "/etc/passwd", "", "a/../../b"] {
            assert!(store.get(key).await.is_err(), "accepted {:?}", key);
        }
    }
}
