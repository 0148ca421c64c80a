//! File-persisted cache store
//!
//! Entries are held in memory and written as one JSON document on `flush()`
//! and when the store is dropped. The snapshot is loaded when the store is
//! opened; a snapshot that fails to parse is discarded with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{Result, VfsError};

pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
    dirty: RwLock<bool>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Discarding unreadable cache snapshot {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(VfsError::Io(e)),
        };

        debug!("opened cache snapshot {:?} with {} entries", path, entries.len());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            dirty: RwLock::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mark_dirty(&self) {
        *self.dirty.write() = true;
    }

    fn write_snapshot(&self) -> Result<()> {
        let raw = {
            let entries = self.entries.read();
            serde_json::to_string(&*entries)
                .map_err(|e| VfsError::Cache(format!("serialize snapshot: {}", e)))?
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CacheStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn store(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.write().insert(key.to_string(), entry);
        self.mark_dirty();
        Ok(())
    }

    fn forget(&self, key: &str) -> Result<()> {
        if self.entries.write().remove(key).is_some() {
            self.mark_dirty();
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        self.mark_dirty();
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if !*self.dirty.read() {
            return Ok(());
        }
        self.write_snapshot()?;
        *self.dirty.write() = false;
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to persist cache snapshot {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Metadata;

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/snapshot.json");

        {
            let store = FileStore::open(&path).unwrap();
            store
                .store("meta:a.txt", CacheEntry::Object(Metadata::file("a.txt", 4)))
                .unwrap();
        }
        assert!(path.exists());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.load("meta:a.txt").unwrap(),
            Some(CacheEntry::Object(Metadata::file("a.txt", 4)))
        );
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_clean_store_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let store = FileStore::open(&path).unwrap();
        store.flush().unwrap();
        drop(store);
        assert!(!path.exists());
    }
}
