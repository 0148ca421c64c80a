//! Caching adapter decorator
//!
//! Read-type calls consult the store first and fill it on a miss, negative
//! results included. Mutations go to the wrapped adapter first; only after it
//! succeeded are the stale entries dropped.
//!
//! Every key carries a namespace, so adapters sharing one store never answer
//! from each other's entries.
//!
//! The store is advisory: any store failure is logged and the call carries on
//! as if the entry was absent. Errors from the wrapped adapter are returned
//! untouched.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{trace, warn};

use crate::adapter::{Adapter, Metadata, Visibility, WriteOptions};
use crate::cache::{listing_key, meta_key, namespace_prefix, split_key, CacheEntry, CacheStore};
use crate::error::{Result, VfsError};
use crate::path;

pub struct CachedAdapter {
    inner: Arc<dyn Adapter>,
    store: Arc<dyn CacheStore>,
    namespace: String,
}

impl CachedAdapter {
    pub fn new(inner: Arc<dyn Adapter>, store: Arc<dyn CacheStore>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            store,
            namespace: namespace.into(),
        }
    }

    pub fn inner(&self) -> &Arc<dyn Adapter> {
        &self.inner
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn meta_key(&self, path: &str) -> String {
        meta_key(&self.namespace, path)
    }

    fn load(&self, key: &str) -> Option<CacheEntry> {
        match self.store.load(key) {
            Ok(entry) => {
                trace!("cache {}: {}", if entry.is_some() { "hit" } else { "miss" }, key);
                entry
            }
            Err(e) => {
                warn!("cache load failed for {}: {}", key, e);
                None
            }
        }
    }

    fn put(&self, key: &str, entry: CacheEntry) {
        if let Err(e) = self.store.store(key, entry) {
            warn!("cache store failed for {}: {}", key, e);
        }
    }

    fn forget(&self, key: &str) {
        if let Err(e) = self.store.forget(key) {
            warn!("cache forget failed for {}: {}", key, e);
        }
    }

    /// Drop every entry a mutation of `target` may have made stale: metadata
    /// and listings of the path, of anything below it and of its ancestors.
    /// Ancestors are included because backends create or drop intermediate
    /// directories implicitly.
    fn invalidate(&self, target: &str) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("cache keys failed while invalidating {}: {}", target, e);
                return;
            }
        };

        let ancestors = path::ancestors(target);
        for key in keys {
            let Some((_, key_path)) = split_key(&self.namespace, &key) else {
                continue;
            };
            let stale = key_path == target
                || path::is_descendant(key_path, target)
                || ancestors.contains(&key_path);
            if stale {
                self.forget(&key);
            }
        }
    }

    /// Cached metadata lookup; `Ok(None)` when the path is known missing
    async fn cached_metadata(&self, path: &str) -> Result<Option<Metadata>> {
        let key = self.meta_key(path);
        match self.load(&key) {
            Some(CacheEntry::Object(metadata)) => return Ok(Some(metadata)),
            Some(CacheEntry::Missing) => return Ok(None),
            Some(CacheEntry::Listing(_)) | None => {}
        }

        match self.inner.metadata(path).await {
            Ok(metadata) => {
                self.put(&key, CacheEntry::Object(metadata.clone()));
                Ok(Some(metadata))
            }
            Err(e) if e.is_not_found() => {
                self.put(&key, CacheEntry::Missing);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn metadata_or_not_found(&self, path: &str) -> Result<Metadata> {
        self.cached_metadata(path)
            .await?
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    fn record(&self, metadata: &Metadata) {
        self.put(&self.meta_key(&metadata.path), CacheEntry::Object(metadata.clone()));
    }
}

impl Drop for CachedAdapter {
    /// Entries of an instance-local backend can never be valid for anyone else
    fn drop(&mut self) {
        if !self.inner.instance_local() {
            return;
        }
        let prefix = namespace_prefix(&self.namespace);
        match self.store.keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|k| k.starts_with(&prefix)) {
                    self.forget(key);
                }
            }
            Err(e) => warn!("cache keys failed while dropping {}: {}", self.namespace, e),
        }
    }
}

#[async_trait]
impl Adapter for CachedAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn has(&self, path: &str) -> Result<bool> {
        Ok(self.cached_metadata(path).await?.is_some())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        let metadata = self.inner.write(path, contents, options).await?;
        self.invalidate(path);
        Ok(metadata)
    }

    async fn update(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        let metadata = self.inner.update(path, contents, options).await?;
        self.invalidate(path);
        Ok(metadata)
    }

    async fn append(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        let metadata = self.inner.append(path, contents, options).await?;
        self.invalidate(path);
        Ok(metadata)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await?;
        self.invalidate(path);
        self.put(&self.meta_key(path), CacheEntry::Missing);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename(from, to).await?;
        self.invalidate(from);
        self.invalidate(to);
        self.put(&self.meta_key(from), CacheEntry::Missing);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.inner.copy(from, to).await?;
        self.invalidate(to);
        Ok(())
    }

    async fn create_dir(&self, dirname: &str, options: &WriteOptions) -> Result<Metadata> {
        let metadata = self.inner.create_dir(dirname, options).await?;
        self.invalidate(dirname);
        Ok(metadata)
    }

    async fn delete_dir(&self, dirname: &str) -> Result<()> {
        self.inner.delete_dir(dirname).await?;
        self.invalidate(dirname);
        self.put(&self.meta_key(dirname), CacheEntry::Missing);
        Ok(())
    }

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        let key = listing_key(&self.namespace, directory, recursive);
        if let Some(CacheEntry::Listing(entries)) = self.load(&key) {
            return Ok(entries);
        }

        let entries = self.inner.list_contents(directory, recursive).await?;
        for entry in &entries {
            self.record(entry);
        }
        self.put(&key, CacheEntry::Listing(entries.clone()));
        Ok(entries)
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        self.metadata_or_not_found(path).await
    }

    async fn size(&self, path: &str) -> Result<u64> {
        match self.metadata_or_not_found(path).await?.size {
            Some(size) => Ok(size),
            None => self.inner.size(path).await,
        }
    }

    async fn mimetype(&self, path: &str) -> Result<String> {
        match self.metadata_or_not_found(path).await?.mimetype {
            Some(mimetype) => Ok(mimetype),
            None => self.inner.mimetype(path).await,
        }
    }

    async fn timestamp(&self, path: &str) -> Result<DateTime<Utc>> {
        match self.metadata_or_not_found(path).await?.timestamp {
            Some(timestamp) => Ok(timestamp),
            None => self.inner.timestamp(path).await,
        }
    }

    async fn visibility(&self, path: &str) -> Result<Visibility> {
        let mut metadata = self.metadata_or_not_found(path).await?;
        if let Some(visibility) = metadata.visibility {
            return Ok(visibility);
        }

        // Fill the field so the next lookup is served from the store
        let visibility = self.inner.visibility(path).await?;
        metadata.visibility = Some(visibility);
        self.record(&metadata);
        Ok(visibility)
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.inner.set_visibility(path, visibility).await?;
        self.invalidate(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use crate::adapter::null::NullAdapter;
    use crate::cache::MemoryStore;

    fn cached() -> (CachedAdapter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let adapter = CachedAdapter::new(Arc::new(MemoryAdapter::new()), store.clone(), "scratch");
        (adapter, store)
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let (adapter, store) = cached();
        assert!(!adapter.has("ghost.txt").await.unwrap());
        assert_eq!(store.load("scratch|meta:ghost.txt").unwrap(), Some(CacheEntry::Missing));
    }

    #[tokio::test]
    async fn test_write_replaces_negative_entry() {
        let (adapter, _store) = cached();
        assert!(!adapter.has("a.txt").await.unwrap());

        adapter
            .write("a.txt", b"hello", &WriteOptions::default())
            .await
            .unwrap();
        assert!(adapter.has("a.txt").await.unwrap());
        assert_eq!(adapter.size("a.txt").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_listing_invalidated_by_child_write() {
        let (adapter, store) = cached();
        let opts = WriteOptions::default();
        adapter.write("dir/one.txt", b"1", &opts).await.unwrap();

        assert_eq!(adapter.list_contents("dir", false).await.unwrap().len(), 1);
        assert_eq!(adapter.list_contents("", true).await.unwrap().len(), 2);
        assert!(store.load("scratch|list:dir").unwrap().is_some());

        adapter.write("dir/two.txt", b"2", &opts).await.unwrap();
        assert!(store.load("scratch|list:dir").unwrap().is_none());
        assert!(store.load("scratch|tree:").unwrap().is_none());
        assert_eq!(adapter.list_contents("dir", false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_dir_forgets_descendants() {
        let (adapter, store) = cached();
        let opts = WriteOptions::default();
        adapter.write("dir/sub/f.txt", b"1", &opts).await.unwrap();
        adapter.list_contents("dir/sub", false).await.unwrap();

        adapter.delete_dir("dir").await.unwrap();

        assert!(store.load("scratch|meta:dir/sub/f.txt").unwrap().is_none());
        assert!(store.load("scratch|list:dir/sub").unwrap().is_none());
        assert!(!adapter.has("dir/sub/f.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_backend_error_passes_through() {
        let (adapter, _store) = cached();
        let err = adapter.delete("missing.txt").await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound(p) if p == "missing.txt"));
    }

    #[tokio::test]
    async fn test_implicit_parent_replaces_negative_entry() {
        let (adapter, _store) = cached();
        assert!(!adapter.has("dir").await.unwrap());
        assert!(!adapter.has("dir/sub").await.unwrap());

        adapter
            .write("dir/sub/a.txt", b"1", &WriteOptions::default())
            .await
            .unwrap();
        assert!(adapter.has("dir").await.unwrap());
        assert!(adapter.has("dir/sub").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_to_null_backend_stays_invisible() {
        let store = Arc::new(MemoryStore::new());
        let adapter = CachedAdapter::new(Arc::new(NullAdapter), store, "void");
        adapter
            .write("a.txt", b"data", &WriteOptions::default())
            .await
            .unwrap();
        assert!(!adapter.has("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_instance_local_entries_dropped_with_adapter() {
        let store = Arc::new(MemoryStore::new());
        let keep = CachedAdapter::new(Arc::new(MemoryAdapter::new()), store.clone(), "keep");
        let gone = CachedAdapter::new(Arc::new(MemoryAdapter::new()), store.clone(), "gone");
        keep.has("a.txt").await.unwrap();
        gone.has("a.txt").await.unwrap();
        assert_eq!(store.len(), 2);

        drop(gone);
        assert_eq!(store.keys().unwrap(), vec!["keep|meta:a.txt".to_string()]);
    }
}
