//! In-process cache store

use dashmap::DashMap;

use crate::cache::{CacheEntry, CacheStore};
use crate::error::Result;

/// Unbounded map; entries live until forgotten or the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn store(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn forget(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Metadata;

    #[test]
    fn test_store_load_forget() {
        let store = MemoryStore::new();
        store
            .store("meta:a.txt", CacheEntry::Object(Metadata::file("a.txt", 1)))
            .unwrap();
        store.store("meta:b.txt", CacheEntry::Missing).unwrap();
        assert_eq!(store.len(), 2);

        assert_eq!(store.load("meta:b.txt").unwrap(), Some(CacheEntry::Missing));
        store.forget("meta:b.txt").unwrap();
        assert_eq!(store.load("meta:b.txt").unwrap(), None);

        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
