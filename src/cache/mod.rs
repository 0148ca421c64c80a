//! Metadata/listing cache: stores and the caching adapter decorator

pub mod adapter;
pub mod filesystem;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::Metadata;
use crate::error::Result;

pub use adapter::CachedAdapter;
pub use filesystem::FileStore;
pub use memory::MemoryStore;

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
#[derive(Default)]
pub enum CacheConfig {
    /// No store; connections are never wrapped
    None,
    /// In-process map, unbounded, process lifetime
    #[default]
    Memory,
    /// JSON snapshot on disk
    Filesystem { path: String },
}

impl CacheConfig {
    /// Build the store this configuration names
    pub fn build(&self) -> Result<Option<Arc<dyn CacheStore>>> {
        Ok(match self {
            CacheConfig::None => None,
            CacheConfig::Memory => Some(Arc::new(MemoryStore::new())),
            CacheConfig::Filesystem { path } => {
                Some(Arc::new(FileStore::open(PathBuf::from(path))?))
            }
        })
    }
}

/// Value held under a cache key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CacheEntry {
    /// The path is known not to exist
    Missing,
    Object(Metadata),
    Listing(Vec<Metadata>),
}

/// Key/value contract every cache store satisfies
///
/// Stores must be safe to share between threads, but the decorator makes no
/// attempt to keep a delegate call and its invalidation atomic.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<CacheEntry>>;

    fn store(&self, key: &str, entry: CacheEntry) -> Result<()>;

    fn forget(&self, key: &str) -> Result<()>;

    /// Every key currently held
    fn keys(&self) -> Result<Vec<String>>;

    fn clear(&self) -> Result<()>;

    /// Persist pending state; a no-op for volatile stores
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

pub const META_PREFIX: &str = "meta:";
pub const LIST_PREFIX: &str = "list:";
pub const TREE_PREFIX: &str = "tree:";

/// Separates a connection namespace from the rest of a key
pub const NAMESPACE_SEPARATOR: char = '|';

/// Leading part shared by every key of one namespace
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{}{}", namespace, NAMESPACE_SEPARATOR)
}

pub fn meta_key(namespace: &str, path: &str) -> String {
    format!("{}{}{}", namespace_prefix(namespace), META_PREFIX, path)
}

/// Key for a shallow (`recursive == false`) or deep listing of `dir`
pub fn listing_key(namespace: &str, dir: &str, recursive: bool) -> String {
    let prefix = if recursive { TREE_PREFIX } else { LIST_PREFIX };
    format!("{}{}{}", namespace_prefix(namespace), prefix, dir)
}

/// Split a key of `namespace` into its kind prefix and path; `None` for keys
/// of other namespaces
pub fn split_key<'a>(namespace: &str, key: &'a str) -> Option<(&'static str, &'a str)> {
    let rest = key
        .strip_prefix(namespace)?
        .strip_prefix(NAMESPACE_SEPARATOR)?;
    [META_PREFIX, LIST_PREFIX, TREE_PREFIX]
        .into_iter()
        .find_map(|prefix| rest.strip_prefix(prefix).map(|path| (prefix, path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(meta_key("disk", "a/b"), "disk|meta:a/b");
        assert_eq!(listing_key("disk", "", false), "disk|list:");
        assert_eq!(listing_key("disk", "a", true), "disk|tree:a");
        assert_eq!(split_key("disk", "disk|tree:a/b"), Some((TREE_PREFIX, "a/b")));
        assert_eq!(split_key("disk", "bogus"), None);
    }

    #[test]
    fn test_split_key_ignores_other_namespaces() {
        assert_eq!(split_key("disk", "disk2|meta:a"), None);
        assert_eq!(split_key("disk", "scratch|meta:a"), None);
        assert_eq!(split_key("disk2", "disk2|meta:a"), Some((META_PREFIX, "a")));
    }

    #[test]
    fn test_config_variants() {
        let none: CacheConfig = serde_yaml::from_str("type: none").unwrap();
        assert!(none.build().unwrap().is_none());

        let memory: CacheConfig = serde_yaml::from_str("type: memory").unwrap();
        assert!(memory.build().unwrap().is_some());

        let fs: CacheConfig = serde_yaml::from_str("type: filesystem\npath: /tmp/x.json").unwrap();
        assert!(matches!(fs, CacheConfig::Filesystem { ref path } if path == "/tmp/x.json"));
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_string(&CacheEntry::Missing).unwrap();
        assert_eq!(json, r#"{"kind":"missing"}"#);
    }
}
