//! Filesystem facade
//!
//! The uniform operation surface handed to application code. It normalizes
//! paths, applies existence assertions and the default visibility, and
//! otherwise delegates to the adapter it was built over (raw or cached).
//! Named plugin operations are dispatched through [`Filesystem::call`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::trace;

use crate::adapter::{Adapter, Metadata, Visibility, WriteOptions};
use crate::error::{Result, VfsError};
use crate::path;
use crate::plugin::{Plugin, PluginArg, PluginOutput};

/// Facade-wide behavior switches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemOptions {
    /// Visibility applied to writes that do not pick one
    pub visibility: Option<Visibility>,

    /// Skip the existence assertions before operations
    pub disable_asserts: bool,
}

pub struct Filesystem {
    adapter: Arc<dyn Adapter>,
    options: FilesystemOptions,
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl Filesystem {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self::with_options(adapter, FilesystemOptions::default())
    }

    pub fn with_options(adapter: Arc<dyn Adapter>, options: FilesystemOptions) -> Self {
        Self {
            adapter,
            options,
            plugins: HashMap::new(),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn options(&self) -> &FilesystemOptions {
        &self.options
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            visibility: self.options.visibility,
        }
    }

    async fn assert_present(&self, path: &str) -> Result<()> {
        if !self.options.disable_asserts && !self.adapter.has(path).await? {
            return Err(VfsError::NotFound(path.to_string()));
        }
        Ok(())
    }

    async fn assert_absent(&self, path: &str) -> Result<()> {
        if !self.options.disable_asserts && self.adapter.has(path).await? {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    pub async fn has(&self, path: &str) -> Result<bool> {
        let path = path::normalize(path)?;
        if path.is_empty() {
            return Ok(true);
        }
        self.adapter.has(&path).await
    }

    pub async fn read(&self, path: &str) -> Result<Bytes> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.read(&path).await
    }

    /// Read a file, then delete it
    pub async fn read_and_delete(&self, path: &str) -> Result<Bytes> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        let contents = self.adapter.read(&path).await?;
        self.adapter.delete(&path).await?;
        Ok(contents)
    }

    /// Create a new file; the path must not exist yet
    pub async fn write(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<Metadata> {
        let path = path::normalize(path)?;
        self.assert_absent(&path).await?;
        self.adapter
            .write(&path, contents.as_ref(), &self.write_options())
            .await
    }

    /// Create or replace a file, without assertions
    pub async fn put(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<Metadata> {
        let path = path::normalize(path)?;
        let options = self.write_options();
        if self.adapter.has(&path).await? {
            self.adapter.update(&path, contents.as_ref(), &options).await
        } else {
            self.adapter.write(&path, contents.as_ref(), &options).await
        }
    }

    /// Replace an existing file
    pub async fn update(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<Metadata> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter
            .update(&path, contents.as_ref(), &self.write_options())
            .await
    }

    pub async fn append(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<Metadata> {
        let path = path::normalize(path)?;
        self.adapter
            .append(&path, contents.as_ref(), &self.write_options())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.delete(&path).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = path::normalize(from)?;
        let to = path::normalize(to)?;
        self.assert_present(&from).await?;
        self.assert_absent(&to).await?;
        self.adapter.rename(&from, &to).await
    }

    pub async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let from = path::normalize(from)?;
        let to = path::normalize(to)?;
        self.assert_present(&from).await?;
        self.assert_absent(&to).await?;
        self.adapter.copy(&from, &to).await
    }

    pub async fn create_dir(&self, dirname: &str) -> Result<Metadata> {
        let dirname = path::normalize(dirname)?;
        self.adapter
            .create_dir(&dirname, &self.write_options())
            .await
    }

    /// Remove a directory and its contents; the root cannot be removed
    pub async fn delete_dir(&self, dirname: &str) -> Result<()> {
        let dirname = path::normalize(dirname)?;
        if dirname.is_empty() {
            return Err(VfsError::InvalidArgument(
                "root directories can not be deleted".to_string(),
            ));
        }
        self.adapter.delete_dir(&dirname).await
    }

    /// List a directory, sorted by path
    pub async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        let directory = path::normalize(directory)?;
        trace!("list_contents: dir={} recursive={}", directory, recursive);

        let mut entries: Vec<Metadata> = self
            .adapter
            .list_contents(&directory, recursive)
            .await?
            .into_iter()
            .filter(|entry| {
                if recursive {
                    path::is_descendant(&entry.path, &directory)
                } else {
                    path::is_child(&entry.path, &directory)
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    pub async fn get_metadata(&self, path: &str) -> Result<Metadata> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.metadata(&path).await
    }

    pub async fn get_size(&self, path: &str) -> Result<u64> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.size(&path).await
    }

    pub async fn get_mimetype(&self, path: &str) -> Result<String> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.mimetype(&path).await
    }

    pub async fn get_timestamp(&self, path: &str) -> Result<DateTime<Utc>> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.timestamp(&path).await
    }

    pub async fn get_visibility(&self, path: &str) -> Result<Visibility> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.visibility(&path).await
    }

    pub async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let path = path::normalize(path)?;
        self.assert_present(&path).await?;
        self.adapter.set_visibility(&path, visibility).await
    }

    /// Register a plugin under its method name, replacing any previous one
    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        self.plugins.insert(plugin.method().to_string(), plugin);
        self
    }

    pub fn has_plugin(&self, method: &str) -> bool {
        self.plugins.contains_key(method)
    }

    /// Registered plugin methods, sorted
    pub fn plugin_methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Invoke a plugin method by name
    pub async fn call(&self, method: &str, args: &[PluginArg]) -> Result<PluginOutput> {
        let plugin = self
            .plugins
            .get(method)
            .cloned()
            .ok_or_else(|| VfsError::UnknownOperation(method.to_string()))?;
        trace!("plugin call: {}", method);
        plugin.handle(self, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;

    fn memory_fs() -> Filesystem {
        Filesystem::new(Arc::new(MemoryAdapter::new()))
    }

    #[tokio::test]
    async fn test_write_asserts_absent() {
        let fs = memory_fs();
        fs.write("a.txt", "one").await.unwrap();
        assert!(matches!(
            fs.write("a.txt", "two").await,
            Err(VfsError::AlreadyExists(_))
        ));
        fs.put("a.txt", "two").await.unwrap();
        assert_eq!(fs.read("a.txt").await.unwrap(), Bytes::from("two"));
    }

    #[tokio::test]
    async fn test_disable_asserts() {
        let fs = Filesystem::with_options(
            Arc::new(MemoryAdapter::new()),
            FilesystemOptions {
                visibility: None,
                disable_asserts: true,
            },
        );
        fs.write("a.txt", "one").await.unwrap();
        fs.write("a.txt", "two").await.unwrap();
        assert_eq!(fs.read("a.txt").await.unwrap(), Bytes::from("two"));
    }

    #[tokio::test]
    async fn test_paths_are_normalized() {
        let fs = memory_fs();
        fs.write("/dir/./a.txt", "x").await.unwrap();
        assert!(fs.has("dir\\a.txt").await.unwrap());
        assert!(matches!(
            fs.read("../outside").await,
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_root_cannot_be_deleted() {
        let fs = memory_fs();
        assert!(matches!(
            fs.delete_dir("/").await,
            Err(VfsError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_default_visibility_applies() {
        let fs = Filesystem::with_options(
            Arc::new(MemoryAdapter::new()),
            FilesystemOptions {
                visibility: Some(Visibility::Private),
                disable_asserts: false,
            },
        );
        fs.write("secret.txt", "x").await.unwrap();
        assert_eq!(
            fs.get_visibility("secret.txt").await.unwrap(),
            Visibility::Private
        );
    }

    #[tokio::test]
    async fn test_read_and_delete() {
        let fs = memory_fs();
        fs.write("once.txt", "payload").await.unwrap();
        assert_eq!(
            fs.read_and_delete("once.txt").await.unwrap(),
            Bytes::from("payload")
        );
        assert!(!fs.has("once.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_plugin_method() {
        let fs = memory_fs();
        assert!(matches!(
            fs.call("frobnicate", &[]).await,
            Err(VfsError::UnknownOperation(m)) if m == "frobnicate"
        ));
    }

    #[tokio::test]
    async fn test_listing_sorted() {
        let fs = memory_fs();
        fs.write("b.txt", "").await.unwrap();
        fs.write("a/c.txt", "").await.unwrap();
        let paths: Vec<_> = fs
            .list_contents("", true)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(paths, vec!["a", "a/c.txt", "b.txt"]);
    }
}
