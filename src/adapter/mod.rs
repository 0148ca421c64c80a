//! Backend adapter capability set
//!
//! An adapter is one storage technology behind a fixed, path-based interface.
//! Every path an adapter receives has already been normalized (see
//! [`crate::path`]): relative, `/`-separated, the root being `""`.
//!
//! Optional capabilities (rename, copy, visibility) have default
//! implementations that report [`VfsError::UnsupportedOperation`], so a gap
//! in a backend always surfaces the same way.

pub mod local;
pub mod memory;
pub mod null;
pub mod object_storage;
pub mod webdav;
pub mod zip;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VfsError};
use crate::path;

/// Kind of entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
}

/// Public/private visibility of a file or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(VfsError::InvalidArgument(format!(
                "unknown visibility `{}`",
                other
            ))),
        }
    }
}

/// Metadata for a file or directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub path: String,
    pub entry_type: EntryType,
    pub size: Option<u64>,
    pub mimetype: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub visibility: Option<Visibility>,
}

impl Metadata {
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            entry_type: EntryType::File,
            size: Some(size),
            mimetype: None,
            timestamp: None,
            visibility: None,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entry_type: EntryType::Dir,
            size: None,
            mimetype: None,
            timestamp: None,
            visibility: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_mimetype(mut self, mimetype: Option<String>) -> Self {
        self.mimetype = mimetype;
        self
    }

    pub fn with_visibility(mut self, visibility: Option<Visibility>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.entry_type, EntryType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.entry_type, EntryType::Dir)
    }

    pub fn basename(&self) -> &str {
        path::basename(&self.path)
    }

    pub fn dirname(&self) -> &str {
        path::dirname(&self.path)
    }
}

/// Options carried by mutating calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub visibility: Option<Visibility>,
}

impl WriteOptions {
    pub fn with_visibility(visibility: Visibility) -> Self {
        Self {
            visibility: Some(visibility),
        }
    }
}

/// Guess a mime type from the path's extension
pub fn guess_mimetype(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Core adapter trait for storage backends
///
/// Adapters are path-based and carry no facade logic: existence assertions,
/// default visibility and plugin dispatch all live in
/// [`crate::filesystem::Filesystem`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Technology name, used in logs and capability errors
    fn name(&self) -> &str;

    /// Whether the stored data lives inside this adapter value, so that no
    /// other instance can observe it
    fn instance_local(&self) -> bool {
        false
    }

    /// Check if a path exists
    ///
    /// Default implementation uses metadata()
    async fn has(&self, path: &str) -> Result<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read the full contents of a file
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Create or replace a file
    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata>;

    /// Replace an existing file
    async fn update(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        self.write(path, contents, options).await
    }

    /// Append to a file, creating it when missing
    ///
    /// Default implementation reads the current contents and writes them back
    /// with `contents` appended.
    async fn append(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        let existing = match self.read(path).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => Bytes::new(),
            Err(e) => return Err(e),
        };
        let mut combined = Vec::with_capacity(existing.len() + contents.len());
        combined.extend_from_slice(&existing);
        combined.extend_from_slice(contents);
        self.write(path, &combined, options).await
    }

    /// Remove a file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Move a file
    async fn rename(&self, _from: &str, _to: &str) -> Result<()> {
        Err(VfsError::unsupported(self.name(), "rename"))
    }

    /// Copy a file
    async fn copy(&self, _from: &str, _to: &str) -> Result<()> {
        Err(VfsError::unsupported(self.name(), "copy"))
    }

    /// Create a directory (and missing parents)
    async fn create_dir(&self, dirname: &str, options: &WriteOptions) -> Result<Metadata>;

    /// Remove a directory and everything below it
    async fn delete_dir(&self, dirname: &str) -> Result<()>;

    /// List a directory, optionally descending into subdirectories
    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>>;

    /// Get metadata for a path
    async fn metadata(&self, path: &str) -> Result<Metadata>;

    async fn size(&self, path: &str) -> Result<u64> {
        self.metadata(path)
            .await?
            .size
            .ok_or_else(|| VfsError::unsupported(self.name(), "size"))
    }

    async fn mimetype(&self, path: &str) -> Result<String> {
        let metadata = self.metadata(path).await?;
        Ok(metadata
            .mimetype
            .unwrap_or_else(|| guess_mimetype(&metadata.path)))
    }

    async fn timestamp(&self, path: &str) -> Result<DateTime<Utc>> {
        self.metadata(path)
            .await?
            .timestamp
            .ok_or_else(|| VfsError::unsupported(self.name(), "timestamp"))
    }

    async fn visibility(&self, path: &str) -> Result<Visibility> {
        self.metadata(path)
            .await?
            .visibility
            .ok_or_else(|| VfsError::unsupported(self.name(), "visibility"))
    }

    async fn set_visibility(&self, _path: &str, _visibility: Visibility) -> Result<()> {
        Err(VfsError::unsupported(self.name(), "set_visibility"))
    }
}
