//! Local disk adapter
//!
//! Maps normalized paths onto a root directory. Visibility is expressed with
//! unix permission bits; on other platforms it is reported as public and
//! changes are accepted but ignored.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::adapter::{guess_mimetype, Adapter, Metadata, Visibility, WriteOptions};
use crate::error::{Result, VfsError};
use crate::path;

/// Permission bits for public files (rw-r--r--)
pub const PUBLIC_FILE_MODE: u32 = 0o644;
/// Permission bits for private files (rw-------)
pub const PRIVATE_FILE_MODE: u32 = 0o600;
/// Permission bits for public directories (rwxr-xr-x)
pub const PUBLIC_DIR_MODE: u32 = 0o755;
/// Permission bits for private directories (rwx------)
pub const PRIVATE_DIR_MODE: u32 = 0o700;

pub struct LocalAdapter {
    root: PathBuf,
}

impl LocalAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn os_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    async fn ensure_parent(&self, os_path: &Path) -> Result<()> {
        if let Some(parent) = os_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn map_not_found(e: io::Error, path: &str) -> VfsError {
        if e.kind() == io::ErrorKind::NotFound {
            VfsError::NotFound(path.to_string())
        } else {
            VfsError::Io(e)
        }
    }

    fn to_metadata(path: &str, meta: &std::fs::Metadata) -> Metadata {
        let timestamp = meta.modified().ok().map(DateTime::<Utc>::from);
        let visibility = Some(visibility_of(meta));
        if meta.is_dir() {
            Metadata::dir(path)
                .with_timestamp(timestamp)
                .with_visibility(visibility)
        } else {
            Metadata::file(path, meta.len())
                .with_timestamp(timestamp)
                .with_mimetype(Some(guess_mimetype(path)))
                .with_visibility(visibility)
        }
    }

    async fn apply_visibility(os_path: &Path, visibility: Visibility, is_dir: bool) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match (visibility, is_dir) {
                (Visibility::Public, false) => PUBLIC_FILE_MODE,
                (Visibility::Private, false) => PRIVATE_FILE_MODE,
                (Visibility::Public, true) => PUBLIC_DIR_MODE,
                (Visibility::Private, true) => PRIVATE_DIR_MODE,
            };
            fs::set_permissions(os_path, std::fs::Permissions::from_mode(mode)).await?;
        }
        #[cfg(not(unix))]
        {
            let _ = (os_path, visibility, is_dir);
        }
        Ok(())
    }

    async fn walk(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        let mut out = Vec::new();
        let mut pending = vec![directory.to_string()];

        while let Some(dir) = pending.pop() {
            let mut read_dir = match fs::read_dir(self.os_path(&dir)).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(VfsError::Io(e)),
            };
            while let Some(entry) = read_dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child = path::join(&dir, &name);
                let meta = entry.metadata().await?;
                if recursive && meta.is_dir() {
                    pending.push(child.clone());
                }
                out.push(Self::to_metadata(&child, &meta));
            }
        }

        Ok(out)
    }
}

#[cfg(unix)]
fn visibility_of(meta: &std::fs::Metadata) -> Visibility {
    use std::os::unix::fs::PermissionsExt;
    if meta.permissions().mode() & 0o044 == 0 {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

#[cfg(not(unix))]
fn visibility_of(_meta: &std::fs::Metadata) -> Visibility {
    Visibility::Public
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn name(&self) -> &str {
        "local"
    }

    async fn has(&self, path: &str) -> Result<bool> {
        Ok(fs::metadata(self.os_path(path)).await.is_ok())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        trace!("read: path={}", path);
        fs::read(self.os_path(path))
            .await
            .map(Bytes::from)
            .map_err(|e| Self::map_not_found(e, path))
    }

    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        let os_path = self.os_path(path);
        debug!("write: path={} size={}", path, contents.len());
        self.ensure_parent(&os_path).await?;
        fs::write(&os_path, contents).await?;
        if let Some(visibility) = options.visibility {
            Self::apply_visibility(&os_path, visibility, false).await?;
        }
        self.metadata(path).await
    }

    async fn append(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        let os_path = self.os_path(path);
        debug!("append: path={} size={}", path, contents.len());
        self.ensure_parent(&os_path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&os_path)
            .await?;
        file.write_all(contents).await?;
        file.flush().await?;
        drop(file);
        if let Some(visibility) = options.visibility {
            Self::apply_visibility(&os_path, visibility, false).await?;
        }
        self.metadata(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!("delete: path={}", path);
        fs::remove_file(self.os_path(path))
            .await
            .map_err(|e| Self::map_not_found(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        debug!("rename: from={} to={}", from, to);
        let dst = self.os_path(to);
        self.ensure_parent(&dst).await?;
        fs::rename(self.os_path(from), dst)
            .await
            .map_err(|e| Self::map_not_found(e, from))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        debug!("copy: from={} to={}", from, to);
        let dst = self.os_path(to);
        self.ensure_parent(&dst).await?;
        fs::copy(self.os_path(from), dst)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_not_found(e, from))
    }

    async fn create_dir(&self, dirname: &str, options: &WriteOptions) -> Result<Metadata> {
        let os_path = self.os_path(dirname);
        debug!("create_dir: path={}", dirname);
        fs::create_dir_all(&os_path).await?;
        if let Some(visibility) = options.visibility {
            Self::apply_visibility(&os_path, visibility, true).await?;
        }
        self.metadata(dirname).await
    }

    async fn delete_dir(&self, dirname: &str) -> Result<()> {
        debug!("delete_dir: path={}", dirname);
        fs::remove_dir_all(self.os_path(dirname))
            .await
            .map_err(|e| Self::map_not_found(e, dirname))
    }

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        trace!("list_contents: dir={} recursive={}", directory, recursive);
        self.walk(directory, recursive).await
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        trace!("metadata: path={}", path);
        let meta = fs::metadata(self.os_path(path))
            .await
            .map_err(|e| Self::map_not_found(e, path))?;
        Ok(Self::to_metadata(path, &meta))
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let os_path = self.os_path(path);
        let meta = fs::metadata(&os_path)
            .await
            .map_err(|e| Self::map_not_found(e, path))?;
        Self::apply_visibility(&os_path, visibility, meta.is_dir()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());

        let meta = adapter
            .write("nested/file.txt", b"contents", &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(meta.size, Some(8));
        assert_eq!(meta.mimetype.as_deref(), Some("text/plain"));
        assert!(dir.path().join("nested/file.txt").exists());

        assert_eq!(
            adapter.read("nested/file.txt").await.unwrap(),
            Bytes::from("contents")
        );

        adapter.delete("nested/file.txt").await.unwrap();
        assert!(matches!(
            adapter.read("nested/file.txt").await,
            Err(VfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        let opts = WriteOptions::default();

        adapter.append("log.txt", b"one\n", &opts).await.unwrap();
        adapter.append("log.txt", b"two\n", &opts).await.unwrap();

        assert_eq!(
            adapter.read("log.txt").await.unwrap(),
            Bytes::from("one\ntwo\n")
        );
    }

    #[tokio::test]
    async fn test_recursive_listing() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        let opts = WriteOptions::default();
        adapter.write("a.txt", b"1", &opts).await.unwrap();
        adapter.write("sub/b.txt", b"2", &opts).await.unwrap();

        let mut shallow: Vec<_> = adapter
            .list_contents("", false)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        shallow.sort();
        assert_eq!(shallow, vec!["a.txt", "sub"]);

        let deep = adapter.list_contents("", true).await.unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_visibility() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());

        adapter
            .write(
                "secret.txt",
                b"x",
                &WriteOptions::with_visibility(Visibility::Private),
            )
            .await
            .unwrap();
        assert_eq!(
            adapter.visibility("secret.txt").await.unwrap(),
            Visibility::Private
        );

        adapter
            .set_visibility("secret.txt", Visibility::Public)
            .await
            .unwrap();
        assert_eq!(
            adapter.visibility("secret.txt").await.unwrap(),
            Visibility::Public
        );
    }

    #[tokio::test]
    async fn test_missing_listing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalAdapter::new(dir.path());
        assert!(adapter.list_contents("nope", false).await.unwrap().is_empty());
    }
}
