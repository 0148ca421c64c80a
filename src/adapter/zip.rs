//! Zip archive adapter
//!
//! The archive is read once when the adapter is built; the file handle is
//! closed again before `open` returns. Mutations are applied to a copy of the
//! in-memory tree, written to a temp file next to the archive and renamed over
//! it. The in-memory tree is only replaced once the rename succeeded.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::adapter::{guess_mimetype, Adapter, Metadata, WriteOptions};
use crate::error::{Result, VfsError};
use crate::path;

/// Upper bound on the buffer reserved from an entry's declared size; the
/// header value is untrusted, larger entries grow while reading
const MAX_PREALLOCATION: u64 = 1 << 20;

#[derive(Debug, Clone)]
enum ZipNode {
    File {
        data: Bytes,
        timestamp: Option<DateTime<Utc>>,
    },
    Dir {
        timestamp: Option<DateTime<Utc>>,
    },
}

impl ZipNode {
    fn to_metadata(&self, path: &str) -> Metadata {
        match self {
            ZipNode::File { data, timestamp } => Metadata::file(path, data.len() as u64)
                .with_timestamp(*timestamp)
                .with_mimetype(Some(guess_mimetype(path))),
            ZipNode::Dir { timestamp } => Metadata::dir(path).with_timestamp(*timestamp),
        }
    }
}

type Tree = BTreeMap<String, ZipNode>;

pub struct ZipAdapter {
    archive: PathBuf,
    nodes: Mutex<Tree>,
}

impl ZipAdapter {
    /// Load an archive. A missing file yields an empty archive that is
    /// created on the first mutation.
    pub async fn open(archive: impl Into<PathBuf>) -> Result<Self> {
        let archive = archive.into();
        let path = archive.clone();
        let nodes = tokio::task::spawn_blocking(move || load_tree(&path))
            .await
            .map_err(|e| VfsError::Backend(format!("zip load task failed: {}", e)))??;

        debug!("opened zip archive {:?} with {} entries", archive, nodes.len());
        Ok(Self {
            archive,
            nodes: Mutex::new(nodes),
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }

    /// Apply `change` to a copy of the tree and persist it; the live tree is
    /// only swapped in after the archive hit the disk.
    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Tree) -> Result<T>,
    {
        let mut nodes = self.nodes.lock().await;
        let mut next = nodes.clone();
        let out = change(&mut next)?;

        let archive = self.archive.clone();
        let snapshot = next.clone();
        tokio::task::spawn_blocking(move || persist_tree(&archive, &snapshot))
            .await
            .map_err(|e| VfsError::Backend(format!("zip write task failed: {}", e)))??;

        *nodes = next;
        Ok(out)
    }
}

fn load_tree(archive: &Path) -> Result<Tree> {
    let mut tree = Tree::new();
    let file = match std::fs::File::open(archive) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tree),
        Err(e) => return Err(VfsError::Io(e)),
    };
    let loaded_at = file
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);

    let mut zip = ZipArchive::new(file)
        .map_err(|e| VfsError::Backend(format!("corrupt zip archive {:?}: {}", archive, e)))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| VfsError::Backend(format!("zip entry {}: {}", index, e)))?;
        let name = path::normalize(entry.name())?;
        if name.is_empty() {
            continue;
        }
        if entry.is_dir() {
            tree.insert(
                name,
                ZipNode::Dir {
                    timestamp: loaded_at,
                },
            );
        } else {
            let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| VfsError::Backend(format!("zip entry {}: {}", name, e)))?;
            insert_parents(&mut tree, &name, loaded_at);
            tree.insert(
                name,
                ZipNode::File {
                    data: Bytes::from(data),
                    timestamp: loaded_at,
                },
            );
        }
    }

    Ok(tree)
}

fn persist_tree(archive: &Path, tree: &Tree) -> Result<()> {
    let tmp = PathBuf::from(format!("{}.tmp", archive.display()));
    let guard = scopeguard::guard(tmp, |tmp| {
        let _ = std::fs::remove_file(tmp);
    });

    let file = std::fs::File::create(&*guard)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let zip_err = |e: zip::result::ZipError| VfsError::Backend(format!("zip write: {}", e));

    for (name, node) in tree {
        match node {
            ZipNode::Dir { .. } => writer
                .add_directory(format!("{}/", name), options)
                .map_err(zip_err)?,
            ZipNode::File { data, .. } => {
                writer.start_file(name.as_str(), options).map_err(zip_err)?;
                writer.write_all(data)?;
            }
        }
    }
    writer.finish().map_err(zip_err)?;

    std::fs::rename(&*guard, archive)?;
    scopeguard::ScopeGuard::into_inner(guard);
    Ok(())
}

fn insert_parents(tree: &mut Tree, path: &str, timestamp: Option<DateTime<Utc>>) {
    for ancestor in path::ancestors(path) {
        if ancestor.is_empty() {
            break;
        }
        tree.entry(ancestor.to_string())
            .or_insert(ZipNode::Dir { timestamp });
    }
}

#[async_trait]
impl Adapter for ZipAdapter {
    fn name(&self) -> &str {
        "zip"
    }

    fn instance_local(&self) -> bool {
        true
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        trace!("read: path={}", path);
        match self.nodes.lock().await.get(path) {
            Some(ZipNode::File { data, .. }) => Ok(data.clone()),
            _ => Err(VfsError::NotFound(path.to_string())),
        }
    }

    async fn write(&self, path: &str, contents: &[u8], _options: &WriteOptions) -> Result<Metadata> {
        debug!("write: archive={:?} path={} size={}", self.archive, path, contents.len());
        let data = Bytes::copy_from_slice(contents);
        let path_owned = path.to_string();
        self.mutate(move |tree| {
            if let Some(ZipNode::Dir { .. }) = tree.get(&path_owned) {
                return Err(VfsError::AlreadyExists(path_owned.clone()));
            }
            let now = Some(Utc::now());
            insert_parents(tree, &path_owned, now);
            let node = ZipNode::File {
                data,
                timestamp: now,
            };
            let metadata = node.to_metadata(&path_owned);
            tree.insert(path_owned, node);
            Ok(metadata)
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!("delete: archive={:?} path={}", self.archive, path);
        self.mutate(|tree| match tree.get(path) {
            Some(ZipNode::File { .. }) => {
                tree.remove(path);
                Ok(())
            }
            _ => Err(VfsError::NotFound(path.to_string())),
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        debug!("rename: archive={:?} from={} to={}", self.archive, from, to);
        self.mutate(|tree| {
            let node = match tree.remove(from) {
                Some(node @ ZipNode::File { .. }) => node,
                Some(other) => {
                    tree.insert(from.to_string(), other);
                    return Err(VfsError::NotFound(from.to_string()));
                }
                None => return Err(VfsError::NotFound(from.to_string())),
            };
            insert_parents(tree, to, Some(Utc::now()));
            tree.insert(to.to_string(), node);
            Ok(())
        })
        .await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        debug!("copy: archive={:?} from={} to={}", self.archive, from, to);
        self.mutate(|tree| {
            let data = match tree.get(from) {
                Some(ZipNode::File { data, .. }) => data.clone(),
                _ => return Err(VfsError::NotFound(from.to_string())),
            };
            let now = Some(Utc::now());
            insert_parents(tree, to, now);
            tree.insert(
                to.to_string(),
                ZipNode::File {
                    data,
                    timestamp: now,
                },
            );
            Ok(())
        })
        .await
    }

    async fn create_dir(&self, dirname: &str, _options: &WriteOptions) -> Result<Metadata> {
        debug!("create_dir: archive={:?} path={}", self.archive, dirname);
        self.mutate(|tree| {
            if let Some(ZipNode::File { .. }) = tree.get(dirname) {
                return Err(VfsError::AlreadyExists(dirname.to_string()));
            }
            let now = Some(Utc::now());
            insert_parents(tree, dirname, now);
            let node = tree
                .entry(dirname.to_string())
                .or_insert(ZipNode::Dir { timestamp: now });
            Ok(node.to_metadata(dirname))
        })
        .await
    }

    async fn delete_dir(&self, dirname: &str) -> Result<()> {
        debug!("delete_dir: archive={:?} path={}", self.archive, dirname);
        self.mutate(|tree| {
            if !matches!(tree.get(dirname), Some(ZipNode::Dir { .. })) {
                return Err(VfsError::NotFound(dirname.to_string()));
            }
            tree.retain(|key, _| key != dirname && !path::is_descendant(key, dirname));
            Ok(())
        })
        .await
    }

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        let tree = self.nodes.lock().await;
        Ok(tree
            .iter()
            .filter(|(key, _)| {
                if recursive {
                    path::is_descendant(key, directory)
                } else {
                    path::is_child(key, directory)
                }
            })
            .map(|(key, node)| node.to_metadata(key))
            .collect())
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        if path.is_empty() {
            return Ok(Metadata::dir(""));
        }
        self.nodes
            .lock()
            .await
            .get(path)
            .map(|node| node.to_metadata(path))
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");

        let adapter = ZipAdapter::open(&archive).await.unwrap();
        adapter
            .write("docs/readme.md", b"# hello", &WriteOptions::default())
            .await
            .unwrap();
        assert!(archive.exists());
        assert!(!dir.path().join("bundle.zip.tmp").exists());
        drop(adapter);

        let reopened = ZipAdapter::open(&archive).await.unwrap();
        assert_eq!(
            reopened.read("docs/readme.md").await.unwrap(),
            Bytes::from("# hello")
        );
        assert!(reopened.metadata("docs").await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_corrupt_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        let result = ZipAdapter::open(&archive).await;
        assert!(matches!(result, Err(VfsError::Backend(_))));
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_tree() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ZipAdapter::open(dir.path().join("a.zip")).await.unwrap();

        let err = adapter.delete("missing.txt").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(adapter.list_contents("", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_visibility_support() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ZipAdapter::open(dir.path().join("a.zip")).await.unwrap();
        adapter
            .write("f.txt", b"x", &WriteOptions::default())
            .await
            .unwrap();

        assert!(matches!(
            adapter.visibility("f.txt").await,
            Err(VfsError::UnsupportedOperation { .. })
        ));
    }

    /// Overwrite the uncompressed size in every central directory record
    fn inflate_declared_sizes(raw: &mut [u8], declared: u32) {
        let signature = [0x50, 0x4b, 0x01, 0x02];
        let mut offset = 0;
        while offset + 28 <= raw.len() {
            if raw[offset..offset + 4] == signature {
                raw[offset + 24..offset + 28].copy_from_slice(&declared.to_le_bytes());
                offset += 46;
            } else {
                offset += 1;
            }
        }
    }

    #[tokio::test]
    async fn test_declared_size_is_not_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lying.zip");

        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(
                "doc.txt",
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
            )
            .unwrap();
        writer.write_all(b"hello").unwrap();
        let mut raw = writer.finish().unwrap().into_inner();
        inflate_declared_sizes(&mut raw, 0xFFFF_FFF0);
        std::fs::write(&archive, &raw).unwrap();

        match ZipAdapter::open(&archive).await {
            Ok(adapter) => assert_eq!(adapter.read("doc.txt").await.unwrap(), Bytes::from("hello")),
            Err(e) => assert!(matches!(e, VfsError::Backend(_)), "unexpected error: {:?}", e),
        }
    }
}
