//! In-memory adapter
//!
//! Everything lives in a single ordered map guarded by a lock. Parent
//! directories are created implicitly on write, which keeps listings
//! consistent with what the other backends report.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::trace;

use crate::adapter::{guess_mimetype, Adapter, Metadata, Visibility, WriteOptions};
use crate::error::{Result, VfsError};
use crate::path;

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Bytes,
        timestamp: DateTime<Utc>,
        visibility: Visibility,
    },
    Dir {
        timestamp: DateTime<Utc>,
        visibility: Visibility,
    },
}

impl Node {
    fn to_metadata(&self, path: &str) -> Metadata {
        match self {
            Node::File {
                data,
                timestamp,
                visibility,
            } => Metadata::file(path, data.len() as u64)
                .with_timestamp(Some(*timestamp))
                .with_mimetype(Some(guess_mimetype(path)))
                .with_visibility(Some(*visibility)),
            Node::Dir {
                timestamp,
                visibility,
            } => Metadata::dir(path)
                .with_timestamp(Some(*timestamp))
                .with_visibility(Some(*visibility)),
        }
    }
}

/// In-process storage, dropped with the adapter
#[derive(Default)]
pub struct MemoryAdapter {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str) -> Result<()> {
        for ancestor in path::ancestors(path) {
            if ancestor.is_empty() {
                break;
            }
            match nodes.get(ancestor) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => {
                    return Err(VfsError::Backend(format!(
                        "parent of {} is a file: {}",
                        path, ancestor
                    )))
                }
                None => {
                    nodes.insert(
                        ancestor.to_string(),
                        Node::Dir {
                            timestamp: Utc::now(),
                            visibility: Visibility::Public,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn file_data(&self, path: &str) -> Result<Bytes> {
        match self.nodes.read().get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            _ => Err(VfsError::NotFound(path.to_string())),
        }
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    fn instance_local(&self) -> bool {
        true
    }

    async fn has(&self, path: &str) -> Result<bool> {
        Ok(path.is_empty() || self.nodes.read().contains_key(path))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        trace!("read: path={}", path);
        self.file_data(path)
    }

    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        trace!("write: path={} size={}", path, contents.len());
        let mut nodes = self.nodes.write();
        if let Some(Node::Dir { .. }) = nodes.get(path) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        Self::ensure_parents(&mut nodes, path)?;

        let visibility = options.visibility.unwrap_or_else(|| match nodes.get(path) {
            Some(Node::File { visibility, .. }) => *visibility,
            _ => Visibility::Public,
        });
        let node = Node::File {
            data: Bytes::copy_from_slice(contents),
            timestamp: Utc::now(),
            visibility,
        };
        let metadata = node.to_metadata(path);
        nodes.insert(path.to_string(), node);
        Ok(metadata)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            _ => Err(VfsError::NotFound(path.to_string())),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        let node = match nodes.get(from) {
            Some(node @ Node::File { .. }) => node.clone(),
            _ => return Err(VfsError::NotFound(from.to_string())),
        };
        Self::ensure_parents(&mut nodes, to)?;
        nodes.remove(from);
        nodes.insert(to.to_string(), node);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        let node = match nodes.get(from) {
            Some(Node::File {
                data, visibility, ..
            }) => Node::File {
                data: data.clone(),
                timestamp: Utc::now(),
                visibility: *visibility,
            },
            _ => return Err(VfsError::NotFound(from.to_string())),
        };
        Self::ensure_parents(&mut nodes, to)?;
        nodes.insert(to.to_string(), node);
        Ok(())
    }

    async fn create_dir(&self, dirname: &str, options: &WriteOptions) -> Result<Metadata> {
        let mut nodes = self.nodes.write();
        if let Some(Node::File { .. }) = nodes.get(dirname) {
            return Err(VfsError::AlreadyExists(dirname.to_string()));
        }
        Self::ensure_parents(&mut nodes, dirname)?;
        let node = Node::Dir {
            timestamp: Utc::now(),
            visibility: options.visibility.unwrap_or_default(),
        };
        let metadata = node.to_metadata(dirname);
        nodes.insert(dirname.to_string(), node);
        Ok(metadata)
    }

    async fn delete_dir(&self, dirname: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        if !matches!(nodes.get(dirname), Some(Node::Dir { .. })) {
            return Err(VfsError::NotFound(dirname.to_string()));
        }
        nodes.retain(|key, _| key != dirname && !path::is_descendant(key, dirname));
        Ok(())
    }

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        let nodes = self.nodes.read();
        Ok(nodes
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
            .read()
            .get(path)
            .map(|node| node.to_metadata(path))
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(path) {
            Some(Node::File { visibility: v, .. }) | Some(Node::Dir { visibility: v, .. }) => {
                *v = visibility;
                Ok(())
            }
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let adapter = MemoryAdapter::new();
        adapter
            .write("a/b/c.txt", b"hello", &WriteOptions::default())
            .await
            .unwrap();

        assert!(adapter.metadata("a").await.unwrap().is_dir());
        assert!(adapter.metadata("a/b").await.unwrap().is_dir());
        assert_eq!(adapter.read("a/b/c.txt").await.unwrap(), Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_listing_depth() {
        let adapter = MemoryAdapter::new();
        let opts = WriteOptions::default();
        adapter.write("top.txt", b"1", &opts).await.unwrap();
        adapter.write("dir/inner.txt", b"2", &opts).await.unwrap();
        adapter.write("dir/sub/deep.txt", b"3", &opts).await.unwrap();

        let shallow: Vec<_> = adapter
            .list_contents("", false)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(shallow, vec!["dir", "top.txt"]);

        let deep = adapter.list_contents("dir", true).await.unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_dir_removes_subtree() {
        let adapter = MemoryAdapter::new();
        let opts = WriteOptions::default();
        adapter.write("dir/a.txt", b"1", &opts).await.unwrap();
        adapter.write("dir/sub/b.txt", b"2", &opts).await.unwrap();
        adapter.write("dirt.txt", b"3", &opts).await.unwrap();

        adapter.delete_dir("dir").await.unwrap();

        assert!(!adapter.has("dir/sub/b.txt").await.unwrap());
        assert!(adapter.has("dirt.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_visibility_round() {
        let adapter = MemoryAdapter::new();
        adapter
            .write("secret.txt", b"x", &WriteOptions::with_visibility(Visibility::Private))
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
}
