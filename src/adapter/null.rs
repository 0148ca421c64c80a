//! Null adapter: accepts every mutation, stores nothing

use async_trait::async_trait;
use bytes::Bytes;

use crate::adapter::{Adapter, Metadata, Visibility, WriteOptions};
use crate::error::{Result, VfsError};

#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

#[async_trait]
impl Adapter for NullAdapter {
    fn name(&self) -> &str {
        "null"
    }

    fn instance_local(&self) -> bool {
        true
    }

    async fn has(&self, _path: &str) -> Result<bool> {
        Ok(false)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        Err(VfsError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        Ok(Metadata::file(path, contents.len() as u64).with_visibility(options.visibility))
    }

    async fn delete(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn rename(&self, _from: &str, _to: &str) -> Result<()> {
        Ok(())
    }

    async fn copy(&self, _from: &str, _to: &str) -> Result<()> {
        Ok(())
    }

    async fn create_dir(&self, dirname: &str, options: &WriteOptions) -> Result<Metadata> {
        Ok(Metadata::dir(dirname).with_visibility(options.visibility))
    }

    async fn delete_dir(&self, _dirname: &str) -> Result<()> {
        Ok(())
    }

    async fn list_contents(&self, _directory: &str, _recursive: bool) -> Result<Vec<Metadata>> {
        Ok(Vec::new())
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        Err(VfsError::NotFound(path.to_string()))
    }

    async fn set_visibility(&self, _path: &str, _visibility: Visibility) -> Result<()> {
        Ok(())
    }
}
