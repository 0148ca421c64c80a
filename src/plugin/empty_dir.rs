use async_trait::async_trait;

use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::plugin::{required_str, Plugin, PluginArg, PluginOutput};

/// `empty_dir(dir)`: remove everything inside `dir`, keeping `dir` itself
pub struct EmptyDir;

#[async_trait]
impl Plugin for EmptyDir {
    fn method(&self) -> &'static str {
        "empty_dir"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let directory = required_str(args, 0, "directory")?;

        for entry in fs.list_contents(directory, false).await? {
            if entry.is_dir() {
                fs.delete_dir(&entry.path).await?;
            } else {
                fs.delete(&entry.path).await?;
            }
        }
        Ok(PluginOutput::Done(true))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapter::memory::MemoryAdapter;

    #[tokio::test]
    async fn test_keeps_directory() {
        let mut fs = Filesystem::new(Arc::new(MemoryAdapter::new()));
        fs.add_plugin(Arc::new(EmptyDir));
        fs.write("tmp/a.txt", "1").await.unwrap();
        fs.write("tmp/nested/b.txt", "2").await.unwrap();
        fs.write("keep.txt", "3").await.unwrap();

        fs.call("empty_dir", &["tmp".into()]).await.unwrap();

        assert!(fs.has("tmp").await.unwrap());
        assert!(fs.list_contents("tmp", true).await.unwrap().is_empty());
        assert!(fs.has("keep.txt").await.unwrap());
    }
}
