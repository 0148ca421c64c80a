use async_trait::async_trait;

use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::plugin::{required_str, Plugin, PluginArg, PluginOutput};

/// Remove `path` if it is there
async fn clear_destination(fs: &Filesystem, path: &str) -> Result<()> {
    match fs.delete(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// `force_copy(from, to)`: copy, replacing an existing destination
pub struct ForceCopy;

#[async_trait]
impl Plugin for ForceCopy {
    fn method(&self) -> &'static str {
        "force_copy"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let from = required_str(args, 0, "from")?;
        let to = required_str(args, 1, "to")?;

        clear_destination(fs, to).await?;
        fs.copy(from, to).await?;
        Ok(PluginOutput::Done(true))
    }
}

/// `force_rename(from, to)`: rename, replacing an existing destination
pub struct ForceRename;

#[async_trait]
impl Plugin for ForceRename {
    fn method(&self) -> &'static str {
        "force_rename"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let from = required_str(args, 0, "from")?;
        let to = required_str(args, 1, "to")?;

        clear_destination(fs, to).await?;
        fs.rename(from, to).await?;
        Ok(PluginOutput::Done(true))
    }
}
