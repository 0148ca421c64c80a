use async_trait::async_trait;

use crate::adapter::Metadata;
use crate::error::{Result, VfsError};
use crate::filesystem::Filesystem;
use crate::plugin::{required_list, required_str, Plugin, PluginArg, PluginOutput};

/// Fill the named metadata fields of `entry` through the facade getters
pub(crate) async fn fill_keys(fs: &Filesystem, entry: &mut Metadata, keys: &[String]) -> Result<()> {
    for key in keys {
        match key.as_str() {
            "path" | "type" => {}
            "size" => entry.size = Some(fs.get_size(&entry.path).await?),
            "mimetype" => entry.mimetype = Some(fs.get_mimetype(&entry.path).await?),
            "timestamp" => entry.timestamp = Some(fs.get_timestamp(&entry.path).await?),
            "visibility" => entry.visibility = Some(fs.get_visibility(&entry.path).await?),
            other => {
                return Err(VfsError::InvalidArgument(format!(
                    "could not get meta-data for key `{}`",
                    other
                )))
            }
        }
    }
    Ok(())
}

/// `get_with_metadata(path, keys)`
pub struct GetWithMetadata;

#[async_trait]
impl Plugin for GetWithMetadata {
    fn method(&self) -> &'static str {
        "get_with_metadata"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let path = required_str(args, 0, "path")?;
        let keys = required_list(args, 1, "keys")?;

        let mut metadata = fs.get_metadata(path).await?;
        fill_keys(fs, &mut metadata, keys).await?;
        Ok(PluginOutput::Metadata(metadata))
    }
}
