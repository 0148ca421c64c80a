use async_trait::async_trait;

use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::plugin::metadata::fill_keys;
use crate::plugin::{listing_args, required_list, Plugin, PluginArg, PluginOutput};

/// `list_directories(dir?, recursive?)`
pub struct ListDirectories;

#[async_trait]
impl Plugin for ListDirectories {
    fn method(&self) -> &'static str {
        "list_directories"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let (directory, recursive) = listing_args(args, 0)?;
        let entries = fs.list_contents(directory, recursive).await?;
        Ok(PluginOutput::Listing(
            entries.into_iter().filter(|e| e.is_dir()).collect(),
        ))
    }
}

/// `list_files(dir?, recursive?)`
pub struct ListFiles;

#[async_trait]
impl Plugin for ListFiles {
    fn method(&self) -> &'static str {
        "list_files"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let (directory, recursive) = listing_args(args, 0)?;
        let entries = fs.list_contents(directory, recursive).await?;
        Ok(PluginOutput::Listing(
            entries.into_iter().filter(|e| e.is_file()).collect(),
        ))
    }
}

/// `list_paths(dir?, recursive?)`
pub struct ListPaths;

#[async_trait]
impl Plugin for ListPaths {
    fn method(&self) -> &'static str {
        "list_paths"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let (directory, recursive) = listing_args(args, 0)?;
        let entries = fs.list_contents(directory, recursive).await?;
        Ok(PluginOutput::Paths(
            entries.into_iter().map(|e| e.path).collect(),
        ))
    }
}

/// `list_with(keys, dir?, recursive?)`: listing with extra metadata filled
/// for file entries
pub struct ListWith;

#[async_trait]
impl Plugin for ListWith {
    fn method(&self) -> &'static str {
        "list_with"
    }

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput> {
        let keys = required_list(args, 0, "keys")?;
        let (directory, recursive) = listing_args(args, 1)?;

        let mut entries = fs.list_contents(directory, recursive).await?;
        for entry in entries.iter_mut().filter(|e| e.is_file()) {
            fill_keys(fs, entry, keys).await?;
        }
        Ok(PluginOutput::Listing(entries))
    }
}
