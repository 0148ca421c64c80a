//! Named operations layered on top of the facade
//!
//! A plugin provides one method name and is invoked through
//! [`Filesystem::call`](crate::filesystem::Filesystem::call) with positional,
//! typed arguments. Plugins only use the facade's public operations, so a
//! backend gap shows up as the primitive's own `UnsupportedOperation`.

mod empty_dir;
mod force;
mod listing;
mod metadata;

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::Metadata;
use crate::error::{Result, VfsError};
use crate::filesystem::Filesystem;

pub use empty_dir::EmptyDir;
pub use force::{ForceCopy, ForceRename};
pub use listing::{ListDirectories, ListFiles, ListPaths, ListWith};
pub use metadata::GetWithMetadata;

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Method name this plugin answers to
    fn method(&self) -> &'static str;

    async fn handle(&self, fs: &Filesystem, args: &[PluginArg]) -> Result<PluginOutput>;
}

/// Positional plugin argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginArg {
    Str(String),
    Bool(bool),
    List(Vec<String>),
}

impl From<&str> for PluginArg {
    fn from(s: &str) -> Self {
        PluginArg::Str(s.to_string())
    }
}

impl From<String> for PluginArg {
    fn from(s: String) -> Self {
        PluginArg::Str(s)
    }
}

impl From<bool> for PluginArg {
    fn from(b: bool) -> Self {
        PluginArg::Bool(b)
    }
}

impl From<Vec<String>> for PluginArg {
    fn from(list: Vec<String>) -> Self {
        PluginArg::List(list)
    }
}

impl From<Vec<&str>> for PluginArg {
    fn from(list: Vec<&str>) -> Self {
        PluginArg::List(list.into_iter().map(str::to_string).collect())
    }
}

/// Plugin result
#[derive(Debug, Clone, PartialEq)]
pub enum PluginOutput {
    Done(bool),
    Listing(Vec<Metadata>),
    Paths(Vec<String>),
    Metadata(Metadata),
}

impl PluginOutput {
    pub fn as_done(&self) -> Option<bool> {
        match self {
            PluginOutput::Done(done) => Some(*done),
            _ => None,
        }
    }

    pub fn into_listing(self) -> Option<Vec<Metadata>> {
        match self {
            PluginOutput::Listing(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn into_paths(self) -> Option<Vec<String>> {
        match self {
            PluginOutput::Paths(paths) => Some(paths),
            _ => None,
        }
    }

    pub fn into_metadata(self) -> Option<Metadata> {
        match self {
            PluginOutput::Metadata(metadata) => Some(metadata),
            _ => None,
        }
    }
}

/// Mandatory string argument at `index`
pub(crate) fn required_str<'a>(args: &'a [PluginArg], index: usize, name: &str) -> Result<&'a str> {
    optional_str(args, index, name)?
        .ok_or_else(|| VfsError::InvalidArgument(format!("missing argument `{}`", name)))
}

pub(crate) fn optional_str<'a>(args: &'a [PluginArg], index: usize, name: &str) -> Result<Option<&'a str>> {
    match args.get(index) {
        None => Ok(None),
        Some(PluginArg::Str(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(mistyped(name, "a string", other)),
    }
}

pub(crate) fn optional_bool(args: &[PluginArg], index: usize, name: &str) -> Result<Option<bool>> {
    match args.get(index) {
        None => Ok(None),
        Some(PluginArg::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(mistyped(name, "a bool", other)),
    }
}

pub(crate) fn required_list<'a>(args: &'a [PluginArg], index: usize, name: &str) -> Result<&'a [String]> {
    match args.get(index) {
        None => Err(VfsError::InvalidArgument(format!("missing argument `{}`", name))),
        Some(PluginArg::List(list)) => Ok(list.as_slice()),
        // A single key is accepted in place of a one-element list
        Some(PluginArg::Str(s)) => Ok(std::slice::from_ref(s)),
        Some(other) => Err(mistyped(name, "a list", other)),
    }
}

fn mistyped(name: &str, expected: &str, got: &PluginArg) -> VfsError {
    VfsError::InvalidArgument(format!("argument `{}` must be {}, got {:?}", name, expected, got))
}

/// Optional `(directory, recursive)` pair starting at `index`
pub(crate) fn listing_args<'a>(args: &'a [PluginArg], index: usize) -> Result<(&'a str, bool)> {
    let directory = optional_str(args, index, "directory")?.unwrap_or("");
    let recursive = optional_bool(args, index + 1, "recursive")?.unwrap_or(false);
    Ok((directory, recursive))
}

/// Every plugin a connection gets by default
pub fn default_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(ListDirectories),
        Arc::new(ListFiles),
        Arc::new(ListPaths),
        Arc::new(ListWith),
        Arc::new(GetWithMetadata),
        Arc::new(ForceCopy),
        Arc::new(ForceRename),
        Arc::new(EmptyDir),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plugin_methods() {
        let mut methods: Vec<_> = default_plugins().iter().map(|p| p.method()).collect();
        methods.sort_unstable();
        assert_eq!(
            methods,
            vec![
                "empty_dir",
                "force_copy",
                "force_rename",
                "get_with_metadata",
                "list_directories",
                "list_files",
                "list_paths",
                "list_with",
            ]
        );
    }

    #[test]
    fn test_argument_helpers() {
        let args = vec![PluginArg::from("dir"), PluginArg::from(true)];
        assert_eq!(listing_args(&args, 0).unwrap(), ("dir", true));
        assert_eq!(listing_args(&[], 0).unwrap(), ("", false));

        assert!(matches!(
            required_str(&args, 1, "path"),
            Err(VfsError::InvalidArgument(_))
        ));
        assert!(matches!(
            required_str(&[], 0, "path"),
            Err(VfsError::InvalidArgument(_))
        ));
        assert_eq!(required_list(&args, 0, "keys").unwrap(), ["dir".to_string()]);
    }
}
