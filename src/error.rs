use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for vfs-adapter operations
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("Undefined filesystem driver `{0}`")]
    UndefinedDriver(String),

    #[error("No connector registered for driver `{0}`")]
    UnknownDriver(String),

    #[error("The {connector} connector requires \"{setting}\" configuration")]
    MissingRequiredSetting { connector: String, setting: String },

    #[error("Operation `{operation}` is not supported by the {adapter} adapter")]
    UnsupportedOperation { adapter: String, operation: String },

    #[error("Call to undefined method `{0}`")]
    UnknownOperation(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl VfsError {
    /// Shorthand for a capability gap on a named adapter
    pub fn unsupported(adapter: &str, operation: &str) -> Self {
        VfsError::UnsupportedOperation {
            adapter: adapter.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn missing_setting(connector: &str, setting: &str) -> Self {
        VfsError::MissingRequiredSetting {
            connector: connector.to_string(),
            setting: setting.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<ConfigError> for VfsError {
    fn from(e: ConfigError) -> Self {
        VfsError::Config(e.to_string())
    }
}

/// Result type alias for vfs-adapter operations
pub type Result<T> = std::result::Result<T, VfsError>;
