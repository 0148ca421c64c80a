//! Connectors and the connection factory
//!
//! A connector turns one connection block into one live adapter. The factory
//! maps technology names to connectors and dispatches by exact name.

pub mod gcs;
pub mod local;
pub mod memory;
pub mod null;
pub mod s3;
pub mod webdav;
pub mod zip;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::error::{Result, VfsError};

pub use gcs::GcsConnector;
pub use local::LocalConnector;
pub use memory::MemoryConnector;
pub use null::NullConnector;
pub use s3::S3Connector;
pub use webdav::WebDavConnector;
pub use zip::ZipConnector;

/// Builds an adapter for one storage technology
///
/// Connectors validate mandatory settings before touching any resource and
/// never reach out to the network while connecting.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Adapter>>;
}

/// Connector for a built-in technology name
pub fn builtin(technology: &str) -> Option<Arc<dyn Connector>> {
    let connector: Arc<dyn Connector> = match technology {
        "local" => Arc::new(LocalConnector),
        "null" => Arc::new(NullConnector),
        "array" | "memory" => Arc::new(MemoryConnector),
        "zip" => Arc::new(ZipConnector),
        "s3" => Arc::new(S3Connector),
        "gcs" => Arc::new(GcsConnector),
        "webdav" => Arc::new(WebDavConnector),
        _ => return None,
    };
    Some(connector)
}

/// Technology names served by [`builtin`]
pub const BUILTIN_TECHNOLOGIES: &[&str] =
    &["local", "null", "array", "memory", "zip", "s3", "gcs", "webdav"];

/// Technology name → connector
#[derive(Clone, Default)]
pub struct ConnectionFactory {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectionFactory {
    /// Empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in technology registered
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        for name in BUILTIN_TECHNOLOGIES {
            if let Some(connector) = builtin(name) {
                factory.register(*name, connector);
            }
        }
        factory
    }

    /// Register a connector; a later registration for the same name replaces
    /// the earlier one.
    pub fn register(&mut self, name: impl Into<String>, connector: Arc<dyn Connector>) {
        let name = name.into();
        if self.connectors.insert(name.clone(), connector).is_some() {
            debug!("connector `{}` overridden", name);
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.connectors.contains_key(name)
    }

    /// Registered technology names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build an adapter for `driver` from a read-only connection block
    pub async fn resolve(&self, driver: &str, config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        let connector = self
            .connectors
            .get(driver)
            .ok_or_else(|| VfsError::UnknownDriver(driver.to_string()))?;

        debug!("resolving technology `{}`", driver);
        connector.connect(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::null::NullAdapter;

    struct FixedConnector;

    #[async_trait]
    impl Connector for FixedConnector {
        async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
            Ok(Arc::new(NullAdapter))
        }
    }

    #[test]
    fn test_builtin_names() {
        let factory = ConnectionFactory::with_builtin();
        assert_eq!(
            factory.names(),
            vec!["array", "gcs", "local", "memory", "null", "s3", "webdav", "zip"]
        );
        assert!(builtin("ftp").is_none());
    }

    #[tokio::test]
    async fn test_unknown_driver() {
        let factory = ConnectionFactory::new();
        let result = factory.resolve("ftp", &ConnectionConfig::new("ftp")).await;
        assert!(matches!(result, Err(VfsError::UnknownDriver(name)) if name == "ftp"));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut factory = ConnectionFactory::with_builtin();
        factory.register("memory", Arc::new(FixedConnector));

        let adapter = factory
            .resolve("memory", &ConnectionConfig::new("memory"))
            .await
            .unwrap();
        assert_eq!(adapter.name(), "null");
    }

    #[tokio::test]
    async fn test_resolve_leaves_block_untouched() {
        let factory = ConnectionFactory::with_builtin();
        let block = ConnectionConfig::new("local").with_setting("root", "/tmp");
        let before = block.clone();

        factory.resolve("local", &block).await.unwrap();
        assert_eq!(block, before);
    }
}
