use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::local::LocalAdapter;
use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::connector::Connector;
use crate::error::Result;

/// Root used when a local connection names none
pub const DEFAULT_ROOT: &str = ".";

pub struct LocalConnector;

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        let root = config
            .get_str(&["root"])
            .unwrap_or_else(|| DEFAULT_ROOT.to_string());
        debug!("local connector: root={}", root);
        Ok(Arc::new(LocalAdapter::new(root)))
    }
}
