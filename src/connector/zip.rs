use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::zip::ZipAdapter;
use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::connector::Connector;
use crate::error::Result;

pub struct ZipConnector;

#[async_trait]
impl Connector for ZipConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        let path = config.require_str("zip", &["path"])?;
        debug!("zip connector: archive={}", path);
        Ok(Arc::new(ZipAdapter::open(path).await?))
    }
}
