use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::null::NullAdapter;
use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::connector::Connector;
use crate::error::Result;

pub struct NullConnector;

#[async_trait]
impl Connector for NullConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        Ok(Arc::new(NullAdapter))
    }
}
