use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::memory::MemoryAdapter;
use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::connector::Connector;
use crate::error::Result;

/// Serves both `array` and `memory`; each connect yields a fresh, empty store
pub struct MemoryConnector;

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        Ok(Arc::new(MemoryAdapter::new()))
    }
}
