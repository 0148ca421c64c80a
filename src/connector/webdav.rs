use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::webdav::{WebDavAdapter, WebDavClientSettings};
use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::connector::Connector;
use crate::error::Result;

/// Hands the whole settings map to the client; `prefix` is applied on top
pub struct WebDavConnector;

#[async_trait]
impl Connector for WebDavConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        let settings = WebDavClientSettings::from_settings(config.settings())?;
        let prefix = config.get_str(&["prefix"]);
        debug!("webdav connector: base_uri={} prefix={:?}", settings.base_uri, prefix);
        Ok(Arc::new(WebDavAdapter::new(settings, prefix)?))
    }
}
