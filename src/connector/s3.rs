//! S3 connector
//!
//! Amazon S3 or any S3-compatible store (MinIO, LocalStack, ...). Credentials
//! come from `key`/`secret` when both are set, from the AWS provider chain
//! otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::object_storage::{ObjectStorageAdapter, ObjectStorageConfig};
use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::connector::Connector;
use crate::error::Result;

pub struct S3Connector;

impl S3Connector {
    pub fn storage_config(config: &ConnectionConfig) -> Result<ObjectStorageConfig> {
        let bucket = config.require_str("s3", &["bucket"])?;

        let credentials = match (
            config.get_str(&["key", "access_key_id"]),
            config.get_str(&["secret", "secret_access_key"]),
        ) {
            (Some(key), Some(secret)) => Some((key, secret)),
            _ => None,
        };

        Ok(ObjectStorageConfig {
            bucket,
            prefix: config.get_str(&["prefix"]),
            region: config.get_str(&["region"]),
            endpoint: config.get_str(&["endpoint"]),
            force_path_style: config
                .get_bool(&["force_path_style", "use_path_style_endpoint"])
                .unwrap_or(false),
            credentials,
        })
    }
}

#[async_trait]
impl Connector for S3Connector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        let storage = Self::storage_config(config)?;
        debug!(
            "s3 connector: bucket={} prefix={:?} endpoint={:?}",
            storage.bucket, storage.prefix, storage.endpoint
        );
        Ok(Arc::new(ObjectStorageAdapter::new("s3", storage).await?))
    }
}
