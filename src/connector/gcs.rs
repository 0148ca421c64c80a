//! Google Cloud Storage connector
//!
//! GCS speaks the S3 XML API on its interoperability endpoint, so this
//! connector reuses the object-storage adapter with HMAC credentials.
//! Standard Google credential files (service account, authorized user) cannot
//! sign those requests and are rejected as unsupported.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapter::object_storage::{ObjectStorageAdapter, ObjectStorageConfig};
use crate::adapter::Adapter;
use crate::config::ConnectionConfig;
use crate::connector::Connector;
use crate::error::{Result, VfsError};

/// Interoperability endpoint used unless `api_uri` overrides it
pub const DEFAULT_API_URI: &str = "https://storage.googleapis.com";

/// HMAC key file contents
#[derive(Debug, Deserialize)]
pub struct HmacKey {
    #[serde(alias = "accessId")]
    pub access_id: String,
    pub secret: String,
}

/// Shapes a `key_file` may take
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyFile {
    Hmac(HmacKey),
    /// Standard Google credential file, identified by its `type`
    Google {
        #[serde(rename = "type")]
        kind: String,
    },
}

/// Validated GCS settings
#[derive(Debug, Clone, PartialEq)]
pub struct GcsSettings {
    pub project_id: String,
    pub bucket: String,
    pub key_file: Option<String>,
    pub prefix: Option<String>,
    pub api_uri: String,
}

impl GcsSettings {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let project_id = config.require_str("gcs", &["project_id", "projectId"])?;
        let bucket = config.require_str("gcs", &["bucket"])?;

        Ok(Self {
            project_id,
            bucket,
            key_file: config.get_str(&["key_file", "keyFile"]),
            prefix: config.get_str(&["prefix"]),
            api_uri: config
                .get_str(&["api_uri", "apiUri"])
                .unwrap_or_else(|| DEFAULT_API_URI.to_string()),
        })
    }
}

async fn read_key_file(path: &str) -> Result<HmacKey> {
    let raw = tokio::fs::read_to_string(path).await?;
    let key: KeyFile = serde_json::from_str(&raw)
        .map_err(|e| VfsError::Config(format!("invalid gcs key file {}: {}", path, e)))?;
    match key {
        KeyFile::Hmac(key) => Ok(key),
        KeyFile::Google { kind } => {
            warn!("gcs key file {} holds `{}` credentials, an HMAC key is needed", path, kind);
            Err(VfsError::unsupported("gcs", &format!("{} credentials", kind)))
        }
    }
}

pub struct GcsConnector;

#[async_trait]
impl Connector for GcsConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
        let settings = GcsSettings::from_config(config)?;
        debug!(
            "gcs connector: project={} bucket={} api_uri={}",
            settings.project_id, settings.bucket, settings.api_uri
        );

        let credentials = match &settings.key_file {
            Some(path) => {
                let key = read_key_file(path).await?;
                Some((key.access_id, key.secret))
            }
            None => None,
        };

        let storage = ObjectStorageConfig {
            bucket: settings.bucket,
            prefix: settings.prefix,
            region: Some("auto".to_string()),
            endpoint: Some(settings.api_uri),
            force_path_style: true,
            credentials,
        };

        Ok(Arc::new(ObjectStorageAdapter::new("gcs", storage).await?))
    }
}
