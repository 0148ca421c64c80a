//! Configuration parsing and structures

use std::collections::BTreeMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::adapter::Visibility;
use crate::cache::CacheConfig;
use crate::env::substitute_env_vars;
use crate::error::{Result as VfsResult, VfsError};

/// Per-connection (or top-level fallback) caching switch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachingConfig {
    #[serde(default)]
    pub enable: bool,
}

/// One named connection: a driver technology plus its raw settings.
///
/// Every key other than `driver` and `caching` is kept verbatim so that
/// connectors can read whatever their technology needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Technology identifier; falls back to the connection name when absent
    #[serde(default)]
    pub driver: Option<String>,

    /// Opt into the cache decorator for this connection
    #[serde(default)]
    pub caching: Option<CachingConfig>,

    #[serde(flatten)]
    settings: BTreeMap<String, Value>,
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            caching: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_caching(mut self, enable: bool) -> Self {
        self.caching = Some(CachingConfig { enable });
        self
    }

    pub fn driver(&self) -> Option<&str> {
        self.driver.as_deref()
    }

    /// Raw settings map, for connectors that hand the whole payload to a client
    pub fn settings(&self) -> &BTreeMap<String, Value> {
        &self.settings
    }

    /// First key present among `keys`, rendered as a string
    pub fn get_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| self.settings.get(*k))
            .and_then(value_to_string)
    }

    pub fn get_bool(&self, keys: &[&str]) -> Option<bool> {
        keys.iter()
            .find_map(|k| self.settings.get(*k))
            .and_then(|v| match v {
                Value::Bool(b) => Some(*b),
                Value::String(s) => s.parse().ok(),
                _ => None,
            })
    }

    /// Mandatory setting; the first key is the canonical name reported on absence
    pub fn require_str(&self, connector: &str, keys: &[&str]) -> VfsResult<String> {
        self.get_str(keys)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VfsError::missing_setting(connector, keys.first().copied().unwrap_or("")))
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Top-level configuration owned by the connection registry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Default driver name when none is requested
    pub default: Option<String>,

    /// Named connections
    pub connections: Option<IndexMap<String, ConnectionConfig>>,

    /// Legacy spelling of `connections`
    pub drivers: Option<IndexMap<String, ConnectionConfig>>,

    /// Extra driver names mapped onto built-in technologies
    #[serde(default)]
    pub adapters: IndexMap<String, String>,

    /// Caching flag for connections that do not set their own
    pub caching: Option<CachingConfig>,

    /// Cache store owned by the registry
    #[serde(default)]
    pub cache: CacheConfig,

    /// Facade-wide default visibility
    pub visibility: Option<Visibility>,

    /// Disable facade assertion checks
    #[serde(default)]
    pub pirate: bool,

    /// Stream-wrapper protocol name
    pub stream_protocol: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references first
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Named connections, preferring `connections` over `drivers`
    pub fn named_connections(&self) -> Option<&IndexMap<String, ConnectionConfig>> {
        self.connections.as_ref().or(self.drivers.as_ref())
    }

    /// Look a connection block up under either spelling
    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections
            .as_ref()
            .and_then(|c| c.get(name))
            .or_else(|| self.drivers.as_ref().and_then(|d| d.get(name)))
    }

    pub fn with_connection(mut self, name: impl Into<String>, block: ConnectionConfig) -> Self {
        self.connections
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), block);
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(default) = &self.default {
            if default.is_empty() {
                return Err(ConfigError::ValidationError(
                    "default driver cannot be empty".to_string(),
                ));
            }
        }

        for (name, technology) in &self.adapters {
            if technology.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "adapter `{}` must name a technology",
                    name
                )));
            }
        }

        if let CacheConfig::Filesystem { path } = &self.cache {
            if path.is_empty() {
                return Err(ConfigError::ValidationError(
                    "filesystem cache requires a path".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connections() {
        let yaml = r#"
default: uploads
visibility: private
pirate: true
stream_protocol: flysystem

connections:
  uploads:
    driver: local
    root: /var/uploads
    caching:
      enable: true
  archive:
    driver: zip
    path: /tmp/archive.zip
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.default.as_deref(), Some("uploads"));
        assert_eq!(config.visibility, Some(Visibility::Private));
        assert!(config.pirate);
        assert_eq!(config.stream_protocol.as_deref(), Some("flysystem"));

        let connections = config.named_connections().unwrap();
        let names: Vec<_> = connections.keys().cloned().collect();
        assert_eq!(names, vec!["uploads", "archive"]);

        let uploads = config.connection("uploads").unwrap();
        assert_eq!(uploads.driver(), Some("local"));
        assert_eq!(uploads.get_str(&["root"]), Some("/var/uploads".to_string()));
        assert_eq!(uploads.caching, Some(CachingConfig { enable: true }));
        assert!(!uploads.settings().contains_key("driver"));
    }

    #[test]
    fn test_drivers_spelling() {
        let yaml = r#"
drivers:
  scratch:
    driver: memory
"#;
        let config = Config::from_str(yaml).unwrap();
        assert!(config.connection("scratch").is_some());
        assert_eq!(config.named_connections().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_config() {
        let config = Config::from_str("{}").unwrap();
        assert!(config.default.is_none());
        assert!(config.named_connections().is_none());
        assert_eq!(config.logging.level, "info");
        assert!(matches!(config.cache, CacheConfig::Memory));
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("VFS_TEST_BUCKET_NAME", "from-env");
        let yaml = r#"
connections:
  cloud:
    driver: s3
    bucket: ${VFS_TEST_BUCKET_NAME}
"#;
        let config = Config::from_str(yaml).unwrap();
        assert_eq!(
            config.connection("cloud").unwrap().get_str(&["bucket"]),
            Some("from-env".to_string())
        );
        std::env::remove_var("VFS_TEST_BUCKET_NAME");
    }

    #[test]
    fn test_require_str() {
        let block = ConnectionConfig::new("gcs").with_setting("projectId", "p1");
        assert_eq!(
            block.require_str("gcs", &["project_id", "projectId"]).unwrap(),
            "p1"
        );
        let err = block.require_str("gcs", &["bucket"]).unwrap_err();
        assert!(err.to_string().contains("\"bucket\""));
    }

    #[test]
    fn test_typed_getters() {
        let yaml = r#"
connections:
  dav:
    driver: webdav
    timeout: 30
    force_path_style: "true"
"#;
        let config = Config::from_str(yaml).unwrap();
        let dav = config.connection("dav").unwrap();
        assert_eq!(dav.get_bool(&["force_path_style"]), Some(true));
        assert_eq!(dav.get_str(&["timeout"]), Some("30".to_string()));
    }

    #[test]
    fn test_validate_filesystem_cache_path() {
        let yaml = r#"
cache:
  type: filesystem
  path: ""
"#;
        assert!(Config::from_str(yaml).is_err());
    }
}
