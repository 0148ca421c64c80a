//! Connection registry
//!
//! Owns the configuration and turns a driver name into a ready facade:
//! declared-name check, connector dispatch through the factory, optional
//! cache wrapping, default plugins. Every call builds a fresh adapter; callers
//! that want reuse keep the returned facade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::cache::{CacheStore, CachedAdapter};
use crate::config::{Config, ConnectionConfig};
use crate::connector::{self, ConnectionFactory, Connector};
use crate::error::{Result, VfsError};
use crate::filesystem::{Filesystem, FilesystemOptions};
use crate::plugin::{self, Plugin};

/// Technology used when neither a name nor a configured default is given
pub const DEFAULT_DRIVER: &str = "local";

/// Driver names that resolve without a connection block
pub const IMPLICIT_DRIVERS: &[&str] = &["null", "array", "memory", DEFAULT_DRIVER];

/// Resolution state of a named connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Only the configuration is known
    Unresolved,
    /// Connector invoked
    Resolving,
    /// Adapter built
    Ready,
    /// Driver lookup or connector failed
    Failed,
}

pub struct ConnectionRegistry {
    config: Config,
    factory: ConnectionFactory,
    store: Option<Arc<dyn CacheStore>>,
    states: Mutex<HashMap<String, ConnectionState>>,
    /// Sequence for cache namespaces of instance-local adapters
    instances: AtomicU64,
}

impl ConnectionRegistry {
    /// Build a registry over `config`, wrapping opted-in connections with
    /// `store` when one is given.
    pub fn new(config: Config, store: Option<Arc<dyn CacheStore>>) -> Result<Self> {
        let mut factory = ConnectionFactory::with_builtin();
        for (name, technology) in &config.adapters {
            let connector = connector::builtin(technology)
                .ok_or_else(|| VfsError::UnknownDriver(technology.clone()))?;
            debug!("registering adapter `{}` as {}", name, technology);
            factory.register(name.clone(), connector);
        }

        let states = config
            .named_connections()
            .map(|connections| {
                connections
                    .keys()
                    .map(|name| (name.clone(), ConnectionState::Unresolved))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            config,
            factory,
            store,
            states: Mutex::new(states),
            instances: AtomicU64::new(0),
        })
    }

    /// Build a registry together with the cache store its configuration names
    pub fn from_config(config: Config) -> Result<Self> {
        let store = config.cache.build()?;
        Self::new(config, store)
    }

    /// Register or override a connector for a technology name
    pub fn with_connector(mut self, name: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        self.factory.register(name, connector);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    pub fn cache_store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.store.as_ref()
    }

    pub fn default_driver(&self) -> &str {
        self.config.default.as_deref().unwrap_or(DEFAULT_DRIVER)
    }

    /// Whether `name` is declared or allow-listed
    pub fn has_driver(&self, name: &str) -> bool {
        self.config.connection(name).is_some() || IMPLICIT_DRIVERS.contains(&name)
    }

    pub fn stream_protocol(&self) -> Option<&str> {
        self.config.stream_protocol.as_deref()
    }

    pub fn options(&self) -> FilesystemOptions {
        FilesystemOptions {
            visibility: self.config.visibility,
            disable_asserts: self.config.pirate,
        }
    }

    pub fn default_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        plugin::default_plugins()
    }

    /// Last recorded state of a connection; `None` for names never declared
    /// nor requested
    pub fn state(&self, name: &str) -> Option<ConnectionState> {
        self.states.lock().get(name).copied()
    }

    fn set_state(&self, name: &str, state: ConnectionState) {
        self.states.lock().insert(name.to_string(), state);
    }

    fn caching_enabled(&self, block: &ConnectionConfig) -> bool {
        block
            .caching
            .or(self.config.caching)
            .map(|c| c.enable)
            .unwrap_or(false)
    }

    /// Cache namespace for a new adapter of connection `name`. Adapters over
    /// shared storage reuse the connection name; instance-local ones get a
    /// namespace of their own.
    fn cache_namespace(&self, name: &str, adapter: &dyn Adapter) -> String {
        if adapter.instance_local() {
            let instance = self.instances.fetch_add(1, Ordering::Relaxed);
            format!("{}#{}", name, instance)
        } else {
            name.to_string()
        }
    }

    /// Build the adapter for a driver name, cache-wrapped when both a store
    /// exists and the connection opted in
    pub async fn file_adapter(&self, name: &str) -> Result<Arc<dyn Adapter>> {
        if !self.has_driver(name) {
            self.set_state(name, ConnectionState::Failed);
            return Err(VfsError::UndefinedDriver(name.to_string()));
        }

        let block = self.config.connection(name).cloned().unwrap_or_default();
        let technology = block.driver().unwrap_or(name).to_string();

        self.set_state(name, ConnectionState::Resolving);
        debug!("resolving connection `{}` with technology `{}`", name, technology);

        let adapter = match self.factory.resolve(&technology, &block).await {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("connection `{}` failed: {}", name, e);
                self.set_state(name, ConnectionState::Failed);
                return Err(e);
            }
        };

        let adapter = match &self.store {
            Some(store) if self.caching_enabled(&block) => {
                let namespace = self.cache_namespace(name, adapter.as_ref());
                debug!("connection `{}` is cached under `{}`", name, namespace);
                Arc::new(CachedAdapter::new(adapter, store.clone(), namespace)) as Arc<dyn Adapter>
            }
            _ => adapter,
        };

        self.set_state(name, ConnectionState::Ready);
        Ok(adapter)
    }

    /// Build a facade with the default plugins; `None` picks the default driver
    pub async fn make_connection(&self, name: Option<&str>) -> Result<Filesystem> {
        let name = name.unwrap_or_else(|| self.default_driver());
        let adapter = self.file_adapter(name).await?;

        let mut filesystem = Filesystem::with_options(adapter, self.options());
        for plugin in self.default_plugins() {
            filesystem.add_plugin(plugin);
        }
        Ok(filesystem)
    }

    /// Resolve every declared connection, in declaration order; the first
    /// failure aborts the whole call
    pub async fn connections(&self) -> Result<IndexMap<String, Filesystem>> {
        let mut out = IndexMap::new();
        let Some(connections) = self.config.named_connections() else {
            return Ok(out);
        };

        for name in connections.keys() {
            let filesystem = self.make_connection(Some(name.as_str())).await?;
            out.insert(name.clone(), filesystem);
        }
        Ok(out)
    }
}
