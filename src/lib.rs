//! vfs-adapter: a virtual filesystem facade over named storage connections
//!
//! This library resolves named connections from configuration into live
//! storage adapters and exposes them through one uniform file-operation
//! surface.
//!
//! # Architecture
//!
//! - **Adapters**: Storage backends (local disk, memory, null, zip archives,
//!   S3/GCS object storage, WebDAV) implementing the `Adapter` trait.
//! - **Connectors**: Per-technology builders that validate a connection block
//!   and construct an adapter; the `ConnectionFactory` dispatches by name.
//! - **Cache Layer**: Optional decorator caching metadata and listings in a
//!   pluggable `CacheStore`.
//! - **Filesystem**: The facade handed to application code, extended with
//!   named plugin operations.
//! - **Registry**: Resolves driver names to facades, applying defaults,
//!   caching and plugins.
//!
//! # Example
//!
//! ```no_run
//! use vfs_adapter::config::Config;
//! use vfs_adapter::registry::ConnectionRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"vfs.yaml".into())?;
//! let registry = ConnectionRegistry::from_config(config)?;
//!
//! let fs = registry.make_connection(Some("uploads")).await?;
//! fs.put("reports/today.txt", "done").await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cache;
pub mod config;
pub mod connector;
pub mod env;
pub mod error;
pub mod filesystem;
pub mod path;
pub mod plugin;
pub mod registry;

pub use error::{Result, VfsError};
