//! Object storage adapter
//!
//! Talks the S3 API through `aws-sdk-s3`. Amazon S3 and S3-compatible stores
//! use it directly; Google Cloud Storage is reached through its XML
//! interoperability endpoint with HMAC credentials.
//!
//! Directories are virtual: a key ending in `/` marks an explicitly created
//! directory, and any common prefix counts as one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier, Permission};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, trace};

use crate::adapter::{guess_mimetype, Adapter, Metadata, Visibility, WriteOptions};
use crate::error::{Result, VfsError};
use crate::path;

/// Grantee URI that marks an object as world-readable
const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Characters left untouched when a key is used as a copy source
const COPY_SOURCE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Resolved settings for one bucket
#[derive(Debug, Clone, Default)]
pub struct ObjectStorageConfig {
    /// Bucket name
    pub bucket: String,

    /// Key prefix for mounting a subpath
    pub prefix: Option<String>,

    /// Region; left to the SDK's provider chain when absent
    pub region: Option<String>,

    /// Custom endpoint URL
    pub endpoint: Option<String>,

    /// Force path-style addressing
    pub force_path_style: bool,

    /// Static access key / secret pair; the SDK's provider chain otherwise
    pub credentials: Option<(String, String)>,
}

pub struct ObjectStorageAdapter {
    name: &'static str,
    client: Client,
    bucket: String,
    prefix: String,
}

impl ObjectStorageAdapter {
    /// Build a client for the bucket. No request is sent here.
    pub async fn new(name: &'static str, config: ObjectStorageConfig) -> Result<Self> {
        let mut sdk_config_builder = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(Region::new(region.clone()));
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        if let Some((access_key, secret)) = &config.credentials {
            s3_config_builder = s3_config_builder.credentials_provider(Credentials::new(
                access_key.clone(),
                secret.clone(),
                None,
                None,
                "vfs-adapter",
            ));
        }

        let client = Client::from_conf(s3_config_builder.build());

        let prefix = config
            .prefix
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_default();

        Ok(Self {
            name,
            client,
            bucket: config.bucket,
            prefix,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Convert a normalized path to an object key
    fn path_to_key(&self, path: &str) -> String {
        if path.is_empty() {
            self.prefix.clone()
        } else if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    /// Key prefix under which the children of `dir` live
    fn dir_key(&self, dir: &str) -> String {
        let mut key = self.path_to_key(dir);
        if !key.is_empty() && !key.ends_with('/') {
            key.push('/');
        }
        key
    }

    /// Convert an object key back to a normalized path
    fn key_to_path(&self, key: &str) -> String {
        let rel = if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key)
        };
        rel.trim_matches('/').to_string()
    }

    fn convert_time(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
    }

    fn canned_acl(visibility: Visibility) -> ObjectCannedAcl {
        match visibility {
            Visibility::Public => ObjectCannedAcl::PublicRead,
            Visibility::Private => ObjectCannedAcl::Private,
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: Option<String>, options: &WriteOptions) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type)
            .set_acl(options.visibility.map(Self::canned_acl))
            .send()
            .await
            .map_err(|e| VfsError::Backend(format!("PutObject error: {}", e.into_service_error())))?;
        Ok(())
    }
}

#[async_trait]
impl Adapter for ObjectStorageAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let key = self.path_to_key(path);
        trace!("read: path={} key={}", path, key);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    VfsError::NotFound(path.to_string())
                } else {
                    VfsError::Backend(format!("GetObject error: {}", service_error))
                }
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| VfsError::Backend(format!("read body error: {}", e)))?;

        Ok(body.into_bytes())
    }

    async fn write(&self, path: &str, contents: &[u8], options: &WriteOptions) -> Result<Metadata> {
        let key = self.path_to_key(path);
        debug!("write: path={} key={} size={}", path, key, contents.len());

        let mimetype = guess_mimetype(path);
        self.put(&key, contents.to_vec(), Some(mimetype.clone()), options)
            .await?;

        Ok(Metadata::file(path, contents.len() as u64)
            .with_mimetype(Some(mimetype))
            .with_visibility(options.visibility))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.path_to_key(path);
        debug!("delete: path={} key={}", path, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| VfsError::Backend(format!("DeleteObject error: {}", e.into_service_error())))?;

        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        // No native rename in the S3 API
        self.copy(from, to).await?;
        self.delete(from).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src = self.path_to_key(from);
        let dst = self.path_to_key(to);
        debug!("copy: src={} dst={}", src, dst);

        let copy_source = format!(
            "{}/{}",
            self.bucket,
            utf8_percent_encode(&src, COPY_SOURCE_SET)
        );

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&dst)
            .copy_source(copy_source)
            .send()
            .await
            .map_err(|e| VfsError::Backend(format!("CopyObject error: {}", e.into_service_error())))?;

        Ok(())
    }

    async fn create_dir(&self, dirname: &str, options: &WriteOptions) -> Result<Metadata> {
        let key = self.dir_key(dirname);
        debug!("create_dir: path={} key={}", dirname, key);

        // Zero-byte object with trailing slash represents the directory
        self.put(&key, Vec::new(), None, options).await?;

        Ok(Metadata::dir(dirname).with_visibility(options.visibility))
    }

    async fn delete_dir(&self, dirname: &str) -> Result<()> {
        let key = self.dir_key(dirname);
        debug!("delete_dir: path={} key={}", dirname, key);

        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&key);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let list_result = request.send().await.map_err(|e| {
                VfsError::Backend(format!(
                    "ListObjectsV2 delete_dir error: {}",
                    e.into_service_error()
                ))
            })?;

            let objects = list_result
                .contents()
                .iter()
                .filter_map(|obj| obj.key())
                .map(|k| {
                    ObjectIdentifier::builder()
                        .key(k)
                        .build()
                        .map_err(|e| VfsError::Backend(format!("invalid object id: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;

            if !objects.is_empty() {
                let delete = Delete::builder()
                    .set_objects(Some(objects))
                    .build()
                    .map_err(|e| VfsError::Backend(format!("Failed to build delete: {}", e)))?;

                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|e| {
                        VfsError::Backend(format!("DeleteObjects error: {}", e.into_service_error()))
                    })?;
            }

            if list_result.is_truncated().unwrap_or(false) {
                continuation_token = list_result.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(())
    }

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        let prefix = self.dir_key(directory);
        trace!("list_contents: dir={} prefix={} recursive={}", directory, prefix, recursive);

        let mut entries: BTreeMap<String, Metadata> = BTreeMap::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix);

            if !recursive {
                request = request.delimiter("/");
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let result = request.send().await.map_err(|e| {
                VfsError::Backend(format!(
                    "ListObjectsV2 list_contents error: {}",
                    e.into_service_error()
                ))
            })?;

            for obj in result.contents() {
                let Some(key) = obj.key() else { continue };
                let entry_path = self.key_to_path(key);
                if entry_path.is_empty() || entry_path == directory {
                    continue;
                }

                if key.ends_with('/') {
                    entries
                        .entry(entry_path.clone())
                        .or_insert_with(|| Metadata::dir(entry_path));
                } else {
                    let size = obj.size().unwrap_or(0).max(0) as u64;
                    let timestamp = obj.last_modified().and_then(Self::convert_time);
                    entries.insert(
                        entry_path.clone(),
                        Metadata::file(entry_path, size).with_timestamp(timestamp),
                    );
                }
            }

            for common_prefix in result.common_prefixes() {
                if let Some(p) = common_prefix.prefix() {
                    let dir_path = self.key_to_path(p);
                    if !dir_path.is_empty() {
                        entries
                            .entry(dir_path.clone())
                            .or_insert_with(|| Metadata::dir(dir_path));
                    }
                }
            }

            if result.is_truncated().unwrap_or(false) {
                continuation_token = result.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        if recursive {
            // Directories that only exist as key prefixes
            let implied: Vec<String> = entries
                .keys()
                .flat_map(|p| path::ancestors(p).into_iter())
                .filter(|a| path::is_descendant(a, directory))
                .map(str::to_string)
                .collect();
            for dir in implied {
                entries
                    .entry(dir.clone())
                    .or_insert_with(|| Metadata::dir(dir));
            }
        }

        Ok(entries.into_values().collect())
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        let key = self.path_to_key(path);
        trace!("metadata: path={} key={}", path, key);

        // Root directory always exists
        if path.is_empty() {
            return Ok(Metadata::dir(""));
        }

        let head_result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match head_result {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let timestamp = output.last_modified().and_then(Self::convert_time);
                return Ok(Metadata::file(path, size)
                    .with_timestamp(timestamp)
                    .with_mimetype(output.content_type().map(str::to_string)));
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    return Err(VfsError::Backend(format!(
                        "HeadObject error: {}",
                        service_error
                    )));
                }
            }
        }

        // Try as a directory (any object under the prefix)
        let dir_key = self.dir_key(path);
        let list_result = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&dir_key)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                VfsError::Backend(format!(
                    "ListObjectsV2 error for prefix '{}': {}",
                    dir_key,
                    e.into_service_error()
                ))
            })?;

        if list_result.key_count().unwrap_or(0) > 0 || !list_result.common_prefixes().is_empty() {
            return Ok(Metadata::dir(path));
        }

        Err(VfsError::NotFound(path.to_string()))
    }

    async fn visibility(&self, path: &str) -> Result<Visibility> {
        let key = self.path_to_key(path);
        trace!("visibility: path={} key={}", path, key);

        let output = self
            .client
            .get_object_acl()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| VfsError::Backend(format!("GetObjectAcl error: {}", e.into_service_error())))?;

        let public = output.grants().iter().any(|grant| {
            grant.grantee().and_then(|g| g.uri()) == Some(ALL_USERS_URI)
                && grant.permission() == Some(&Permission::Read)
        });

        Ok(if public {
            Visibility::Public
        } else {
            Visibility::Private
        })
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let key = self.path_to_key(path);
        debug!("set_visibility: path={} key={} visibility={}", path, key, visibility);

        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(&key)
            .acl(Self::canned_acl(visibility))
            .send()
            .await
            .map_err(|e| VfsError::Backend(format!("PutObjectAcl error: {}", e.into_service_error())))?;

        Ok(())
    }
}
