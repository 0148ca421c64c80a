//! WebDAV adapter
//!
//! Plain HTTP through `reqwest`. Metadata and listings come from PROPFIND
//! multistatus bodies; mutations map onto PUT, DELETE, MKCOL, MOVE and COPY.
//! WebDAV has no notion of visibility, so the trait defaults apply.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_yaml::Value;
use tracing::{debug, trace};
use url::Url;

use crate::adapter::{guess_mimetype, Adapter, Metadata, WriteOptions};
use crate::error::{Result, VfsError};
use crate::path;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getcontenttype/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// Client settings, read from the raw connection settings map
#[derive(Debug, Clone, PartialEq)]
pub struct WebDavClientSettings {
    pub base_uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<Duration>,
}

impl WebDavClientSettings {
    pub fn from_settings(settings: &BTreeMap<String, Value>) -> Result<Self> {
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| settings.get(*k))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        };

        let base_uri = get(&["base_uri", "baseUri"])
            .ok_or_else(|| VfsError::missing_setting("webdav", "base_uri"))?;

        let timeout = get(&["timeout"])
            .map(|t| {
                t.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| VfsError::Config(format!("invalid webdav timeout `{}`", t)))
            })
            .transpose()?;

        Ok(Self {
            base_uri,
            username: get(&["username", "userName"]),
            password: get(&["password"]),
            timeout,
        })
    }
}

/// One `<d:response>` element of a multistatus body
#[derive(Debug, Default, Clone, PartialEq)]
struct PropEntry {
    href: String,
    size: Option<u64>,
    content_type: Option<String>,
    last_modified: Option<DateTime<Utc>>,
    is_collection: bool,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Href,
    ContentLength,
    ContentType,
    LastModified,
}

fn parse_multistatus(body: &str) -> Result<Vec<PropEntry>> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PropEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(PropEntry::default()),
                b"href" => field = Some(Field::Href),
                b"getcontentlength" => field = Some(Field::ContentLength),
                b"getcontenttype" => field = Some(Field::ContentType),
                b"getlastmodified" => field = Some(Field::LastModified),
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_err(|e| VfsError::Backend(format!("PROPFIND body: {}", e)))?
                        .into_owned();
                    match f {
                        Field::Href => entry.href = text,
                        Field::ContentLength => entry.size = text.trim().parse().ok(),
                        Field::ContentType => entry.content_type = Some(text),
                        Field::LastModified => {
                            entry.last_modified = DateTime::parse_from_rfc2822(text.trim())
                                .ok()
                                .map(|d| d.with_timezone(&Utc))
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(VfsError::Backend(format!(
                    "malformed PROPFIND body at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(entries)
}

pub struct WebDavAdapter {
    client: Client,
    base: Url,
    prefix: String,
    username: Option<String>,
    password: Option<String>,
}

impl WebDavAdapter {
    /// Build the HTTP client. Nothing is sent until the first operation.
    pub fn new(settings: WebDavClientSettings, prefix: Option<String>) -> Result<Self> {
        let base = Url::parse(&settings.base_uri)
            .map_err(|e| VfsError::Config(format!("invalid webdav base_uri: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(VfsError::Config(format!(
                "webdav base_uri cannot hold paths: {}",
                settings.base_uri
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| VfsError::Backend(format!("webdav client: {}", e)))?;

        Ok(Self {
            client,
            base,
            prefix: prefix
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or_default(),
            username: settings.username,
            password: settings.password,
        })
    }

    pub fn base_uri(&self) -> &Url {
        &self.base
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn url_for(&self, path: &str, collection: bool) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| VfsError::Config(format!("webdav base_uri cannot hold paths: {}", self.base)))?;
            segments.pop_if_empty();
            for segment in self
                .prefix
                .split('/')
                .chain(path.split('/'))
                .filter(|s| !s.is_empty())
            {
                segments.push(segment);
            }
            if collection {
                segments.push("");
            }
        }
        Ok(url)
    }

    /// Map an href from a multistatus body back to a normalized path
    fn href_to_path(&self, href: &str) -> Result<String> {
        let raw_path = if href.starts_with("http://") || href.starts_with("https://") {
            Url::parse(href)
                .map(|u| u.path().to_string())
                .map_err(|e| VfsError::Backend(format!("bad href {}: {}", href, e)))?
        } else {
            href.to_string()
        };

        let decoded = percent_decode_str(&raw_path).decode_utf8_lossy().into_owned();
        let root_url = self.url_for("", true)?;
        let root = percent_decode_str(root_url.path()).decode_utf8_lossy().into_owned();
        let root = root.trim_end_matches('/');

        let rel = decoded.strip_prefix(root).unwrap_or(&decoded);
        path::normalize(rel)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, op: &str, path: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| VfsError::Backend(format!("{} {}: {}", op, path, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(VfsError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(VfsError::Backend(format!("{} {}: HTTP {}", op, path, status)));
        }
        Ok(response)
    }

    async fn propfind(&self, path: &str, depth: &str) -> Result<Vec<PropEntry>> {
        let url = self.url_for(path, false)?;
        let request = self
            .request(dav_method("PROPFIND")?, url)
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY);
        let response = self.send(request, "PROPFIND", path).await?;
        let body = response
            .text()
            .await
            .map_err(|e| VfsError::Backend(format!("PROPFIND {}: {}", path, e)))?;
        parse_multistatus(&body)
    }

    fn to_metadata(&self, entry: &PropEntry) -> Result<Metadata> {
        let entry_path = self.href_to_path(&entry.href)?;
        Ok(if entry.is_collection {
            Metadata::dir(entry_path).with_timestamp(entry.last_modified)
        } else {
            Metadata::file(entry_path, entry.size.unwrap_or(0))
                .with_timestamp(entry.last_modified)
                .with_mimetype(entry.content_type.clone())
        })
    }

    /// MKCOL a single collection; 405 means it already exists
    async fn mkcol(&self, dirname: &str) -> Result<()> {
        let url = self.url_for(dirname, true)?;
        let response = self
            .request(dav_method("MKCOL")?, url)
            .send()
            .await
            .map_err(|e| VfsError::Backend(format!("MKCOL {}: {}", dirname, e)))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(VfsError::Backend(format!("MKCOL {}: HTTP {}", dirname, status)))
        }
    }

    async fn ensure_parents(&self, path: &str) -> Result<()> {
        let mut parents: Vec<&str> = path::ancestors(path)
            .into_iter()
            .filter(|a| !a.is_empty())
            .collect();
        parents.reverse();
        for parent in parents {
            self.mkcol(parent).await?;
        }
        Ok(())
    }

    async fn transfer(&self, method: &str, from: &str, to: &str) -> Result<()> {
        self.ensure_parents(to).await?;
        let destination = self.url_for(to, false)?;
        let request = self
            .request(dav_method(method)?, self.url_for(from, false)?)
            .header("Destination", destination.as_str())
            .header("Overwrite", "T");
        self.send(request, method, from).await?;
        Ok(())
    }
}

fn dav_method(name: &str) -> Result<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| VfsError::Backend(format!("invalid method {}: {}", name, e)))
}

#[async_trait]
impl Adapter for WebDavAdapter {
    fn name(&self) -> &str {
        "webdav"
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        trace!("read: path={}", path);
        let response = self
            .send(self.request(Method::GET, self.url_for(path, false)?), "GET", path)
            .await?;
        response
            .bytes()
            .await
            .map_err(|e| VfsError::Backend(format!("GET {}: {}", path, e)))
    }

    async fn write(&self, path: &str, contents: &[u8], _options: &WriteOptions) -> Result<Metadata> {
        debug!("write: path={} size={}", path, contents.len());
        self.ensure_parents(path).await?;

        let mimetype = guess_mimetype(path);
        let request = self
            .request(Method::PUT, self.url_for(path, false)?)
            .header("Content-Type", mimetype.as_str())
            .body(contents.to_vec());
        self.send(request, "PUT", path).await?;

        Ok(Metadata::file(path, contents.len() as u64).with_mimetype(Some(mimetype)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!("delete: path={}", path);
        self.send(
            self.request(Method::DELETE, self.url_for(path, false)?),
            "DELETE",
            path,
        )
        .await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        debug!("rename: from={} to={}", from, to);
        self.transfer("MOVE", from, to).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        debug!("copy: from={} to={}", from, to);
        self.transfer("COPY", from, to).await
    }

    async fn create_dir(&self, dirname: &str, _options: &WriteOptions) -> Result<Metadata> {
        debug!("create_dir: path={}", dirname);
        self.ensure_parents(dirname).await?;
        self.mkcol(dirname).await?;
        Ok(Metadata::dir(dirname))
    }

    async fn delete_dir(&self, dirname: &str) -> Result<()> {
        debug!("delete_dir: path={}", dirname);
        self.send(
            self.request(Method::DELETE, self.url_for(dirname, true)?),
            "DELETE",
            dirname,
        )
        .await?;
        Ok(())
    }

    async fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<Metadata>> {
        trace!("list_contents: dir={} recursive={}", directory, recursive);
        let mut out = Vec::new();
        let mut pending = vec![directory.to_string()];

        while let Some(dir) = pending.pop() {
            let entries = match self.propfind(&dir, "1").await {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for entry in &entries {
                let metadata = self.to_metadata(entry)?;
                if !path::is_child(&metadata.path, &dir) {
                    continue;
                }
                if recursive && metadata.is_dir() {
                    pending.push(metadata.path.clone());
                }
                out.push(metadata);
            }
        }

        Ok(out)
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        trace!("metadata: path={}", path);
        let entries = self.propfind(path, "0").await?;
        let entry = entries
            .first()
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;

        // Report the requested path; servers may answer with a canonical href
        let mut metadata = self.to_metadata(entry)?;
        metadata.path = path.to_string();
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base: &str) -> WebDavClientSettings {
        WebDavClientSettings {
            base_uri: base.to_string(),
            username: None,
            password: None,
            timeout: None,
        }
    }

    #[test]
    fn test_settings_from_map() {
        let mut map = BTreeMap::new();
        map.insert("baseUri".to_string(), Value::from("https://dav.example.com/remote.php"));
        map.insert("userName".to_string(), Value::from("alice"));
        map.insert("timeout".to_string(), Value::from(15));

        let parsed = WebDavClientSettings::from_settings(&map).unwrap();
        assert_eq!(parsed.base_uri, "https://dav.example.com/remote.php");
        assert_eq!(parsed.username.as_deref(), Some("alice"));
        assert_eq!(parsed.timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_settings_require_base_uri() {
        let err = WebDavClientSettings::from_settings(&BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            VfsError::MissingRequiredSetting { ref setting, .. } if setting == "base_uri"
        ));
    }

    #[test]
    fn test_url_for_encodes_segments() {
        let adapter = WebDavAdapter::new(
            settings("https://dav.example.com/files/"),
            Some("/team/".to_string()),
        )
        .unwrap();

        assert_eq!(
            adapter.url_for("a b/c.txt", false).unwrap().as_str(),
            "https://dav.example.com/files/team/a%20b/c.txt"
        );
        assert_eq!(
            adapter.url_for("docs", true).unwrap().as_str(),
            "https://dav.example.com/files/team/docs/"
        );
    }

    #[test]
    fn test_href_to_path() {
        let adapter = WebDavAdapter::new(settings("https://dav.example.com/files"), None).unwrap();
        assert_eq!(adapter.href_to_path("/files/a%20b/c.txt").unwrap(), "a b/c.txt");
        assert_eq!(
            adapter
                .href_to_path("https://dav.example.com/files/docs/")
                .unwrap(),
            "docs"
        );
        assert_eq!(adapter.href_to_path("/files/").unwrap(), "");
    }

    #[test]
    fn test_parse_multistatus() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/files/docs/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/></d:resourcetype>
        <d:getlastmodified>Tue, 01 Oct 2024 10:00:00 GMT</d:getlastmodified>
      </d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/files/docs/report.pdf</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
        <d:getcontentlength>2048</d:getcontentlength>
        <d:getcontenttype>application/pdf</d:getcontenttype>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

        let entries = parse_multistatus(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_collection);
        assert!(entries[0].last_modified.is_some());
        assert_eq!(entries[1].href, "/files/docs/report.pdf");
        assert_eq!(entries[1].size, Some(2048));
        assert_eq!(entries[1].content_type.as_deref(), Some("application/pdf"));
        assert!(!entries[1].is_collection);
    }
}
