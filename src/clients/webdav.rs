use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt, stream};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, RANGE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, warn};
use url::Url;

use super::storage::{
    DeleteOutcome, RangedBody, RemoteStore, StorageError, UpstreamHeaders, bounded_chunks,
};
use crate::config::WebDavConfig;
use crate::constants::CHUNK_SIZE;
use crate::models::MediaEntry;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>
"#;

#[derive(Clone)]
pub struct WebDavClient {
    client: Client,
    base: Url,
    login: String,
    password: String,
    request_timeout: Duration,
}

impl std::fmt::Debug for WebDavClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavClient")
            .field("base", &self.base.as_str())
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl WebDavClient {
    pub fn new(config: &WebDavConfig) -> Result<Self, StorageError> {
        let mut base = Url::parse(&config.hostname)
            .map_err(|e| StorageError::InvalidPath(format!("{}: {e}", config.hostname)))?;

        {
            let mut segments = base
                .path_segments_mut()
                .map_err(|()| StorageError::InvalidPath(config.hostname.clone()))?;
            segments.pop_if_empty();
            for part in config.root.split('/').filter(|s| !s.is_empty()) {
                segments.push(part);
            }
        }

        // No total timeout on the client: streamed uploads and downloads can
        // legitimately take longer than any single request budget.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.request_timeout())
            .user_agent(concat!("dvrvault/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            base,
            login: config.login.clone(),
            password: config.password.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    fn url(&self, relative: &str, collection: bool) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StorageError::InvalidPath(relative.to_string()))?;
            segments.pop_if_empty();
            for part in relative.split('/').filter(|s| !s.is_empty()) {
                if part == "." || part == ".." {
                    return Err(StorageError::InvalidPath(relative.to_string()));
                }
                segments.push(part);
            }
            if collection {
                segments.push("");
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        if self.login.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.login, Some(&self.password))
        }
    }

    /// MKCOL each level of `remote_dir`. Failures are logged, not returned:
    /// the PUT that follows reports the real problem if the parent is missing.
    async fn ensure_dir(&self, remote_dir: &str) {
        let mut current = String::new();
        for part in remote_dir.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);

            let url = match self.url(&current, true) {
                Ok(url) => url,
                Err(e) => {
                    warn!(dir = %current, error = %e, "Skipping remote directory creation");
                    return;
                }
            };

            let result = self
                .request(dav_method("MKCOL"), url.clone())
                .timeout(self.request_timeout)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    // 405: the collection already exists
                    if status != StatusCode::CREATED && status != StatusCode::METHOD_NOT_ALLOWED {
                        warn!(url = %url, status = status.as_u16(), "MKCOL failed");
                    }
                }
                Err(e) => warn!(url = %url, error = %e, "MKCOL request failed"),
            }
        }
    }

    async fn propfind(&self, url: Url, depth: &str) -> Result<Vec<DavResource>, StorageError> {
        let resp = self
            .request(dav_method("PROPFIND"), url.clone())
            .header("Depth", depth)
            .header(CONTENT_TYPE, "application/xml")
            .body(PROPFIND_BODY)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if status != StatusCode::MULTI_STATUS && status != StatusCode::OK {
            error!(url = %url, status = status.as_u16(), body = %text, "PROPFIND failed");
            return Err(StorageError::status(status.as_u16(), text));
        }

        parse_multistatus(&text).inspect_err(|e| {
            error!(url = %url, error = %e, "Failed to parse PROPFIND response");
        })
    }
}

fn dav_method(name: &'static str) -> Method {
    Method::from_bytes(name.as_bytes()).expect("WebDAV method names are valid tokens")
}

#[async_trait::async_trait]
impl RemoteStore for WebDavClient {
    async fn list_directory(&self, path: &str) -> Result<Vec<MediaEntry>, StorageError> {
        let url = self.url(path, true)?;
        let own_path = normalize_path(url.path());
        let resources = self.propfind(url, "1").await?;

        Ok(resources
            .into_iter()
            .filter(|r| !r.entry.name.is_empty() && r.path != own_path)
            .map(|r| r.entry)
            .collect())
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<(), StorageError> {
        if let Some((dir, _)) = remote_path.trim_start_matches('/').rsplit_once('/') {
            self.ensure_dir(dir).await;
        }

        let url = self.url(remote_path, false)?;
        let file = tokio::fs::File::open(local_path).await?;
        let len = file.metadata().await?.len();

        debug!(local = %local_path.display(), url = %url, bytes = len, "Uploading file");

        let resp = self
            .request(Method::PUT, url.clone())
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(file_chunks(file)))
            .send()
            .await?;

        let status = resp.status();
        if matches!(status.as_u16(), 200 | 201 | 204) {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        error!(url = %url, status = status.as_u16(), "Upload failed");
        Err(StorageError::status(status.as_u16(), body))
    }

    async fn fetch_bytes(&self, remote_path: &str) -> Result<Option<Bytes>, StorageError> {
        let url = self.url(remote_path, false)?;
        let resp = self
            .request(Method::GET, url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::OK {
            return Ok(Some(resp.bytes().await?));
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(None);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(StorageError::status(status.as_u16(), body))
    }

    async fn fetch_range(
        &self,
        remote_path: &str,
        range: Option<&str>,
    ) -> Result<RangedBody, StorageError> {
        let url = self.url(remote_path, false)?;
        let mut request = self.request(Method::GET, url);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let headers = upstream_headers(resp.headers());

        let body = resp
            .bytes_stream()
            .map_err(StorageError::from)
            .map_ok(|chunk| stream::iter(bounded_chunks(chunk, CHUNK_SIZE).into_iter().map(Ok)))
            .try_flatten()
            .boxed();

        Ok(RangedBody {
            status,
            headers,
            body,
        })
    }

    async fn object_size(&self, remote_path: &str) -> Result<Option<u64>, StorageError> {
        let url = self.url(remote_path, false)?;
        let resp = self
            .request(Method::HEAD, url.clone())
            .timeout(self.request_timeout)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                // Response::content_length() reports the (empty) HEAD body.
                if let Some(len) = header_u64(resp.headers(), CONTENT_LENGTH.as_str()) {
                    return Ok(Some(len));
                }
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => return Ok(None),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {}
            other => return Err(StorageError::status(other.as_u16(), "HEAD failed")),
        }

        debug!(url = %url, "HEAD gave no size, falling back to PROPFIND");
        match self.propfind(url, "0").await {
            Ok(resources) => Ok(resources
                .into_iter()
                .find(|r| !r.entry.is_dir)
                .map(|r| r.entry.size)),
            Err(StorageError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_file(&self, remote_path: &str) -> Result<DeleteOutcome, StorageError> {
        let url = self.url(remote_path, false)?;
        let resp = self
            .request(Method::DELETE, url.clone())
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = resp.status();
        match status.as_u16() {
            200 | 202 | 204 => Ok(DeleteOutcome::Deleted),
            404 => Ok(DeleteOutcome::NotFound),
            code => {
                let body = resp.text().await.unwrap_or_default();
                error!(url = %url, status = code, "DELETE failed");
                Err(StorageError::status(code, body))
            }
        }
    }
}

fn file_chunks(file: tokio::fs::File) -> impl Stream<Item = std::io::Result<Bytes>> {
    stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        while buf.len() < CHUNK_SIZE {
            if file.read_buf(&mut buf).await? == 0 {
                break;
            }
        }
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some((buf.freeze(), file)))
        }
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn upstream_headers(headers: &HeaderMap) -> UpstreamHeaders {
    UpstreamHeaders {
        content_type: header_str(headers, CONTENT_TYPE.as_str()),
        accept_ranges: header_str(headers, ACCEPT_RANGES.as_str()),
        content_length: header_u64(headers, CONTENT_LENGTH.as_str()),
        content_range: header_str(headers, CONTENT_RANGE.as_str()),
    }
}

/// One `<response>` of a multistatus body.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DavResource {
    /// Decoded href path without surrounding slashes.
    path: String,
    entry: MediaEntry,
}

#[derive(Default)]
struct PartialResource {
    href: String,
    is_dir: bool,
    length: String,
    modified: String,
}

#[derive(Clone, Copy)]
enum Field {
    Href,
    Length,
    Modified,
}

impl PartialResource {
    fn push(&mut self, field: Field, text: &str) {
        match field {
            Field::Href => self.href.push_str(text),
            Field::Length => self.length.push_str(text),
            Field::Modified => self.modified.push_str(text),
        }
    }

    fn finish(self) -> DavResource {
        let raw_path = if self.href.starts_with("http://") || self.href.starts_with("https://") {
            Url::parse(&self.href)
                .map(|u| u.path().to_string())
                .unwrap_or(self.href)
        } else {
            self.href
        };
        let path = normalize_path(&raw_path);
        let name = path.rsplit('/').next().unwrap_or_default().to_string();

        DavResource {
            path,
            entry: MediaEntry {
                name,
                is_dir: self.is_dir,
                size: self.length.trim().parse().unwrap_or(0),
                last_modified: self.modified.trim().to_string(),
            },
        }
    }
}

fn normalize_path(raw: &str) -> String {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    decoded.trim_matches('/').to_string()
}

fn parse_multistatus(xml: &str) -> Result<Vec<DavResource>, StorageError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut resources = Vec::new();
    let mut current: Option<PartialResource> = None;
    let mut field: Option<Field> = None;
    let mut in_resourcetype = false;
    let mut saw_multistatus = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"multistatus" => saw_multistatus = true,
                b"response" => current = Some(PartialResource::default()),
                b"href" => field = Some(Field::Href),
                b"getcontentlength" => field = Some(Field::Length),
                b"getlastmodified" => field = Some(Field::Modified),
                b"resourcetype" => in_resourcetype = true,
                b"collection" if in_resourcetype => {
                    if let Some(cur) = current.as_mut() {
                        cur.is_dir = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_resourcetype
                    && e.local_name().as_ref() == b"collection"
                    && let Some(cur) = current.as_mut()
                {
                    cur.is_dir = true;
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(f), Some(cur)) = (field, current.as_mut()) {
                    cur.push(f, &String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::GeneralRef(r)) => {
                if let (Some(f), Some(cur)) = (field, current.as_mut()) {
                    let name = String::from_utf8_lossy(&r);
                    if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name) {
                        cur.push(f, resolved);
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(cur) = current.take() {
                        resources.push(cur.finish());
                    }
                }
                b"href" | b"getcontentlength" | b"getlastmodified" => field = None,
                b"resourcetype" => in_resourcetype = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(StorageError::Malformed(format!(
                    "at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    if !saw_multistatus {
        return Err(StorageError::Malformed("missing multistatus element".into()));
    }

    Ok(resources)
}
