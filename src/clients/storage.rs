//! Remote storage abstraction.
//!
//! Everything above this layer talks to [`RemoteStore`]; the WebDAV client is
//! the production implementation. Not-found is a value (`Option::None`,
//! [`DeleteOutcome::NotFound`]), never an error.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::Path;
use thiserror::Error;

use crate::models::MediaEntry;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("remote storage answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response from remote storage: {0}")]
    Malformed(String),

    #[error("remote storage request timed out")]
    Timeout,

    #[error("remote storage request failed: {0}")]
    Transport(String),

    #[error("invalid remote path: {0}")]
    InvalidPath(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// The remote answered, but not the way the protocol expects.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Malformed(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Lazily consumed body. Dropping it before the end releases the connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// The response headers the streaming layer forwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamHeaders {
    pub content_type: Option<String>,
    pub accept_ranges: Option<String>,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
}

pub struct RangedBody {
    pub status: u16,
    pub headers: UpstreamHeaders,
    pub body: ByteStream,
}

impl std::fmt::Debug for RangedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangedBody")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Shallow listing of `path`, without the entry for `path` itself.
    async fn list_directory(&self, path: &str) -> Result<Vec<MediaEntry>, StorageError>;

    /// Creates missing parent collections, then streams the file up.
    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<(), StorageError>;

    async fn fetch_bytes(&self, remote_path: &str) -> Result<Option<Bytes>, StorageError>;

    /// Returns the upstream status verbatim, including 404 and 416.
    async fn fetch_range(
        &self,
        remote_path: &str,
        range: Option<&str>,
    ) -> Result<RangedBody, StorageError>;

    async fn object_size(&self, remote_path: &str) -> Result<Option<u64>, StorageError>;

    async fn delete_file(&self, remote_path: &str) -> Result<DeleteOutcome, StorageError>;
}

/// Splits oversized chunks so no single item exceeds `max` bytes.
pub fn bounded_chunks(chunk: Bytes, max: usize) -> Vec<Bytes> {
    if chunk.len() <= max || max == 0 {
        return vec![chunk];
    }

    let mut out = Vec::with_capacity(chunk.len().div_ceil(max));
    let mut rest = chunk;
    while rest.len() > max {
        out.push(rest.split_to(max));
    }
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Joins a remote directory and a file name with a single `/`.
#[must_use]
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.trim_start_matches('/').to_string()
    } else {
        format!("{dir}/{}", name.trim_start_matches('/'))
    }
}
