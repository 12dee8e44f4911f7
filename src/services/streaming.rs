use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::clients::storage::{ByteStream, UpstreamHeaders};
use crate::clients::{RemoteStore, StorageError};
use crate::constants::http::{DEFAULT_ACCEPT_RANGES, DEFAULT_CONTENT_TYPE};
use crate::parser::range::parse_range_header;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("requested range not satisfiable for {size} bytes")]
    InvalidRange { size: u64 },

    #[error("recording not found")]
    NotFound,

    #[error("upstream storage error: {0}")]
    Upstream(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeaders {
    pub content_type: String,
    pub accept_ranges: String,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
}

impl ResponseHeaders {
    fn from_upstream(upstream: UpstreamHeaders) -> Self {
        Self {
            content_type: upstream
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            accept_ranges: upstream
                .accept_ranges
                .unwrap_or_else(|| DEFAULT_ACCEPT_RANGES.to_string()),
            content_length: upstream.content_length,
            content_range: upstream.content_range,
        }
    }
}

pub struct StreamResponse {
    /// 200 or 206.
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Serves recordings from the remote store, honouring single byte ranges.
pub struct RangeStreamingService {
    store: Arc<dyn RemoteStore>,
}

impl RangeStreamingService {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub async fn stream(
        &self,
        file_name: &str,
        range: Option<&str>,
    ) -> Result<StreamResponse, StreamError> {
        let Some(range) = range else {
            return self.stream_whole(file_name).await;
        };

        let size = self
            .store
            .object_size(file_name)
            .await?
            .ok_or(StreamError::NotFound)?;

        let resolved = parse_range_header(range)
            .and_then(|spec| spec.resolve(size))
            .map_err(|e| {
                debug!(file = %file_name, range = %range, error = %e, "Rejected range");
                StreamError::InvalidRange { size }
            })?;

        let upstream = self
            .store
            .fetch_range(file_name, Some(&resolved.header_value()))
            .await?;

        match upstream.status {
            206 => {
                let mut headers = ResponseHeaders::from_upstream(upstream.headers);
                headers.content_range = Some(resolved.content_range(size));
                headers.content_length = Some(resolved.len());
                Ok(StreamResponse {
                    status: 206,
                    headers,
                    body: upstream.body,
                })
            }
            // upstream ignored the range and sent everything
            200 => {
                let mut headers = ResponseHeaders::from_upstream(upstream.headers);
                headers.content_range = None;
                headers.content_length.get_or_insert(size);
                Ok(StreamResponse {
                    status: 200,
                    headers,
                    body: upstream.body,
                })
            }
            404 | 410 => Err(StreamError::NotFound),
            416 => Err(StreamError::InvalidRange { size }),
            status => Err(StorageError::status(status, "unexpected answer to ranged read").into()),
        }
    }

    async fn stream_whole(&self, file_name: &str) -> Result<StreamResponse, StreamError> {
        let upstream = self.store.fetch_range(file_name, None).await?;

        match upstream.status {
            200 => {
                let mut headers = ResponseHeaders::from_upstream(upstream.headers);
                headers.content_range = None;
                // chunked upstream: a 200 still announces the full size
                if headers.content_length.is_none() {
                    let size = self
                        .store
                        .object_size(file_name)
                        .await?
                        .ok_or(StreamError::NotFound)?;
                    headers.content_length = Some(size);
                }
                Ok(StreamResponse {
                    status: 200,
                    headers,
                    body: upstream.body,
                })
            }
            404 | 410 => Err(StreamError::NotFound),
            status => Err(StorageError::status(status, "unexpected answer to read").into()),
        }
    }
}
