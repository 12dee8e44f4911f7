use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clients::storage::join_remote;
use crate::clients::{RemoteStore, StorageError};
use crate::config::{CoverConfig, RecordConfig};
use crate::constants::cover::LIVE_SEEK;
use crate::models::RecordDescriptor;
use crate::parser::filename::{belongs_to_stream, cover_name, is_media_file};
use crate::services::cover_cache::CoverCache;
use crate::services::thumbnail::FrameGrabber;

/// Read side of the archive: listings, stored covers and live covers.
pub struct RecordService {
    store: Arc<dyn RemoteStore>,
    grabber: Arc<dyn FrameGrabber>,
    cache: Arc<CoverCache>,
    record: RecordConfig,
    cover: CoverConfig,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        grabber: Arc<dyn FrameGrabber>,
        cache: Arc<CoverCache>,
        record: RecordConfig,
        cover: CoverConfig,
    ) -> Self {
        Self {
            store,
            grabber,
            cache,
            record,
            cover,
        }
    }

    /// Recordings of `stream`, oldest first.
    pub async fn list_records(&self, stream: &str) -> Result<Vec<RecordDescriptor>, StorageError> {
        let mut records: Vec<RecordDescriptor> = self
            .store
            .list_directory("")
            .await?
            .iter()
            .filter(|e| !e.is_dir && is_media_file(&e.name) && belongs_to_stream(&e.name, stream))
            .map(RecordDescriptor::from_entry)
            .collect();

        records.sort_by_key(|r| r.timestamp);
        debug!(stream = %stream, count = records.len(), "Listed recordings");
        Ok(records)
    }

    /// Stored cover of a recording. Accepts the media name or the cover name.
    pub async fn fetch_cover(&self, name: &str) -> Result<Option<Bytes>, StorageError> {
        let remote = join_remote(&self.record.cover_remote_dir, &cover_name(name));
        self.store.fetch_bytes(&remote).await
    }

    /// Current frame of a live stream, cached per stream.
    pub async fn live_cover(&self, stream: &str) -> Option<Bytes> {
        let grabber = Arc::clone(&self.grabber);
        let source = format!("{}/{stream}", self.cover.live_source_url.trim_end_matches('/'));
        let scratch = PathBuf::from(&self.record.cover_dir);
        let timeout = self.cover.capture_timeout();

        self.cache
            .get(stream, move || {
                let output = scratch.join(format!("live-{}.jpg", Uuid::new_v4()));
                capture_live(grabber, source, output, timeout)
            })
            .await
    }
}

async fn capture_live(
    grabber: Arc<dyn FrameGrabber>,
    source: String,
    output: PathBuf,
    timeout: Duration,
) -> Option<Bytes> {
    let captured = grabber.capture(&source, &output, LIVE_SEEK, timeout).await;

    let cover = match captured {
        Ok(()) => match fs::read(&output).await {
            Ok(data) if !data.is_empty() => Some(Bytes::from(data)),
            Ok(_) => {
                warn!(source = %source, "Live capture produced an empty frame");
                None
            }
            Err(e) => {
                warn!(source = %source, error = %e, "Failed to read live capture");
                None
            }
        },
        Err(e) => {
            warn!(source = %source, error = %e, "Live capture failed");
            None
        }
    };

    discard(&output).await;
    cover
}

async fn discard(path: &Path) {
    if fs::try_exists(path).await.unwrap_or(false)
        && let Err(e) = fs::remove_file(path).await
    {
        warn!(path = %path.display(), error = %e, "Failed to remove capture");
    }
}
