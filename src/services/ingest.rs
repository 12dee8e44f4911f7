use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::clients::storage::join_remote;
use crate::clients::{RemoteStore, StorageError};
use crate::config::RecordConfig;
use crate::constants::cover::RECORD_SEEK;
use crate::parser::filename::cover_name;
use crate::services::retention::RetentionService;
use crate::services::thumbnail::FrameGrabber;

/// A finished DVR segment as reported by the streaming server.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub stream_name: String,

    pub file_name: String,

    /// Path as reported by the streaming server, if any.
    pub local_path: Option<PathBuf>,

    pub record_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub file_name: String,
    pub bytes: u64,
    pub cover_uploaded: bool,
    pub evicted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Recording was disabled for the stream; the local file was removed.
    Discarded,
    LocalFileMissing,
    Ingested(IngestReport),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to upload recording: {0}")]
    Upload(#[source] StorageError),

    #[error("invalid recording name: {0}")]
    InvalidFileName(String),
}

pub struct RecordIngestPipeline {
    store: Arc<dyn RemoteStore>,
    grabber: Arc<dyn FrameGrabber>,
    retention: Arc<RetentionService>,
    config: RecordConfig,
}

impl RecordIngestPipeline {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        grabber: Arc<dyn FrameGrabber>,
        retention: Arc<RetentionService>,
        config: RecordConfig,
    ) -> Self {
        Self {
            store,
            grabber,
            retention,
            config,
        }
    }

    /// Uploads a finished recording and its cover, cleans up the local
    /// copies and runs a retention pass.
    ///
    /// Only a failed upload of the recording itself is an error. Cover,
    /// cleanup and retention failures are logged.
    pub async fn handle(&self, event: RecordEvent) -> Result<IngestOutcome, IngestError> {
        if event.file_name.is_empty()
            || event.file_name.contains(['/', '\\'])
            || event.file_name.contains("..")
        {
            return Err(IngestError::InvalidFileName(event.file_name));
        }

        let local = self.resolve_local(&event).await;

        if !event.record_enabled {
            if let Some(path) = &local {
                remove_quietly(path).await;
            }
            info!(stream = %event.stream_name, file = %event.file_name, "Recording disabled, discarded");
            metrics::counter!("dvr_ingest_total", "outcome" => "discarded").increment(1);
            return Ok(IngestOutcome::Discarded);
        }

        let Some(local) = local else {
            warn!(stream = %event.stream_name, file = %event.file_name, "Recording not found on disk");
            metrics::counter!("dvr_ingest_total", "outcome" => "missing").increment(1);
            return Ok(IngestOutcome::LocalFileMissing);
        };

        let bytes = fs::metadata(&local).await.map(|m| m.len()).unwrap_or(0);

        info!(stream = %event.stream_name, file = %event.file_name, bytes, "Uploading recording");
        if let Err(e) = self.store.upload_file(&local, &event.file_name).await {
            error!(file = %event.file_name, error = %e, "Recording upload failed");
            if self.config.keep_local_on_upload_failure {
                warn!(path = %local.display(), "Keeping local recording after failed upload");
            } else {
                remove_quietly(&local).await;
            }
            metrics::counter!("dvr_ingest_total", "outcome" => "failed").increment(1);
            return Err(IngestError::Upload(e));
        }
        metrics::counter!("dvr_uploaded_bytes_total").increment(bytes);

        let cover_uploaded = self.upload_cover(&local, &event.file_name).await;

        remove_quietly(&local).await;

        let evicted = match self.retention.enforce().await {
            Ok(report) => report.evicted,
            Err(e) => {
                warn!(error = %e, "Retention pass after ingest failed");
                Vec::new()
            }
        };

        metrics::counter!("dvr_ingest_total", "outcome" => "ingested").increment(1);
        info!(
            file = %event.file_name,
            cover_uploaded,
            evicted = evicted.len(),
            "Recording ingested"
        );

        Ok(IngestOutcome::Ingested(IngestReport {
            file_name: event.file_name,
            bytes,
            cover_uploaded,
            evicted,
        }))
    }

    /// The reported path when it is a regular file, else the configured
    /// recording directory.
    async fn resolve_local(&self, event: &RecordEvent) -> Option<PathBuf> {
        if let Some(path) = &event.local_path
            && is_regular_file(path).await
        {
            return Some(path.clone());
        }

        let fallback = Path::new(&self.config.local_dir).join(&event.file_name);
        is_regular_file(&fallback).await.then_some(fallback)
    }

    async fn upload_cover(&self, local: &Path, file_name: &str) -> bool {
        let name = cover_name(file_name);
        let cover_path = Path::new(&self.config.cover_dir).join(&name);

        let captured = self
            .grabber
            .capture(
                &local.to_string_lossy(),
                &cover_path,
                RECORD_SEEK,
                self.config.thumbnail_timeout(),
            )
            .await;

        let uploaded = match captured {
            Ok(()) => {
                let remote = join_remote(&self.config.cover_remote_dir, &name);
                match self.store.upload_file(&cover_path, &remote).await {
                    Ok(()) => {
                        debug!(cover = %remote, "Cover uploaded");
                        true
                    }
                    Err(e) => {
                        warn!(cover = %remote, error = %e, "Cover upload failed");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "Cover generation failed");
                false
            }
        };

        if fs::try_exists(&cover_path).await.unwrap_or(false) {
            remove_quietly(&cover_path).await;
        }
        uploaded
    }
}

async fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove local file");
    }
}
