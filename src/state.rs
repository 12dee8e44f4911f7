use std::sync::Arc;

use crate::clients::{RemoteStore, WebDavClient};
use crate::config::Config;
use crate::services::{
    CoverCache, FfmpegGrabber, FrameGrabber, RangeStreamingService, RecordIngestPipeline,
    RecordService, RetentionService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Arc<dyn RemoteStore>,

    pub cover_cache: Arc<CoverCache>,

    pub retention: Arc<RetentionService>,

    pub ingest: Arc<RecordIngestPipeline>,

    pub records: Arc<RecordService>,

    pub streaming: Arc<RangeStreamingService>,
}

impl SharedState {
    /// Production wiring: WebDAV storage and the ffmpeg binary from config.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = WebDavClient::new(&config.webdav)
            .map_err(|e| anyhow::anyhow!("Failed to build WebDAV client: {e}"))?;
        let grabber = FfmpegGrabber::new(config.cover.ffmpeg_path.clone());

        Ok(Self::with_components(
            config,
            Arc::new(store),
            Arc::new(grabber),
        ))
    }

    #[must_use]
    pub fn with_components(
        config: Config,
        store: Arc<dyn RemoteStore>,
        grabber: Arc<dyn FrameGrabber>,
    ) -> Self {
        let cover_cache = Arc::new(CoverCache::new(
            config.cover.cache_ttl(),
            config.cover.wait_timeout(),
        ));

        let retention = Arc::new(RetentionService::new(
            store.clone(),
            config.retention.clone(),
            config.record.cover_remote_dir.clone(),
        ));

        let ingest = Arc::new(RecordIngestPipeline::new(
            store.clone(),
            grabber.clone(),
            retention.clone(),
            config.record.clone(),
        ));

        let records = Arc::new(RecordService::new(
            store.clone(),
            grabber,
            cover_cache.clone(),
            config.record.clone(),
            config.cover.clone(),
        ));

        let streaming = Arc::new(RangeStreamingService::new(store.clone()));

        Self {
            config: Arc::new(config),
            store,
            cover_cache,
            retention,
            ingest,
            records,
            streaming,
        }
    }
}
