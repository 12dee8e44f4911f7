/// Extensions the DVR produces. Anything else in the store is ignored by
/// listings and by the retention passes.
pub const MEDIA_EXTENSIONS: &[&str] = &["flv", "mp4"];

pub const COVER_EXTENSION: &str = "jpg";

/// Chunk size for uploads and for the byte streams handed to HTTP clients.
pub const CHUNK_SIZE: usize = 1024 * 1024;

pub mod storage {

    pub const DEFAULT_MAX_STORAGE_BYTES: u64 = 50 * 1024 * 1024 * 1024;

    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
}

pub mod cover {
    use std::time::Duration;

    pub const CACHE_TTL: Duration = Duration::from_secs(300);

    pub const WAIT_TIMEOUT: Duration = Duration::from_secs(15);

    pub const LIVE_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

    pub const RECORD_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Seek offset for recording covers; the first frames are often black.
    pub const RECORD_SEEK: &str = "00:00:01";

    pub const LIVE_SEEK: &str = "0";
}

pub mod http {

    pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

    pub const DEFAULT_ACCEPT_RANGES: &str = "bytes";
}
