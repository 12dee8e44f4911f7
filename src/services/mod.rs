pub mod cover_cache;
pub use cover_cache::CoverCache;

pub mod thumbnail;
pub use thumbnail::{FfmpegGrabber, FrameGrabber, ThumbnailError};

pub mod retention;
pub use retention::{RetentionReport, RetentionService};

pub mod ingest;
pub use ingest::{IngestError, IngestOutcome, IngestReport, RecordEvent, RecordIngestPipeline};

pub mod records;
pub use records::RecordService;

pub mod streaming;
pub use streaming::{RangeStreamingService, ResponseHeaders, StreamError, StreamResponse};
