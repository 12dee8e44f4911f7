use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::constants::cover::{
    CACHE_TTL, LIVE_CAPTURE_TIMEOUT, RECORD_CAPTURE_TIMEOUT, WAIT_TIMEOUT,
};
use crate::constants::storage::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_STORAGE_BYTES, DEFAULT_REQUEST_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub webdav: WebDavConfig,

    pub record: RecordConfig,

    pub retention: RetentionConfig,

    pub cover: CoverConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 11985,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDavConfig {
    /// Scheme and authority of the DAV server, e.g. `https://dav.example.com`
    pub hostname: String,

    pub login: String,

    pub password: String,

    /// Collection under which recordings live. Covers go in a subcollection.
    pub root: String,

    pub request_timeout_seconds: u64,

    pub connect_timeout_seconds: u64,
}

impl Default for WebDavConfig {
    fn default() -> Self {
        Self {
            hostname: "http://localhost:8080".to_string(),
            login: String::new(),
            password: String::new(),
            root: "/".to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl WebDavConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Where the streaming server drops finished DVR files.
    pub local_dir: String,

    /// Scratch directory for generated covers.
    pub cover_dir: String,

    /// Remote collection (relative to the DAV root) holding covers.
    pub cover_remote_dir: String,

    /// Keep the local recording when its upload fails so it can be retried by hand.
    pub keep_local_on_upload_failure: bool,

    pub thumbnail_timeout_seconds: u64,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            local_dir: "./live".to_string(),
            cover_dir: "./live/cover".to_string(),
            cover_remote_dir: "cover".to_string(),
            keep_local_on_upload_failure: true,
            thumbnail_timeout_seconds: RECORD_CAPTURE_TIMEOUT.as_secs(),
        }
    }
}

impl RecordConfig {
    #[must_use]
    pub const fn thumbnail_timeout(&self) -> Duration {
        Duration::from_secs(self.thumbnail_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Ceiling for all media and covers in the remote store (default: 50 GiB)
    pub max_storage_bytes: u64,

    /// Ceiling per stream, applied before the global pass. 0 disables it.
    pub per_stream_max_bytes: u64,

    /// Interval of the background quota sweep. 0 disables it; ingest still
    /// runs a pass after every upload.
    pub sweep_interval_minutes: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_storage_bytes: DEFAULT_MAX_STORAGE_BYTES,
            per_stream_max_bytes: 0,
            sweep_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub ffmpeg_path: String,

    /// Base URL of the live streams; the stream name is appended.
    pub live_source_url: String,

    pub cache_ttl_seconds: u64,

    pub wait_timeout_seconds: u64,

    pub capture_timeout_seconds: u64,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            live_source_url: "rtmp://localhost/live".to_string(),
            cache_ttl_seconds: CACHE_TTL.as_secs(),
            wait_timeout_seconds: WAIT_TIMEOUT.as_secs(),
            capture_timeout_seconds: LIVE_CAPTURE_TIMEOUT.as_secs(),
        }
    }
}

impl CoverConfig {
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }

    #[must_use]
    pub const fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `path` wins over the search paths when given.
    pub fn load_with_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("dvrvault").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".dvrvault").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing(path: Option<&Path>) -> Result<bool> {
        let path = path.map_or_else(Self::default_config_path, Path::to_path_buf);
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.webdav.hostname.is_empty() {
            anyhow::bail!("WebDAV hostname cannot be empty");
        }

        url::Url::parse(&self.webdav.hostname)
            .with_context(|| format!("Invalid WebDAV hostname: {}", self.webdav.hostname))?;

        if self.webdav.request_timeout_seconds == 0 {
            anyhow::bail!("WebDAV request timeout must be > 0");
        }

        if self.retention.max_storage_bytes == 0 {
            anyhow::bail!("Retention max_storage_bytes must be > 0");
        }

        if self.cover.cache_ttl_seconds == 0 || self.cover.wait_timeout_seconds == 0 {
            anyhow::bail!("Cover cache TTL and wait timeout must be > 0");
        }

        Ok(())
    }
}
