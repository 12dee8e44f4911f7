#![allow(dead_code)]

use bytes::Bytes;
use dvrvault::clients::storage::{RangedBody, UpstreamHeaders};
use dvrvault::clients::{DeleteOutcome, RemoteStore, StorageError};
use dvrvault::config::Config;
use dvrvault::models::MediaEntry;
use dvrvault::services::{FrameGrabber, ThumbnailError};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Remote store backed by a map of `path -> bytes`. Directories are implied
/// by the paths of their objects.
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    calls: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    chunked_reads: AtomicBool,
    fail_deletes: Mutex<BTreeSet<String>>,
}

impl InMemoryStore {
    pub fn put(&self, path: &str, data: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.trim_start_matches('/').to_string(), data.into());
    }

    pub fn put_sized(&self, path: &str, size: usize) {
        self.put(path, vec![0u8; size]);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Whole-object reads answer 200 without a content length.
    pub fn chunked_reads(&self) {
        self.chunked_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, path: &str) {
        self.fail_deletes.lock().unwrap().insert(path.to_string());
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

#[async_trait::async_trait]
impl RemoteStore for InMemoryStore {
    async fn list_directory(&self, path: &str) -> Result<Vec<MediaEntry>, StorageError> {
        self.record(format!("LIST {path}"));
        let dir = path.trim_matches('/');
        let objects = self.objects.lock().unwrap();

        let mut entries = Vec::new();
        let mut subdirs = BTreeSet::new();
        for (key, data) in objects.iter() {
            if parent_of(key) == dir {
                let name = key.rsplit('/').next().unwrap_or(key);
                entries.push(MediaEntry::file(name, data.len() as u64));
                continue;
            }
            let rest = if dir.is_empty() {
                Some(key.as_str())
            } else {
                key.strip_prefix(&format!("{dir}/"))
            };
            if let Some((child, _)) = rest.and_then(|r| r.split_once('/')) {
                subdirs.insert(child.to_string());
            }
        }

        for child in subdirs {
            entries.push(MediaEntry {
                name: child,
                is_dir: true,
                size: 0,
                last_modified: String::new(),
            });
        }
        Ok(entries)
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<(), StorageError> {
        self.record(format!("PUT {remote_path}"));
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::status(507, "insufficient storage"));
        }
        let data = tokio::fs::read(local_path).await?;
        self.put(remote_path, data);
        Ok(())
    }

    async fn fetch_bytes(&self, remote_path: &str) -> Result<Option<Bytes>, StorageError> {
        self.record(format!("GET {remote_path}"));
        Ok(self.objects.lock().unwrap().get(remote_path).cloned())
    }

    async fn fetch_range(
        &self,
        remote_path: &str,
        range: Option<&str>,
    ) -> Result<RangedBody, StorageError> {
        self.record(format!("RANGE {remote_path} {}", range.unwrap_or("-")));
        let data = self.objects.lock().unwrap().get(remote_path).cloned();

        let Some(data) = data else {
            return Ok(body(404, UpstreamHeaders::default(), Bytes::new()));
        };
        let size = data.len() as u64;

        let Some(range) = range else {
            let headers = UpstreamHeaders {
                content_length: (!self.chunked_reads.load(Ordering::SeqCst)).then_some(size),
                ..UpstreamHeaders::default()
            };
            return Ok(body(200, headers, data));
        };

        let (start, end) = range
            .strip_prefix("bytes=")
            .and_then(|r| r.split_once('-'))
            .and_then(|(s, e)| Some((s.parse::<u64>().ok()?, e.parse::<u64>().ok()?)))
            .ok_or_else(|| StorageError::Malformed(range.to_string()))?;

        if start > end || end >= size {
            return Ok(body(416, UpstreamHeaders::default(), Bytes::new()));
        }

        let slice = data.slice(start as usize..=end as usize);
        let headers = UpstreamHeaders {
            content_length: Some(slice.len() as u64),
            content_range: Some(format!("bytes {start}-{end}/{size}")),
            ..UpstreamHeaders::default()
        };
        Ok(body(206, headers, slice))
    }

    async fn object_size(&self, remote_path: &str) -> Result<Option<u64>, StorageError> {
        self.record(format!("HEAD {remote_path}"));
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(remote_path)
            .map(|d| d.len() as u64))
    }

    async fn delete_file(&self, remote_path: &str) -> Result<DeleteOutcome, StorageError> {
        self.record(format!("DELETE {remote_path}"));
        if self.fail_deletes.lock().unwrap().contains(remote_path) {
            return Err(StorageError::status(423, "locked"));
        }
        match self.objects.lock().unwrap().remove(remote_path) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}

fn body(status: u16, headers: UpstreamHeaders, data: Bytes) -> RangedBody {
    // two chunks so consumers have to concatenate
    let mid = data.len() / 2;
    let chunks = vec![Ok(data.slice(..mid)), Ok(data.slice(mid..))];
    RangedBody {
        status,
        headers,
        body: futures::stream::iter(chunks).boxed(),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Grab {
    Writes(&'static [u8]),
    Fails,
    TimesOut,
}

/// Frame grabber that never touches ffmpeg.
pub struct FakeGrabber {
    behavior: Grab,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl FakeGrabber {
    pub fn new(behavior: Grab) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FrameGrabber for FakeGrabber {
    async fn capture(
        &self,
        input: &str,
        output: &Path,
        _seek: &str,
        timeout: Duration,
    ) -> Result<(), ThumbnailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_string());

        match self.behavior {
            Grab::Writes(data) => {
                if let Some(parent) = output.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(output, data).await?;
                Ok(())
            }
            Grab::Fails => Err(ThumbnailError::Failed {
                code: Some(1),
                stderr: "Invalid data found when processing input".to_string(),
            }),
            Grab::TimesOut => Err(ThumbnailError::Timeout(timeout)),
        }
    }
}

/// Scratch directory under the system temp dir, removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("dvrvault-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.record.local_dir = dir.join("live").to_string_lossy().into_owned();
    config.record.cover_dir = dir.join("covers").to_string_lossy().into_owned();
    config.record.thumbnail_timeout_seconds = 1;
    config.retention.max_storage_bytes = 1_000_000;
    config.observability.metrics_enabled = false;
    config
}

/// Writes a fake recording into the configured local directory.
pub fn write_recording(config: &Config, name: &str, size: usize) -> PathBuf {
    let dir = PathBuf::from(&config.record.local_dir);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, vec![7u8; size]).unwrap();
    path
}
