use serde::{Deserialize, Serialize};

use crate::parser::filename::{cover_name, extract_timestamp, stream_name};

/// One object from a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub name: String,

    pub is_dir: bool,

    pub size: u64,

    /// Server supplied, never parsed.
    pub last_modified: String,
}

impl MediaEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
            last_modified: String::new(),
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        extract_timestamp(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDescriptor {
    pub file_name: String,
    pub stream_name: String,
    pub timestamp: i64,
    pub recorded_at: Option<String>,
    pub file_size: u64,
    pub download_url: String,
    pub player_url: String,
    pub thumb_url: String,
}

impl RecordDescriptor {
    #[must_use]
    pub fn from_entry(entry: &MediaEntry) -> Self {
        let timestamp = entry.timestamp();
        let recorded_at = (timestamp > 0)
            .then(|| chrono::DateTime::from_timestamp_millis(timestamp))
            .flatten()
            .map(|dt| dt.to_rfc3339());

        Self {
            file_name: entry.name.clone(),
            stream_name: stream_name(&entry.name).to_string(),
            timestamp,
            recorded_at,
            file_size: entry.size,
            download_url: format!("/stream/record/d/{}", entry.name),
            player_url: format!("/stream/record/p/{}", entry.name),
            thumb_url: format!("/stream/record/cover/{}", cover_name(&entry.name)),
        }
    }
}
