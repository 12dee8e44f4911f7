//! Naming rules for DVR output.
//!
//! The streaming server names recordings `<stream>.<...>.<timestamp>.<ext>`,
//! e.g. `hehe.2024-03-22.05:41:56.1711086116534.flv`. Only the first segment
//! (stream) and the last two (timestamp, extension) carry meaning.

use crate::constants::{COVER_EXTENSION, MEDIA_EXTENSIONS};

/// Millisecond timestamp from the second-to-last segment, `0` when the name
/// has no such segment or it is not an integer.
#[must_use]
pub fn extract_timestamp(file_name: &str) -> i64 {
    let parts: Vec<&str> = file_name.split('.').collect();
    if parts.len() < 3 {
        return 0;
    }

    parts[parts.len() - 2].parse().unwrap_or(0)
}

#[must_use]
pub fn stream_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

#[must_use]
pub fn belongs_to_stream(file_name: &str, stream: &str) -> bool {
    file_name
        .strip_prefix(stream)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[must_use]
pub fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

#[must_use]
pub fn is_media_file(file_name: &str) -> bool {
    extension(file_name).is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

#[must_use]
pub fn is_cover_file(file_name: &str) -> bool {
    extension(file_name).is_some_and(|ext| ext == COVER_EXTENSION)
}

/// `<name without its last extension>.jpg`
#[must_use]
pub fn cover_name(file_name: &str) -> String {
    let base = match file_name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => file_name,
    };
    format!("{base}.{COVER_EXTENSION}")
}
