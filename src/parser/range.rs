//! `Range: bytes=<start>-<end>` handling for single ranges.
//!
//! A missing start means offset 0 and a missing end means the last byte of
//! the object. Suffix ranges are therefore not RFC 7233 suffixes:
//! `bytes=-500` covers `0..=500`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed range header: {0}")]
    Malformed(String),

    #[error("unsupported range unit: {0}")]
    UnsupportedUnit(String),

    #[error("multiple ranges are not supported")]
    MultipleRanges,

    #[error("range start {start} is after end {end}")]
    Inverted { start: u64, end: u64 },

    #[error("range {start}-{end} is outside an object of {size} bytes")]
    Unsatisfiable { start: u64, end: u64, size: u64 },
}

/// A parsed but not yet size-checked range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRangeSpec {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// A range validated against an object size. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
}

pub fn parse_range_header(value: &str) -> Result<ByteRangeSpec, RangeError> {
    let value = value.trim();
    let (unit, ranges) = value
        .split_once('=')
        .ok_or_else(|| RangeError::Malformed(value.to_string()))?;

    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(RangeError::UnsupportedUnit(unit.trim().to_string()));
    }

    if ranges.contains(',') {
        return Err(RangeError::MultipleRanges);
    }

    let (start, end) = ranges
        .trim()
        .split_once('-')
        .ok_or_else(|| RangeError::Malformed(value.to_string()))?;

    let start = parse_bound(start, value)?;
    let end = parse_bound(end, value)?;

    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return Err(RangeError::Inverted { start, end });
    }

    Ok(ByteRangeSpec { start, end })
}

fn parse_bound(raw: &str, header: &str) -> Result<Option<u64>, RangeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| RangeError::Malformed(header.to_string()))
}

impl ByteRangeSpec {
    pub fn resolve(self, size: u64) -> Result<ResolvedRange, RangeError> {
        let start = self.start.unwrap_or(0);
        let Some(last) = size.checked_sub(1) else {
            return Err(RangeError::Unsatisfiable {
                start,
                end: self.end.unwrap_or(0),
                size,
            });
        };
        let end = self.end.unwrap_or(last);

        if start > end {
            return Err(RangeError::Inverted { start, end });
        }
        if end > last {
            return Err(RangeError::Unsatisfiable { start, end, size });
        }

        Ok(ResolvedRange { start, end })
    }
}

#[allow(clippy::len_without_is_empty)]
impl ResolvedRange {
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the upstream `Range` request header.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    #[must_use]
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}
