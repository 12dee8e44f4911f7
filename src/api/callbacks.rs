//! Streaming server callbacks.

use axum::{Json, extract::State};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::validation::validate_file_name;
use super::{ApiError, AppState};
use crate::parser::filename::stream_name;
use crate::services::RecordEvent;

/// Body of the SRS `on_dvr` hook. Fields we don't use are ignored.
#[derive(Debug, Deserialize)]
pub struct DvrCallback {
    #[serde(default)]
    pub stream: String,

    /// Path of the finished segment as seen by the streaming server.
    pub file: String,

    /// Query string of the publish URL, e.g. `?record=false`.
    #[serde(default)]
    pub param: String,
}

/// `POST /stream/on_dvr`
///
/// Answers `0` right away; the upload runs in the background.
pub async fn on_dvr(
    State(state): State<Arc<AppState>>,
    Json(callback): Json<DvrCallback>,
) -> Result<Json<i32>, ApiError> {
    let file_name = Path::new(&callback.file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    validate_file_name(&file_name)?;

    let stream = if callback.stream.is_empty() {
        stream_name(&file_name).to_string()
    } else {
        callback.stream.clone()
    };

    let event = RecordEvent {
        stream_name: stream,
        file_name,
        local_path: Some(PathBuf::from(&callback.file)),
        record_enabled: record_enabled(&callback.param),
    };

    info!(
        stream = %event.stream_name,
        file = %event.file_name,
        record = event.record_enabled,
        "DVR segment finished"
    );

    let ingest = state.shared.ingest.clone();
    tokio::spawn(async move {
        let file = event.file_name.clone();
        match ingest.handle(event).await {
            Ok(outcome) => debug!(file = %file, ?outcome, "Ingest done"),
            Err(e) => error!(file = %file, error = %e, "Ingest failed"),
        }
    });

    Ok(Json(0))
}

/// `record` defaults to on; `false`, `0`, `no` and `off` turn it off.
#[must_use]
pub fn record_enabled(param: &str) -> bool {
    let query = param.trim_start_matches('?');
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "record")
        .is_none_or(|(_, value)| {
            !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "false" | "0" | "no" | "off"
            )
        })
}
