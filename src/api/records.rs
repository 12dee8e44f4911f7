use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::validation::{validate_file_name, validate_stream_name};
use super::{ApiError, AppState, RecordListDto};

/// `GET /stream/query_record/{stream_name}`
pub async fn query_records(
    State(state): State<Arc<AppState>>,
    Path(stream_name): Path<String>,
) -> Result<Json<RecordListDto>, ApiError> {
    validate_stream_name(&stream_name)?;

    let files = state.shared.records.list_records(&stream_name).await?;

    Ok(Json(RecordListDto { stream_name, files }))
}

/// `GET /stream/record/d/{file_name}`
pub async fn download_record(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve_record(&state, &file_name, &headers, "attachment").await
}

/// `GET /stream/record/p/{file_name}`
pub async fn play_record(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve_record(&state, &file_name, &headers, "inline").await
}

async fn serve_record(
    state: &AppState,
    file_name: &str,
    headers: &HeaderMap,
    disposition: &str,
) -> Result<Response, ApiError> {
    validate_file_name(file_name)?;

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let stream = state.shared.streaming.stream(file_name, range).await?;

    let mut builder = Response::builder()
        .status(stream.status)
        .header(header::CONTENT_TYPE, stream.headers.content_type)
        .header(header::ACCEPT_RANGES, stream.headers.accept_ranges)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "{disposition}; filename*=UTF-8''{}",
                urlencoding::encode(file_name)
            ),
        );

    if let Some(length) = stream.headers.content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    if let Some(content_range) = stream.headers.content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }

    builder
        .body(Body::from_stream(stream.body))
        .map_err(|e| ApiError::internal(format!("Failed to build stream response: {e}")))
}

/// `GET /stream/record/cover/{cover_name}`
pub async fn record_cover(
    State(state): State<Arc<AppState>>,
    Path(cover_name): Path<String>,
) -> Result<Response, ApiError> {
    validate_file_name(&cover_name)?;

    let cover = state
        .shared
        .records
        .fetch_cover(&cover_name)
        .await?
        .ok_or_else(|| ApiError::not_found("Cover", &cover_name))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        cover,
    )
        .into_response())
}

/// `GET /stream/cover/{stream_name}`
///
/// Latest frame of a live stream, shared between concurrent viewers.
pub async fn live_cover(
    State(state): State<Arc<AppState>>,
    Path(stream_name): Path<String>,
) -> Result<Response, ApiError> {
    validate_stream_name(&stream_name)?;

    let cover = state
        .shared
        .records
        .live_cover(&stream_name)
        .await
        .ok_or_else(|| ApiError::not_found("Live cover for stream", &stream_name))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        cover,
    )
        .into_response())
}
