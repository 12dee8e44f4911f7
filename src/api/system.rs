//! Liveness and readiness probes.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use super::{ApiResponse, AppState, HealthLiveResponse, HealthReadyResponse};

/// `GET /health`
pub async fn health_live(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthLiveResponse {
        status: "alive",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}

/// `GET /health/ready`
///
/// Ready once the remote store answers a listing of its root.
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let storage = match state.shared.store.list_directory("").await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Readiness check: storage unavailable");
            false
        }
    };

    let status = if storage {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthReadyResponse {
            ready: storage,
            storage,
        })),
    )
        .into_response()
}
