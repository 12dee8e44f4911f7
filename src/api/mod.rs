use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

mod callbacks;
mod error;
mod observability;
mod records;
mod system;
mod types;
mod validation;

pub use callbacks::{DvrCallback, record_enabled};
pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/stream/on_dvr", post(callbacks::on_dvr))
        // older SRS hook configs carry the trailing slash
        .route("/stream/on_dvr/", post(callbacks::on_dvr))
        .route(
            "/stream/query_record/{stream_name}",
            get(records::query_records),
        )
        .route("/stream/record/d/{file_name}", get(records::download_record))
        .route("/stream/record/p/{file_name}", get(records::play_record))
        .route(
            "/stream/record/cover/{cover_name}",
            get(records::record_cover),
        )
        .route("/stream/cover/{stream_name}", get(records::live_cover))
        .route("/health", get(system::health_live))
        .route("/health/ready", get(system::health_ready))
        .route("/metrics", get(observability::get_metrics))
        // route_layer: MatchedPath is only set once the router has matched
        .route_layer(middleware::from_fn(observability::track_metrics))
        .with_state(state)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
