mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use common::{FakeGrabber, Grab, InMemoryStore, TempDir, test_config, write_recording};
use dvrvault::config::Config;
use dvrvault::state::SharedState;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn spawn_app(config: Config, store: &Arc<InMemoryStore>, grabber: &Arc<FakeGrabber>) -> Router {
    let shared = Arc::new(SharedState::with_components(
        config,
        store.clone(),
        grabber.clone(),
    ));
    let state = dvrvault::api::create_app_state(shared, None);
    dvrvault::api::router(state)
}

fn recording(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

async fn get(app: &Router, uri: &str, range: Option<&str>) -> Response<Body> {
    let mut request = Request::builder().uri(uri);
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

fn header_of<'a>(response: &'a Response<Body>, name: header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

struct Fixture {
    _tmp: TempDir,
    store: Arc<InMemoryStore>,
    grabber: Arc<FakeGrabber>,
    app: Router,
    config: Config,
}

fn fixture(grab: Grab) -> Fixture {
    let tmp = TempDir::new();
    let config = test_config(tmp.path());
    let store = Arc::new(InMemoryStore::default());
    let grabber = Arc::new(FakeGrabber::new(grab));
    let app = spawn_app(config.clone(), &store, &grabber);
    Fixture {
        _tmp: tmp,
        store,
        grabber,
        app,
        config,
    }
}

#[tokio::test]
async fn test_query_record_sorted_by_timestamp() {
    let f = fixture(Grab::Fails);
    f.store.put_sized("cam.3000.flv", 3);
    f.store.put_sized("cam.1000.flv", 1);
    f.store.put_sized("cam.2000.MP4", 2);
    f.store.put_sized("camera.500.flv", 1);
    f.store.put_sized("cam.4000.jpg", 1);
    f.store.put_sized("cover/cam.1000.jpg", 1);

    let response = get(&f.app, "/stream/query_record/cam", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["stream_name"], "cam");

    let names: Vec<&str> = json["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["file_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["cam.1000.flv", "cam.2000.MP4", "cam.3000.flv"]);

    let first = &json["files"][0];
    assert_eq!(first["timestamp"], 1000);
    assert_eq!(first["file_size"], 1);
    assert_eq!(first["download_url"], "/stream/record/d/cam.1000.flv");
    assert_eq!(first["player_url"], "/stream/record/p/cam.1000.flv");
    assert_eq!(first["thumb_url"], "/stream/record/cover/cam.1000.jpg");
}

#[tokio::test]
async fn test_range_prefix() {
    let f = fixture(Grab::Fails);
    let data = recording(1000);
    f.store.put("cam.1000.flv", data.clone());

    let response = get(&f.app, "/stream/record/p/cam.1000.flv", Some("bytes=0-99")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_of(&response, header::CONTENT_RANGE), "bytes 0-99/1000");
    assert_eq!(header_of(&response, header::CONTENT_LENGTH), "100");
    assert_eq!(header_of(&response, header::CONTENT_TYPE), "video/mp4");
    assert_eq!(header_of(&response, header::ACCEPT_RANGES), "bytes");
    assert!(header_of(&response, header::CONTENT_DISPOSITION).starts_with("inline"));
    assert_eq!(body_bytes(response).await, data[..100]);
}

#[tokio::test]
async fn test_range_open_end() {
    let f = fixture(Grab::Fails);
    let data = recording(1000);
    f.store.put("cam.1000.flv", data.clone());

    let response = get(&f.app, "/stream/record/p/cam.1000.flv", Some("bytes=900-")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_of(&response, header::CONTENT_RANGE), "bytes 900-999/1000");
    assert_eq!(body_bytes(response).await, data[900..]);
}

#[tokio::test]
async fn test_range_open_start_counts_from_zero() {
    let f = fixture(Grab::Fails);
    f.store.put("cam.1000.flv", recording(1000));

    let response = get(&f.app, "/stream/record/p/cam.1000.flv", Some("bytes=-500")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_of(&response, header::CONTENT_RANGE), "bytes 0-500/1000");
    assert_eq!(header_of(&response, header::CONTENT_LENGTH), "501");
}

#[tokio::test]
async fn test_range_beyond_end_is_416() {
    let f = fixture(Grab::Fails);
    f.store.put("cam.1000.flv", recording(1000));

    for range in ["bytes=1000-1001", "bytes=5-2", "bytes=0-1,5-6", "items=0-1", "bytes=abc"] {
        let response = get(&f.app, "/stream/record/p/cam.1000.flv", Some(range)).await;
        assert_eq!(
            response.status(),
            StatusCode::RANGE_NOT_SATISFIABLE,
            "range {range}"
        );
        assert_eq!(header_of(&response, header::CONTENT_RANGE), "bytes */1000");
    }

    // rejected locally, never forwarded
    assert!(f.store.calls_starting_with("RANGE").is_empty());
}

#[tokio::test]
async fn test_no_range_streams_everything() {
    let f = fixture(Grab::Fails);
    let data = recording(1000);
    f.store.put("cam.1000.flv", data.clone());

    let response = get(&f.app, "/stream/record/d/cam.1000.flv", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_of(&response, header::CONTENT_LENGTH), "1000");
    assert!(header_of(&response, header::CONTENT_RANGE).is_empty());
    assert!(header_of(&response, header::CONTENT_DISPOSITION).starts_with("attachment"));
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn test_chunked_upstream_still_sends_length() {
    let f = fixture(Grab::Fails);
    let data = recording(1000);
    f.store.put("cam.1000.flv", data.clone());
    f.store.chunked_reads();

    let response = get(&f.app, "/stream/record/p/cam.1000.flv", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_of(&response, header::CONTENT_LENGTH), "1000");
    assert_eq!(f.store.calls_starting_with("HEAD"), vec!["HEAD cam.1000.flv"]);
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn test_missing_recording_is_404() {
    let f = fixture(Grab::Fails);

    let response = get(&f.app, "/stream/record/p/cam.1.flv", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&f.app, "/stream/record/p/cam.1.flv", Some("bytes=0-1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_path_traversal_rejected() {
    let f = fixture(Grab::Fails);

    for uri in [
        "/stream/record/p/..%2Fsecret.flv",
        "/stream/record/d/a%5Cb.flv",
        "/stream/record/cover/..",
        "/stream/query_record/..",
    ] {
        let response = get(&f.app, uri, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
    }
    assert!(f.store.calls().is_empty());
}

#[tokio::test]
async fn test_record_cover() {
    let f = fixture(Grab::Fails);
    f.store.put("cover/cam.1000.jpg", b"jpeg".to_vec());

    let response = get(&f.app, "/stream/record/cover/cam.1000.jpg", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_of(&response, header::CONTENT_TYPE), "image/jpeg");
    assert_eq!(body_bytes(response).await, b"jpeg");

    // media names resolve to their cover
    let response = get(&f.app, "/stream/record/cover/cam.1000.flv", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&f.app, "/stream/record/cover/cam.2000.jpg", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_cover_is_cached() {
    let f = fixture(Grab::Writes(b"live"));

    for _ in 0..3 {
        let response = get(&f.app, "/stream/cover/cam", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"live");
    }

    assert_eq!(f.grabber.calls(), 1);
    assert_eq!(f.grabber.inputs(), vec!["rtmp://localhost/live/cam".to_string()]);
}

#[tokio::test]
async fn test_live_cover_failure_is_404() {
    let f = fixture(Grab::Fails);

    let response = get(&f.app, "/stream/cover/cam", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // failures are not cached
    get(&f.app, "/stream/cover/cam", None).await;
    assert_eq!(f.grabber.calls(), 2);
}

async fn post_dvr(app: &Router, body: serde_json::Value) -> Response<Body> {
    post_dvr_to(app, "/stream/on_dvr", body).await
}

async fn post_dvr_to(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_on_dvr_ingests_in_background() {
    let f = fixture(Grab::Writes(b"jpeg"));
    let path = write_recording(&f.config, "cam.1000.flv", 16);

    let response = post_dvr(
        &f.app,
        serde_json::json!({
            "action": "on_dvr",
            "app": "live",
            "stream": "cam",
            "param": "",
            "file": path.to_string_lossy(),
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"0");

    let store = f.store.clone();
    assert!(eventually(|| store.contains("cam.1000.flv")).await);
    assert!(eventually(|| !path.exists()).await);
}

#[tokio::test]
async fn test_on_dvr_accepts_trailing_slash() {
    let f = fixture(Grab::Fails);
    let path = write_recording(&f.config, "cam.2000.flv", 16);

    let response = post_dvr_to(
        &f.app,
        "/stream/on_dvr/",
        serde_json::json!({
            "stream": "cam",
            "file": path.to_string_lossy(),
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"0");
    let store = f.store.clone();
    assert!(eventually(|| store.contains("cam.2000.flv")).await);
}

#[tokio::test]
async fn test_on_dvr_with_recording_disabled() {
    let f = fixture(Grab::Writes(b"jpeg"));
    let path = write_recording(&f.config, "cam.1000.flv", 16);

    let response = post_dvr(
        &f.app,
        serde_json::json!({
            "stream": "cam",
            "param": "?record=false",
            "file": path.to_string_lossy(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(eventually(|| !path.exists()).await);
    assert!(f.store.calls().is_empty());
}

#[tokio::test]
async fn test_on_dvr_rejects_missing_file_name() {
    let f = fixture(Grab::Fails);

    let response = post_dvr(&f.app, serde_json::json!({ "stream": "cam", "file": "" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let f = fixture(Grab::Fails);

    let response = get(&f.app, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["data"]["status"], "alive");

    let response = get(&f.app, "/health/ready", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&f.app, "/metrics", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND, "metrics are off in tests");
}
