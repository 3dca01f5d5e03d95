use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use driver_client::server::router;
use driver_client::state::AppState;
use tempfile::TempDir;
use tower::ServiceExt;

const ENTRY: &str = "<!doctype html><title>Driver</title>";

fn bundle() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), ENTRY).unwrap();
    std::fs::create_dir_all(dir.path().join("static")).unwrap();
    std::fs::write(dir.path().join("static").join("app.js"), "console.log('driver');").unwrap();
    dir
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn app(dir: &TempDir) -> axum::Router {
    router(dir.path(), "/driver-app", Arc::new(AppState::in_memory(8)))
}

#[tokio::test]
async fn health_returns_ok() {
    let dir = bundle();
    let response = app(&dir).oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);
}

#[tokio::test]
async fn serves_assets_under_the_prefix() {
    let dir = bundle();
    let response = app(&dir)
        .oneshot(get_request("/driver-app/static/app.js"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "console.log('driver');");
}

#[tokio::test]
async fn unknown_client_routes_fall_back_to_the_entry_document() {
    let dir = bundle();
    let response = app(&dir)
        .oneshot(get_request("/driver-app/routes/7"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, ENTRY);
}

#[tokio::test]
async fn paths_outside_the_prefix_are_not_found() {
    let dir = bundle();
    let response = app(&dir).oneshot(get_request("/elsewhere")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let dir = bundle();
    let response = app(&dir).oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}
