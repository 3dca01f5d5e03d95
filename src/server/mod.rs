//! Static host for the built client bundle.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

pub const ENTRY_DOCUMENT: &str = "index.html";

/// Serves `static_dir` under `base_path`. Unknown paths under the prefix get
/// the entry document so client-side routing can take over.
pub fn router(static_dir: &Path, base_path: &str, state: Arc<AppState>) -> Router {
    let bundle = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(static_dir.join(ENTRY_DOCUMENT)));

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .fallback(not_found);

    if base_path == "/" {
        app.fallback_service(bundle).layer(TraceLayer::new_for_http())
    } else {
        app.nest_service(base_path, bundle)
            .layer(TraceLayer::new_for_http())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => AppError::Internal(err).into_response(),
    }
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
