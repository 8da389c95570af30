use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Liveness: no DB access, no rate limiting
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness probe: DB round trip with a timeout
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => {
            tracing::warn!("readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "not ready: database unavailable").into_response()
        }
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

fn prometheus_entry(out: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    out.push_str(&format!("# HELP bookclub_{name} {help}\n# TYPE bookclub_{name} {kind}\nbookclub_{name} {value}\n"));
}

// Prometheus text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let mut body = String::new();
    prometheus_entry(&mut body, "authors_created", "counter", "Authors created", m.authors_created as u64);
    prometheus_entry(&mut body, "books_created", "counter", "Books created", m.books_created as u64);
    prometheus_entry(&mut body, "records_deleted", "counter", "Records deleted", m.records_deleted as u64);
    prometheus_entry(&mut body, "uploads_stored", "counter", "Uploaded files stored", m.uploads_stored);
    prometheus_entry(&mut body, "upload_bytes", "counter", "Bytes of uploaded files stored", m.upload_bytes);
    prometheus_entry(&mut body, "files_removed", "counter", "Uploaded files removed", m.files_removed);
    prometheus_entry(&mut body, "searches", "counter", "Search requests served", m.searches as u64);
    prometheus_entry(&mut body, "uptime_seconds", "gauge", "Uptime seconds", m.uptime_seconds);
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Build info (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
