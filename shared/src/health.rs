// ============================================================================
// Health and Metrics Endpoint
// ============================================================================
//
// Small HTTP server next to the worker:
//   GET /health        liveness, always 200 while the process runs
//   GET /metrics       Prometheus text exposition
//
// ============================================================================

use axum::Json;
use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use reprocess_error::ReprocessResult;
use reprocess_metrics::gather_metrics;
use serde_json::{Value, json};
use std::net::SocketAddr;
use tracing::info;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "cache-reprocess",
    }))
}

pub async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to gather metrics: {}", e),
        )
            .into_response(),
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
}

/// Serve the health router until the process exits
pub async fn serve(port: u16) -> ReprocessResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Health endpoint listening");
    axum::serve(listener, router()).await?;
    Ok(())
}
