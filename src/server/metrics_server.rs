// src/server/metrics_server.rs

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use tokio::sync::broadcast;
use tracing::{error, info};

async fn metrics_handler() -> impl IntoResponse {
    let body = crate::core::metrics::render();
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body)
}

/// Runs a minimal HTTP server exposing Prometheus metrics on `/metrics`.
pub async fn run_metrics_server(bind_addr: String, mut shutdown_rx: broadcast::Receiver<()>) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(bind_addr, error = %e, "failed to bind metrics server");
            return;
        }
    };
    info!(bind_addr, "metrics server listening on /metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("metrics server shutting down");
        })
        .await
        .ok();
}
