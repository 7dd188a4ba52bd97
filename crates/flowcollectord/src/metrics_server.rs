//! HTTP endpoint for Prometheus scraping
//!
//! Serves `/metrics` in the text exposition format and `/health`. Runs on
//! the tokio runtime owned by `main`; the pipeline threads never touch it.

use crate::handoff::{Shutdown, POLL_INTERVAL};
use crate::metrics::MetricsCollector;
use crate::stats::GlobalStats;
use crate::template_cache::TemplateCache;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct MetricsServerState {
    pub collector: MetricsCollector,
    pub stats: Arc<GlobalStats>,
    pub cache: Arc<TemplateCache>,
}

pub fn router(state: MetricsServerState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serves the metrics endpoint on `addr` until `shutdown` is triggered.
pub async fn start_metrics_server(
    addr: SocketAddr,
    state: MetricsServerState,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting metrics server on http://{}/metrics", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !shutdown.is_triggered() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await
}

async fn metrics_handler(State(state): State<MetricsServerState>) -> impl IntoResponse {
    state.collector.refresh(&state.stats, state.cache.len());

    let encoder = TextEncoder::new();
    let metric_families = state.collector.registry.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
