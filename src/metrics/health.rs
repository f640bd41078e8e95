//! Health check endpoints and Prometheus metrics server
//!
//! HTTP endpoints for health probes and metrics exposition, served on the
//! metrics port, separate from the matchmaking API.

use crate::matcher::scanner::MatchScanner;
use crate::metrics::collector::MetricsCollector;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the health server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub scanner: Option<Arc<MatchScanner>>,
}

/// Health server that provides HTTP endpoints for monitoring
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    /// Create a new health server
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                scanner: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the scanner so health checks can report queue statistics
    pub fn with_scanner(mut self, scanner: Arc<MatchScanner>) -> Self {
        self.state.scanner = Some(scanner);
        self
    }

    /// Start the health server
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    /// Create the Axum router with all health endpoints
    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    /// Stop the health server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping health server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }

        Ok(())
    }
}

/// Root endpoint handler - shows service information
async fn root_handler() -> impl IntoResponse {
    let info = json!({
        "service": "trade-arena",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/ready",
            "/alive",
            "/metrics",
            "/stats"
        ]
    });

    Json(info)
}

/// Health check endpoint handler
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    match &state.scanner {
        Some(scanner) => match scanner.get_stats().await {
            Ok(stats) => (
                StatusCode::OK,
                Json(json!({
                    "status": "healthy",
                    "service": "trade-arena",
                    "version": env!("CARGO_PKG_VERSION"),
                    "players_searching": stats.players_searching,
                    "scans_completed": stats.scans_completed,
                })),
            ),
            Err(e) => {
                error!("Health check failed reading scanner stats: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "status": "unhealthy",
                        "error": e.to_string(),
                    })),
                )
            }
        },
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "starting",
                "service": "trade-arena",
            })),
        ),
    }
}

/// Readiness probe - ready once the scanner is wired in
async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    if state.scanner.is_some() {
        (StatusCode::OK, Json(json!({ "ready": true })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ready": false })))
    }
}

/// Liveness probe - the process is serving requests
async fn alive_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "alive": true })))
}

/// Prometheus metrics exposition
async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let registry = state.metrics_collector.registry();
    let metric_families = registry.gather();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => {
                error!("Metrics encoding produced invalid UTF-8: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "metrics encoding error".to_string(),
                )
            }
        },
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "metrics encoding error".to_string(),
            )
        }
    }
}

/// Scanner statistics as JSON
async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    match &state.scanner {
        Some(scanner) => match scanner.get_stats().await {
            Ok(stats) => (
                StatusCode::OK,
                Json(json!({
                    "scans_completed": stats.scans_completed,
                    "scans_skipped": stats.scans_skipped,
                    "players_queued": stats.players_queued,
                    "players_matched": stats.players_matched,
                    "pairs_created": stats.pairs_created,
                    "entries_purged": stats.entries_purged,
                    "players_searching": stats.players_searching,
                })),
            ),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ),
        },
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "scanner not started" })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_server_config_default() {
        let config = HealthServerConfig::default();
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_encodes_registry() {
        let collector = Arc::new(MetricsCollector::default());
        collector.record_scan(std::time::Duration::from_millis(1), 0);

        let state = HealthServerState {
            metrics_collector: collector,
            scanner: None,
        };

        let response = metrics_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_requires_scanner() {
        let state = HealthServerState {
            metrics_collector: Arc::new(MetricsCollector::default()),
            scanner: None,
        };

        let response = ready_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
