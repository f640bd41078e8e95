//! Health check aggregation
//!
//! Component-level health probes for the matchmaking service, used by the
//! CLI health-check mode and the periodic health logging task.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Players currently searching
    pub players_searching: usize,
    /// Total pairs committed
    pub pairs_created: u64,
    /// Total players matched
    pub players_matched: u64,
    /// Total scans completed
    pub scans_completed: u64,
    /// Total battles stored
    pub sessions_stored: usize,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let scanner_check = Self::check_scanner(&app_state).await;
        if scanner_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if scanner_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(scanner_check);

        let amqp_check = Self::check_amqp(&app_state).await;
        if amqp_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if amqp_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(amqp_check);

        let stats = Self::gather_service_stats(&app_state).await;

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Lightweight liveness check used by the periodic logging task
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    async fn check_service_running(app_state: &Arc<AppState>) -> ComponentCheck {
        let start = std::time::Instant::now();
        let running = app_state.is_running().await;

        ComponentCheck {
            name: "service".to_string(),
            status: if running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: (!running).then(|| "Service is not running".to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_scanner(app_state: &Arc<AppState>) -> ComponentCheck {
        let start = std::time::Instant::now();

        match app_state.scanner().get_stats().await {
            Ok(stats) => {
                debug!(
                    "Scanner check - scans: {}, searching: {}",
                    stats.scans_completed, stats.players_searching
                );
                ComponentCheck {
                    name: "scanner".to_string(),
                    status: HealthStatus::Healthy,
                    message: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(e) => ComponentCheck {
                name: "scanner".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }

    async fn check_amqp(app_state: &Arc<AppState>) -> ComponentCheck {
        let start = std::time::Instant::now();
        let alive = app_state.amqp_connection().is_alive();

        ComponentCheck {
            name: "amqp".to_string(),
            // A dropped broker connection degrades notification delivery
            // but matchmaking itself keeps working
            status: if alive {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            message: (!alive).then(|| "AMQP connection is not open".to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn gather_service_stats(app_state: &Arc<AppState>) -> ServiceStats {
        let scanner_stats = app_state
            .scanner()
            .get_stats()
            .await
            .unwrap_or_default();
        let sessions_stored = app_state.session_store().count().unwrap_or(0);

        ServiceStats {
            players_searching: scanner_stats.players_searching,
            pairs_created: scanner_stats.pairs_created,
            players_matched: scanner_stats.players_matched,
            scans_completed: scanner_stats.scans_completed,
            sessions_stored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_health_status_serialization() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
