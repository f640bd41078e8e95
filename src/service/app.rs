//! Main application state and service coordination
//!
//! This module contains the production AppState that wires together the
//! stores, the scanner, the rating updater, the HTTP servers and the
//! background tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::publisher::{AmqpEventPublisher, PublisherConfig};
use crate::config::AppConfig;
use crate::http::api::{ApiServer, ApiServerConfig, ApiState};
use crate::matcher::pairing::MatcherConfig;
use crate::matcher::scanner::MatchScanner;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::queue::{InMemoryQueueStore, QueueStore};
use crate::rating::elo::{EloCalculator, EloSettings};
use crate::rating::store::{InMemoryRatingStore, RatingStore};
use crate::rating::updater::RatingUpdater;
use crate::session::{InMemorySessionStore, SessionStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Matchmaking scanner
    scanner: Arc<MatchScanner>,

    /// Rating updater
    updater: Arc<RatingUpdater>,

    /// Stores, shared with the HTTP layer
    queue_store: Arc<dyn QueueStore>,
    session_store: Arc<dyn SessionStore>,
    rating_store: Arc<dyn RatingStore>,

    /// AMQP connection for outbound events
    amqp_connection: Arc<AmqpConnection>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Matchmaking API server
    api_server: Arc<ApiServer>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing trade-arena matchmaking service");
        info!(
            "Configuration: service={}, amqp_url={}",
            config.service.name, config.amqp.url
        );

        let amqp_connection = Self::initialize_amqp(&config).await?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        // Stores
        let queue_store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
        let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let rating_store: Arc<dyn RatingStore> = Arc::new(InMemoryRatingStore::new(
            config.rating.default_rating,
            config.rating.min_rating,
        ));

        // Event publisher over a dedicated channel
        let channel = amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open AMQP channel: {}", e),
            })?;
        let event_publisher = Arc::new(
            AmqpEventPublisher::new(channel, PublisherConfig::default())
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize event publisher: {}", e),
                })?,
        );

        // Matchmaking core
        let scanner = Arc::new(MatchScanner::with_metrics(
            queue_store.clone(),
            session_store.clone(),
            event_publisher.clone(),
            MatcherConfig::from_settings(&config.matchmaking),
            metrics_collector.clone(),
        ));

        let calculator = EloCalculator::new(EloSettings {
            k_factor: config.rating.k_factor,
            default_rating: config.rating.default_rating,
            min_rating: config.rating.min_rating,
        })
        .map_err(|e| ServiceError::Initialization {
            message: format!("Failed to initialize Elo calculator: {}", e),
        })?;
        let updater = Arc::new(RatingUpdater::new(
            rating_store.clone(),
            session_store.clone(),
            event_publisher,
            calculator,
            metrics_collector.clone(),
        ));

        // Monitoring endpoints
        let health_config = HealthServerConfig {
            port: config.service.metrics_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone())
                .with_scanner(scanner.clone()),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        // Matchmaking API
        let api_config = ApiServerConfig {
            port: config.service.http_port,
            host: "0.0.0.0".to_string(),
        };
        let api_server = Arc::new(ApiServer::new(
            api_config,
            ApiState {
                scanner: scanner.clone(),
                updater: updater.clone(),
                ratings: rating_store.clone(),
                sessions: session_store.clone(),
            },
        ));

        Ok(Self {
            config,
            scanner,
            updater,
            queue_store,
            session_store,
            rating_store,
            amqp_connection,
            metrics_service,
            api_server,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start all servers and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting trade-arena matchmaking service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;
        self.start_api_server().await?;
        self.start_background_tasks().await?;

        info!("Trade-arena matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of trade-arena service");

        *self.is_running.write().await = false;

        self.stop_background_tasks().await;

        if let Err(e) = self.api_server.stop().await {
            warn!("Failed to stop API server: {}", e);
        }
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        let final_stats =
            self.scanner
                .get_stats()
                .await
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;
        info!("Final service statistics: {:?}", final_stats);
        info!("Trade-arena service shutdown completed");

        Ok(())
    }

    /// Stop the HTTP servers without exclusive access; used by the
    /// signal-driven shutdown path where the state is behind an Arc
    pub async fn stop_servers(&self) {
        if let Err(e) = self.api_server.stop().await {
            warn!("Failed to stop API server: {}", e);
        }
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the matchmaking scanner
    pub fn scanner(&self) -> Arc<MatchScanner> {
        self.scanner.clone()
    }

    /// Get the rating updater
    pub fn updater(&self) -> Arc<RatingUpdater> {
        self.updater.clone()
    }

    /// Get the queue store
    pub fn queue_store(&self) -> Arc<dyn QueueStore> {
        self.queue_store.clone()
    }

    /// Get the session store
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.session_store.clone()
    }

    /// Get the rating store
    pub fn rating_store(&self) -> Arc<dyn RatingStore> {
        self.rating_store.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Get AMQP connection for health checks
    pub fn amqp_connection(&self) -> Arc<AmqpConnection> {
        self.amqp_connection.clone()
    }

    /// Initialize AMQP connection with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let mut amqp_config = AmqpConfig::from_url(&config.amqp.url);
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;
        amqp_config.connection_timeout_ms = config.amqp.connection_timeout_seconds * 1000;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    /// Start the metrics/health endpoints as a background task
    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            }
        });

        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Metrics service started on port {}", port);
        Ok(())
    }

    /// Start the matchmaking API as a background task
    async fn start_api_server(&mut self) -> Result<(), ServiceError> {
        info!("Starting matchmaking API");

        let api_server = self.api_server.clone();
        let port = self.config.service.http_port;

        let api_handle = tokio::spawn(async move {
            if let Err(e) = api_server.start().await {
                error!("API server failed: {}", e);
            }
        });

        self.background_tasks.push(api_handle);

        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Matchmaking API started on port {}", port);
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&mut self) -> Result<(), ServiceError> {
        info!("Starting background tasks...");

        // The matchmaking scan loop. Errors are logged and the loop keeps
        // running; the service must survive arbitrarily many failed scans.
        info!(
            "Starting matchmaking scan task ({:?} interval)...",
            self.config.scan_interval()
        );
        let scan_task = {
            let scanner = self.scanner.clone();
            let scan_interval = self.config.scan_interval();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(scan_interval);
                info!("Matchmaking scan task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match scanner.scan().await {
                        Ok(report) => {
                            if report.paired > 0 || report.purged > 0 {
                                debug!(
                                    "Scan report - paired: {}, expanded: {}, purged: {}",
                                    report.paired, report.expanded, report.purged
                                );
                            }
                        }
                        Err(e) => {
                            error!("Error during matchmaking scan: {}", e);
                        }
                    }
                }

                info!("Matchmaking scan task stopped");
            })
        };

        // Metrics refresh task
        info!("Starting metrics refresh task (30s interval)...");
        let metrics_task = {
            let scanner = self.scanner.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("Metrics refresh task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match scanner.get_stats().await {
                        Ok(stats) => {
                            metrics_collector.update_from_scanner_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get scanner stats for metrics update: {}", e);
                        }
                    }
                }

                info!("Metrics refresh task stopped");
            })
        };

        // Service health metrics task
        info!("Starting health metrics task (60s interval)...");
        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let amqp_connection = self.amqp_connection.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    let amqp_alive = amqp_connection.is_alive();
                    metrics_collector.update_component_health("amqp", amqp_alive);
                    metrics_collector.update_component_health("scanner", true);
                    metrics_collector.update_health_status(if amqp_alive { 2 } else { 1 });
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(scan_task);
        self.background_tasks.push(metrics_task);
        self.background_tasks.push(health_metrics_task);

        info!("Background tasks started successfully");
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        // Give tasks time to observe the abort
        tokio::time::sleep(Duration::from_millis(200)).await;

        info!("All {} background tasks stopped", task_count);
    }
}
