//! Metrics collection using Prometheus
//!
//! Grouped metric families for the matchmaking service: queue activity,
//! scanner behavior, rating movement and service health.

use crate::matcher::scanner::ScannerStats;
use crate::types::{BattleKind, GameMode};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Scanner-related metrics
    matcher_metrics: MatcherMetrics,

    /// Rating-related metrics
    rating_metrics: RatingMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total players queued, by mode
    pub players_queued_total: IntCounterVec,

    /// Players currently searching, by mode
    pub players_searching: IntGauge,

    /// Queue wait time before a match, by mode
    pub queue_wait_seconds: HistogramVec,

    /// Total range expansions applied
    pub range_expansions_total: IntCounter,

    /// Matched entries purged after the grace window
    pub entries_purged_total: IntCounter,
}

/// Scanner-related metrics
#[derive(Clone)]
pub struct MatcherMetrics {
    /// Total scans completed
    pub scans_total: IntCounter,

    /// Scans skipped by the reentrancy guard
    pub scans_skipped_total: IntCounter,

    /// Pairs committed, by mode
    pub pairs_created_total: IntCounterVec,

    /// Scan duration
    pub scan_duration_seconds: Histogram,
}

/// Rating-related metrics
#[derive(Clone)]
pub struct RatingMetrics {
    /// Battles completed, by mode and kind
    pub battles_completed_total: IntCounterVec,

    /// Rating updates written
    pub rating_updates_total: IntCounter,

    /// Absolute rating delta distribution
    pub rating_delta_abs: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let service_metrics = ServiceMetrics {
            uptime_seconds: IntGauge::with_opts(Opts::new(
                "arena_uptime_seconds",
                "Service uptime in seconds",
            ))?,
            health_status: IntGauge::with_opts(Opts::new(
                "arena_health_status",
                "Health status (0=unhealthy, 1=degraded, 2=healthy)",
            ))?,
            component_health: IntGaugeVec::new(
                Opts::new("arena_component_health", "Per-component health (0 or 1)"),
                &["component"],
            )?,
        };

        let queue_metrics = QueueMetrics {
            players_queued_total: IntCounterVec::new(
                Opts::new("arena_players_queued_total", "Total players queued"),
                &["mode"],
            )?,
            players_searching: IntGauge::with_opts(Opts::new(
                "arena_players_searching",
                "Players currently searching",
            ))?,
            queue_wait_seconds: HistogramVec::new(
                HistogramOpts::new("arena_queue_wait_seconds", "Wait time before a match")
                    .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
                &["mode"],
            )?,
            range_expansions_total: IntCounter::with_opts(Opts::new(
                "arena_range_expansions_total",
                "Total rating range expansions applied",
            ))?,
            entries_purged_total: IntCounter::with_opts(Opts::new(
                "arena_entries_purged_total",
                "Matched queue entries purged after the grace window",
            ))?,
        };

        let matcher_metrics = MatcherMetrics {
            scans_total: IntCounter::with_opts(Opts::new(
                "arena_scans_total",
                "Total matchmaking scans completed",
            ))?,
            scans_skipped_total: IntCounter::with_opts(Opts::new(
                "arena_scans_skipped_total",
                "Scans skipped because the previous scan was still running",
            ))?,
            pairs_created_total: IntCounterVec::new(
                Opts::new("arena_pairs_created_total", "Pairs committed into battles"),
                &["mode"],
            )?,
            scan_duration_seconds: Histogram::with_opts(
                HistogramOpts::new("arena_scan_duration_seconds", "Matchmaking scan duration")
                    .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            )?,
        };

        let rating_metrics = RatingMetrics {
            battles_completed_total: IntCounterVec::new(
                Opts::new("arena_battles_completed_total", "Battles completed"),
                &["mode", "kind"],
            )?,
            rating_updates_total: IntCounter::with_opts(Opts::new(
                "arena_rating_updates_total",
                "Rating record updates written",
            ))?,
            rating_delta_abs: Histogram::with_opts(
                HistogramOpts::new(
                    "arena_rating_delta_abs",
                    "Absolute rating delta per update",
                )
                .buckets(vec![1.0, 4.0, 8.0, 16.0, 24.0, 32.0, 48.0]),
            )?,
        };

        // Register everything once, up front
        registry.register(Box::new(service_metrics.uptime_seconds.clone()))?;
        registry.register(Box::new(service_metrics.health_status.clone()))?;
        registry.register(Box::new(service_metrics.component_health.clone()))?;
        registry.register(Box::new(queue_metrics.players_queued_total.clone()))?;
        registry.register(Box::new(queue_metrics.players_searching.clone()))?;
        registry.register(Box::new(queue_metrics.queue_wait_seconds.clone()))?;
        registry.register(Box::new(queue_metrics.range_expansions_total.clone()))?;
        registry.register(Box::new(queue_metrics.entries_purged_total.clone()))?;
        registry.register(Box::new(matcher_metrics.scans_total.clone()))?;
        registry.register(Box::new(matcher_metrics.scans_skipped_total.clone()))?;
        registry.register(Box::new(matcher_metrics.pairs_created_total.clone()))?;
        registry.register(Box::new(matcher_metrics.scan_duration_seconds.clone()))?;
        registry.register(Box::new(rating_metrics.battles_completed_total.clone()))?;
        registry.register(Box::new(rating_metrics.rating_updates_total.clone()))?;
        registry.register(Box::new(rating_metrics.rating_delta_abs.clone()))?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            matcher_metrics,
            rating_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matcher(&self) -> &MatcherMetrics {
        &self.matcher_metrics
    }

    pub fn rating(&self) -> &RatingMetrics {
        &self.rating_metrics
    }

    /// Record a player joining the queue
    pub fn record_player_queued(&self, mode: GameMode) {
        self.queue_metrics
            .players_queued_total
            .with_label_values(&[mode.as_str()])
            .inc();
    }

    /// Record one half of a committed pair with its queue wait
    pub fn record_pair_created(&self, mode: GameMode, wait_seconds: f64) {
        self.matcher_metrics
            .pairs_created_total
            .with_label_values(&[mode.as_str()])
            .inc();
        self.queue_metrics
            .queue_wait_seconds
            .with_label_values(&[mode.as_str()])
            .observe(wait_seconds);
    }

    /// Record a completed scan
    pub fn record_scan(&self, duration: Duration, _pairs: usize) {
        self.matcher_metrics.scans_total.inc();
        self.matcher_metrics
            .scan_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record a scan skipped by the reentrancy guard
    pub fn record_scan_skipped(&self) {
        self.matcher_metrics.scans_skipped_total.inc();
    }

    /// Record applied range expansions
    pub fn record_range_expansions(&self, count: u64) {
        self.queue_metrics.range_expansions_total.inc_by(count);
    }

    /// Record purged matched entries
    pub fn record_entries_purged(&self, count: u64) {
        self.queue_metrics.entries_purged_total.inc_by(count);
    }

    /// Record a completed battle
    pub fn record_battle_completed(&self, mode: GameMode, kind: BattleKind) {
        self.rating_metrics
            .battles_completed_total
            .with_label_values(&[mode.as_str(), &kind.to_string()])
            .inc();
    }

    /// Record one rating update
    pub fn record_rating_update(&self, delta: i32) {
        self.rating_metrics.rating_updates_total.inc();
        self.rating_metrics
            .rating_delta_abs
            .observe(delta.unsigned_abs() as f64);
    }

    /// Refresh gauges from scanner statistics
    pub fn update_from_scanner_stats(&self, stats: &ScannerStats) {
        self.queue_metrics
            .players_searching
            .set(stats.players_searching as i64);
    }

    /// Update the overall health gauge
    pub fn update_health_status(&self, status: i64) {
        self.service_metrics.health_status.set(status);
    }

    /// Update one component's health gauge
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(healthy as i64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        // A fresh registry cannot produce duplicate registrations
        Self::new().expect("metrics collector with fresh registry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_registers_families() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_player_queued(GameMode::Standard);
        collector.record_pair_created(GameMode::Standard, 12.5);
        collector.record_scan(Duration::from_millis(3), 1);
        collector.record_battle_completed(GameMode::Standard, BattleKind::Ranked);
        collector.record_rating_update(-16);

        let families = collector.registry().gather();
        assert!(!families.is_empty());

        let names: Vec<String> = families
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n.contains("players_queued")));
        assert!(names.iter().any(|n| n.contains("pairs_created")));
        assert!(names.iter().any(|n| n.contains("battles_completed")));
    }

    #[test]
    fn test_counters_accumulate() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_player_queued(GameMode::Sprint);
        collector.record_player_queued(GameMode::Sprint);

        let value = collector
            .queue()
            .players_queued_total
            .with_label_values(&["sprint"])
            .get();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_scanner_stats_refresh() {
        let collector = MetricsCollector::new().unwrap();

        let stats = ScannerStats {
            players_searching: 7,
            ..ScannerStats::default()
        };
        collector.update_from_scanner_stats(&stats);
        assert_eq!(collector.queue().players_searching.get(), 7);
    }

    #[test]
    fn test_component_health_gauge() {
        let collector = MetricsCollector::new().unwrap();
        collector.update_component_health("amqp", true);
        collector.update_component_health("scanner", false);

        assert_eq!(
            collector
                .service()
                .component_health
                .with_label_values(&["amqp"])
                .get(),
            1
        );
        assert_eq!(
            collector
                .service()
                .component_health
                .with_label_values(&["scanner"])
                .get(),
            0
        );
    }
}
