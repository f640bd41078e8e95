//! Test fixtures and helpers for integration testing

use std::collections::HashMap;
use std::sync::Arc;
use trade_arena::amqp::publisher::MockEventPublisher;
use trade_arena::matcher::{MatchScanner, MatcherConfig};
use trade_arena::metrics::MetricsCollector;
use trade_arena::queue::InMemoryQueueStore;
use trade_arena::rating::elo::{EloCalculator, EloSettings};
use trade_arena::rating::store::InMemoryRatingStore;
use trade_arena::rating::updater::RatingUpdater;
use trade_arena::session::InMemorySessionStore;
use trade_arena::types::{BattleResults, UserId};

/// A complete in-process matchmaking system for integration tests
pub struct TestSystem {
    pub scanner: Arc<MatchScanner>,
    pub updater: Arc<RatingUpdater>,
    pub queue: Arc<InMemoryQueueStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub ratings: Arc<InMemoryRatingStore>,
    pub publisher: Arc<MockEventPublisher>,
}

/// Build a system with the default matcher configuration
pub fn create_test_system() -> TestSystem {
    create_test_system_with_config(MatcherConfig::default())
}

/// Build a system with a custom matcher configuration
pub fn create_test_system_with_config(config: MatcherConfig) -> TestSystem {
    let queue = Arc::new(InMemoryQueueStore::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let ratings = Arc::new(InMemoryRatingStore::default());
    let publisher = Arc::new(MockEventPublisher::new());
    let metrics = Arc::new(MetricsCollector::default());

    let scanner = Arc::new(MatchScanner::with_metrics(
        queue.clone(),
        sessions.clone(),
        publisher.clone(),
        config,
        metrics.clone(),
    ));
    let updater = Arc::new(RatingUpdater::new(
        ratings.clone(),
        sessions.clone(),
        publisher.clone(),
        EloCalculator::new(EloSettings::default()).expect("default Elo settings are valid"),
        metrics,
    ));

    TestSystem {
        scanner,
        updater,
        queue,
        sessions,
        ratings,
        publisher,
    }
}

/// Battle results with the given final value and derived return
pub fn results_with_value(final_value: f64) -> BattleResults {
    BattleResults {
        final_value,
        return_pct: (final_value - 10_000.0) / 10_000.0 * 100.0,
        trade_count: 5,
        max_drawdown_pct: 2.0,
    }
}

/// Completion payload for two participants
pub fn completion_results(
    first: (&str, f64),
    second: (&str, f64),
) -> HashMap<UserId, BattleResults> {
    HashMap::from([
        (first.0.to_string(), results_with_value(first.1)),
        (second.0.to_string(), results_with_value(second.1)),
    ])
}
