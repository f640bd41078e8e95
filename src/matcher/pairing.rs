//! Pairing algorithm for the matchmaking scanner
//!
//! This module holds the pure matchmaking logic: how acceptable rating
//! ranges widen with wait time, when two queued players may battle each
//! other, and how a pool of waiting players is reduced to pairs.

use crate::config::MatchmakingSettings;
use crate::types::QueueEntry;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for matcher behavior
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Interval between periodic scans
    pub scan_interval: Duration,
    /// Wait time that earns one range expansion
    pub expansion_interval: Duration,
    /// Rating points added to both range bounds per expansion
    pub expansion_step: i32,
    /// Half-width of the acceptable range at enqueue time
    pub initial_range: i32,
    /// How long matched entries linger for late status polls
    pub matched_grace: Duration,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
            expansion_interval: Duration::from_secs(15),
            expansion_step: 50,
            initial_range: 100,
            matched_grace: Duration::from_secs(300),
        }
    }
}

impl MatcherConfig {
    /// Build a matcher configuration from application settings
    pub fn from_settings(settings: &MatchmakingSettings) -> Self {
        Self {
            scan_interval: Duration::from_millis(settings.scan_interval_ms),
            expansion_interval: Duration::from_millis(settings.expansion_interval_ms),
            expansion_step: settings.expansion_step,
            initial_range: settings.initial_range,
            matched_grace: Duration::from_secs(settings.matched_grace_seconds),
        }
    }
}

/// Number of expansions an entry has earned after waiting `wait_ms`
pub fn expansions_due(wait_ms: i64, expansion_interval_ms: i64) -> u32 {
    if wait_ms <= 0 || expansion_interval_ms <= 0 {
        return 0;
    }
    (wait_ms / expansion_interval_ms) as u32
}

/// Widen an entry's range to match its earned expansions.
///
/// Returns the number of newly applied expansions; zero means the entry
/// was already up to date and needs no persistence. The range only ever
/// grows, so worst-case wait time stays bounded: eventually any two
/// searchers in the same mode accept each other.
pub fn apply_expansions(entry: &mut QueueEntry, now: DateTime<Utc>, config: &MatcherConfig) -> u32 {
    let wait_ms = entry.wait_time(now).num_milliseconds();
    let due = expansions_due(wait_ms, config.expansion_interval.as_millis() as i64);

    if due <= entry.expansions_applied {
        return 0;
    }

    let newly_applied = due - entry.expansions_applied;
    entry
        .rating_range
        .widen(config.expansion_step * newly_applied as i32);
    entry.expansions_applied = due;

    newly_applied
}

/// Whether two entries may battle each other: same mode, and each rating
/// snapshot falls inside the other's acceptable range. Both directions
/// must hold; one eager searcher cannot drag in an unwilling one.
pub fn mutually_compatible(first: &QueueEntry, second: &QueueEntry) -> bool {
    first.game_mode == second.game_mode
        && second.rating_range.contains(first.current_rating)
        && first.rating_range.contains(second.current_rating)
}

/// Greedily pair a FIFO-ordered pool of searching entries.
///
/// Entries must be sorted oldest `search_start` first. Each unpaired entry
/// takes the first compatible later entry; greedy rather than globally
/// optimal, which keeps the oldest searchers matched first.
pub fn pair_entries(entries: &[QueueEntry]) -> Vec<(QueueEntry, QueueEntry)> {
    let mut pairs = Vec::new();
    let mut matched: HashSet<&str> = HashSet::new();

    for (i, first) in entries.iter().enumerate() {
        if matched.contains(first.user_id.as_str()) {
            continue;
        }

        for second in &entries[i + 1..] {
            if matched.contains(second.user_id.as_str()) {
                continue;
            }
            if second.user_id == first.user_id {
                continue;
            }
            if mutually_compatible(first, second) {
                matched.insert(first.user_id.as_str());
                matched.insert(second.user_id.as_str());
                pairs.push((first.clone(), second.clone()));
                break;
            }
        }
    }

    pairs
}
