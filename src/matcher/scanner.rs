//! Periodic matchmaking scanner
//!
//! This module provides the MatchScanner that orchestrates the queue:
//! joining and leaving, the periodic scan that widens ranges and commits
//! pairs into battle sessions, and purging of stale matched entries.

use crate::amqp::publisher::EventPublisher;
use crate::error::{MatchmakingError, Result};
use crate::matcher::pairing::{self, MatcherConfig};
use crate::metrics::MetricsCollector;
use crate::queue::QueueStore;
use crate::session::SessionStore;
use crate::types::{
    BattleKind, BattleSession, GameMode, MatchFound, Participant, QueueEntry, QueueStatus,
};
use crate::utils::current_timestamp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Statistics about scanner operations
#[derive(Debug, Clone, Default)]
pub struct ScannerStats {
    /// Total scans completed
    pub scans_completed: u64,
    /// Scans skipped because the previous one was still running
    pub scans_skipped: u64,
    /// Total players enqueued
    pub players_queued: u64,
    /// Total players matched into battles
    pub players_matched: u64,
    /// Total pairs committed
    pub pairs_created: u64,
    /// Matched entries removed after the grace window
    pub entries_purged: u64,
    /// Players currently searching
    pub players_searching: usize,
}

/// What one scan accomplished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Entries whose range was widened
    pub expanded: usize,
    /// Pairs committed into sessions
    pub paired: usize,
    /// Matched entries purged
    pub purged: usize,
    /// Whether the firing was skipped by the reentrancy guard
    pub skipped: bool,
}

/// Result of a join request
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// An opponent was already waiting; the battle is ready
    Matched {
        session: BattleSession,
        opponent_username: String,
        opponent_rating: i32,
    },
    /// No compatible opponent yet; the player is searching
    Queued(QueueEntry),
}

/// The matchmaking scanner
pub struct MatchScanner {
    queue: Arc<dyn QueueStore>,
    sessions: Arc<dyn SessionStore>,
    event_publisher: Arc<dyn EventPublisher>,
    config: MatcherConfig,
    stats: Arc<RwLock<ScannerStats>>,
    metrics: Arc<MetricsCollector>,
    /// Reentrancy guard: scans are serialized, never concurrent
    scan_in_progress: AtomicBool,
}

impl MatchScanner {
    /// Create a new scanner with a default metrics collector
    pub fn new(
        queue: Arc<dyn QueueStore>,
        sessions: Arc<dyn SessionStore>,
        event_publisher: Arc<dyn EventPublisher>,
        config: MatcherConfig,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(queue, sessions, event_publisher, config, metrics)
    }

    /// Create a new scanner with an explicit metrics collector
    pub fn with_metrics(
        queue: Arc<dyn QueueStore>,
        sessions: Arc<dyn SessionStore>,
        event_publisher: Arc<dyn EventPublisher>,
        config: MatcherConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue,
            sessions,
            event_publisher,
            config,
            stats: Arc::new(RwLock::new(ScannerStats::default())),
            metrics,
            scan_in_progress: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Handle a join request: enqueue the player and immediately try to
    /// pair them against the waiting pool, so a compatible opponent who is
    /// already searching produces a battle without waiting for the next
    /// periodic scan.
    pub async fn join_queue(
        &self,
        user_id: &str,
        username: &str,
        game_mode: GameMode,
        current_rating: i32,
    ) -> Result<JoinOutcome> {
        if user_id.is_empty() {
            return Err(MatchmakingError::InvalidJoinRequest {
                reason: "User ID cannot be empty".to_string(),
            }
            .into());
        }
        if username.is_empty() {
            return Err(MatchmakingError::InvalidJoinRequest {
                reason: "Username cannot be empty".to_string(),
            }
            .into());
        }

        // A repeated join is a no-op while searching, and reports the
        // match while a matched entry lingers in its grace window.
        if let Some(existing) = self.queue.get(user_id)? {
            match existing.status {
                QueueStatus::Searching => {
                    debug!("Player '{}' already searching, join is a no-op", user_id);
                    return Ok(JoinOutcome::Queued(existing));
                }
                QueueStatus::Matched => {
                    if let Some(session_id) = existing.matched_session {
                        if let Some(session) = self.sessions.get(session_id)? {
                            if !session.is_completed() {
                                if let Some(opponent) = session.opponent_of(user_id) {
                                    return Ok(JoinOutcome::Matched {
                                        opponent_username: opponent.username.clone(),
                                        opponent_rating: opponent.starting_rating,
                                        session,
                                    });
                                }
                            }
                        }
                    }
                    // Stale matched entry; clear it and search again
                    self.queue.dequeue(user_id)?;
                }
            }
        }

        let entry = QueueEntry::new(
            user_id.to_string(),
            username.to_string(),
            game_mode,
            current_rating,
            self.config.initial_range,
        );
        let entry = self.queue.enqueue(entry)?;

        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
            stats.players_queued += 1;
        }
        self.metrics.record_player_queued(game_mode);

        info!(
            "Player '{}' queued for {} battles at rating {} (range {}..{})",
            user_id, game_mode, current_rating, entry.rating_range.min, entry.rating_range.max
        );

        if let Some(session) = self.try_match_now(&entry).await? {
            let (opponent_username, opponent_rating) = session
                .opponent_of(user_id)
                .map(|p| (p.username.clone(), p.starting_rating))
                .unwrap_or_default();

            return Ok(JoinOutcome::Matched {
                session,
                opponent_username,
                opponent_rating,
            });
        }

        Ok(JoinOutcome::Queued(entry))
    }

    /// One-shot pairing attempt for a single fresh entry against the pool
    pub async fn try_match_now(&self, entry: &QueueEntry) -> Result<Option<BattleSession>> {
        let candidates = self.queue.list_searching(Some(entry.game_mode))?;

        for candidate in candidates.iter().filter(|c| c.user_id != entry.user_id) {
            if !pairing::mutually_compatible(entry, candidate) {
                continue;
            }

            // The waiting candidate is the senior half of the pair
            match self.commit_pair(candidate, entry).await {
                Ok(session) => return Ok(Some(session)),
                Err(e) => {
                    debug!(
                        "Immediate pair of '{}' with '{}' fell through: {}",
                        entry.user_id, candidate.user_id, e
                    );
                }
            }
        }

        Ok(None)
    }

    /// Remove a player from the queue. Safe to call when not queued.
    pub async fn leave_queue(&self, user_id: &str) -> Result<bool> {
        let removed = self.queue.dequeue(user_id)?;
        if removed {
            info!("Player '{}' left the queue", user_id);
        } else {
            debug!("Leave request for '{}' who was not queued", user_id);
        }
        Ok(removed)
    }

    /// Current queue entry for a player, searching or matched
    pub async fn queue_status(&self, user_id: &str) -> Result<Option<QueueEntry>> {
        self.queue.get(user_id)
    }

    /// Run one scan: expand ranges, pair compatible entries, purge stale
    /// matched entries. Serialized by the reentrancy guard; a firing that
    /// overlaps a running scan is skipped rather than queued.
    pub async fn scan(&self) -> Result<ScanReport> {
        if self
            .scan_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Previous scan still running, skipping this firing");
            self.metrics.record_scan_skipped();
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
            stats.scans_skipped += 1;
            return Ok(ScanReport {
                skipped: true,
                ..ScanReport::default()
            });
        }

        let result = self.run_scan().await;
        self.scan_in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run_scan(&self) -> Result<ScanReport> {
        let started = std::time::Instant::now();
        let now = current_timestamp();
        let mut report = ScanReport::default();

        let mut entries = self.queue.list_searching(None)?;

        if entries.len() >= 2 {
            // Bring every entry's range up to date with its wait time
            for entry in entries.iter_mut() {
                let applied = pairing::apply_expansions(entry, now, &self.config);
                if applied > 0 {
                    if let Err(e) = self.queue.update(entry.clone()) {
                        warn!(
                            "Failed to persist range expansion for '{}': {}",
                            entry.user_id, e
                        );
                        continue;
                    }
                    report.expanded += 1;
                    self.metrics.record_range_expansions(applied as u64);
                    debug!(
                        "Widened range for '{}' to {}..{} after {} expansions",
                        entry.user_id,
                        entry.rating_range.min,
                        entry.rating_range.max,
                        entry.expansions_applied
                    );
                }
            }

            // Pair and commit. A failed commit leaves both entries
            // searching; they are retried on the next scan.
            for (first, second) in pairing::pair_entries(&entries) {
                match self.commit_pair(&first, &second).await {
                    Ok(session) => {
                        report.paired += 1;
                        debug!(
                            "Scan paired '{}' and '{}' into session {}",
                            first.user_id, second.user_id, session.id
                        );
                    }
                    Err(e) => {
                        warn!(
                            "Failed to commit pair '{}' vs '{}': {}",
                            first.user_id, second.user_id, e
                        );
                    }
                }
            }
        }

        // Matched entries past their grace window are no longer needed
        // by status polls
        let cutoff = now
            - chrono::Duration::from_std(self.config.matched_grace).unwrap_or_else(|_| {
                chrono::Duration::seconds(300)
            });
        report.purged = self.queue.purge_matched(cutoff)?;

        let searching = self.queue.searching_count()?;
        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
            stats.scans_completed += 1;
            stats.entries_purged += report.purged as u64;
            stats.players_searching = searching;
        }

        self.metrics.record_scan(started.elapsed(), report.paired);
        if report.purged > 0 {
            self.metrics.record_entries_purged(report.purged as u64);
            debug!("Purged {} matched queue entries", report.purged);
        }

        Ok(report)
    }

    /// Commit one pair: create the session, atomically flip both queue
    /// entries, and notify both players. Creation and the entry flip form
    /// one logical unit; if the flip fails (a player left since the scan
    /// loaded its snapshot) the never-visible session is discarded and
    /// both entries stay searching.
    async fn commit_pair(
        &self,
        first: &QueueEntry,
        second: &QueueEntry,
    ) -> Result<BattleSession> {
        let session = BattleSession::new(
            first.game_mode,
            BattleKind::Ranked,
            Participant::new(
                first.user_id.clone(),
                first.username.clone(),
                first.current_rating,
            ),
            Participant::new(
                second.user_id.clone(),
                second.username.clone(),
                second.current_rating,
            ),
        );

        self.sessions.insert(session.clone())?;

        let matched_at = current_timestamp();
        if let Err(e) =
            self.queue
                .mark_matched_pair(&first.user_id, &second.user_id, session.id, matched_at)
        {
            if let Err(discard_err) = self.sessions.discard(session.id) {
                error!(
                    "Failed to discard session {} after pair commit failure: {}",
                    session.id, discard_err
                );
            }
            return Err(e);
        }

        {
            let mut stats = self
                .stats
                .write()
                .map_err(|_| MatchmakingError::InternalError {
                    message: "Failed to acquire stats lock".to_string(),
                })?;
            stats.pairs_created += 1;
            stats.players_matched += 2;
        }

        let now = current_timestamp();
        for entry in [first, second] {
            self.metrics.record_pair_created(
                entry.game_mode,
                entry.wait_time(now).num_milliseconds().max(0) as f64 / 1000.0,
            );
        }

        info!(
            "Matched '{}' ({}) vs '{}' ({}) in {} battle, session {}",
            first.user_id,
            first.current_rating,
            second.user_id,
            second.current_rating,
            session.game_mode,
            session.id
        );

        // Notify both players; delivery failures never unwind the pair
        for (entry, opponent) in [(first, second), (second, first)] {
            let event = MatchFound {
                user_id: entry.user_id.clone(),
                session_id: session.id,
                game_mode: session.game_mode,
                opponent_username: opponent.username.clone(),
                opponent_rating: opponent.current_rating,
                timestamp: now,
            };
            if let Err(e) = self.event_publisher.publish_match_found(event).await {
                warn!(
                    "Failed to publish match-found for '{}': {}",
                    entry.user_id, e
                );
            }
        }

        Ok(session)
    }

    /// Start the periodic scan task. Scan errors are logged and never
    /// kill the timer; the service keeps scanning indefinitely.
    pub fn start_scan_task(self: Arc<Self>) -> Result<()> {
        let scanner = Arc::clone(&self);

        tokio::spawn(async move {
            let mut scan_interval = interval(scanner.config.scan_interval);

            loop {
                scan_interval.tick().await;

                if let Err(e) = scanner.scan().await {
                    error!("Error during matchmaking scan: {}", e);
                }
            }
        });

        info!(
            "Started matchmaking scan task ({:?} interval)",
            self.config.scan_interval
        );
        Ok(())
    }

    /// Get current scanner statistics
    pub async fn get_stats(&self) -> Result<ScannerStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?
            .clone();

        stats.players_searching = self.queue.searching_count()?;
        Ok(stats)
    }
}
