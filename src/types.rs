//! Common types used throughout the matchmaking service

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type UserId = String;

/// Unique identifier for battle sessions
pub type SessionId = Uuid;

/// Supported battle durations, each with an independent rating ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Sprint,
    Standard,
    Marathon,
}

impl GameMode {
    /// All supported modes, in display order
    pub const ALL: [GameMode; 3] = [GameMode::Sprint, GameMode::Standard, GameMode::Marathon];

    /// How long a battle in this mode runs before its window elapses
    pub fn battle_duration(&self) -> Duration {
        match self {
            GameMode::Sprint => Duration::minutes(15),
            GameMode::Standard => Duration::hours(1),
            GameMode::Marathon => Duration::hours(24),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Sprint => "sprint",
            GameMode::Standard => "standard",
            GameMode::Marathon => "marathon",
        }
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GameMode {
    type Err = crate::error::MatchmakingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sprint" => Ok(GameMode::Sprint),
            "standard" => Ok(GameMode::Standard),
            "marathon" => Ok(GameMode::Marathon),
            other => Err(crate::error::MatchmakingError::InvalidJoinRequest {
                reason: format!("Unknown game mode: {}", other),
            }),
        }
    }
}

/// Whether a battle affects ratings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleKind {
    /// Paired by the matchmaker, rating-affecting
    Ranked,
    /// Direct challenge, ratings untouched
    Friendly,
}

impl std::fmt::Display for BattleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BattleKind::Ranked => write!(f, "ranked"),
            BattleKind::Friendly => write!(f, "friendly"),
        }
    }
}

/// Outcome of a battle from one participant's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    /// Actual score used by the Elo formula
    pub fn score(&self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
            Outcome::Draw => 0.5,
        }
    }

    pub fn opposite(&self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

/// Acceptable opponent rating window for a queued player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRange {
    pub min: i32,
    pub max: i32,
}

impl RatingRange {
    /// Build a symmetric range around a rating snapshot
    pub fn around(rating: i32, half_width: i32) -> Self {
        Self {
            min: (rating - half_width).max(0),
            max: rating + half_width,
        }
    }

    pub fn contains(&self, rating: i32) -> bool {
        rating >= self.min && rating <= self.max
    }

    /// Widen both bounds symmetrically. The lower bound saturates at zero,
    /// so the width never shrinks but may stop growing downward.
    pub fn widen(&mut self, step: i32) {
        self.min = (self.min - step).max(0);
        self.max += step;
    }

    pub fn width(&self) -> i32 {
        self.max - self.min
    }
}

/// Search state of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Searching,
    Matched,
}

/// One waiting player in the matchmaking queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub user_id: UserId,
    /// Display-name snapshot taken at enqueue time
    pub username: String,
    pub game_mode: GameMode,
    /// Rating snapshot taken at enqueue time
    pub current_rating: i32,
    pub rating_range: RatingRange,
    pub search_start: DateTime<Utc>,
    pub expansions_applied: u32,
    pub status: QueueStatus,
    pub matched_session: Option<SessionId>,
    pub matched_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(
        user_id: UserId,
        username: String,
        game_mode: GameMode,
        current_rating: i32,
        initial_half_width: i32,
    ) -> Self {
        Self {
            user_id,
            username,
            game_mode,
            current_rating,
            rating_range: RatingRange::around(current_rating, initial_half_width),
            search_start: Utc::now(),
            expansions_applied: 0,
            status: QueueStatus::Searching,
            matched_session: None,
            matched_at: None,
        }
    }

    pub fn is_searching(&self) -> bool {
        self.status == QueueStatus::Searching
    }

    /// How long this entry has been waiting
    pub fn wait_time(&self, now: DateTime<Utc>) -> Duration {
        now - self.search_start
    }
}

/// Historical market-data window a battle is simulated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DataWindow {
    /// Fixed offsets: one year ago to thirty days ago. The window is a
    /// simulated trading period, not the battle's wall-clock lifetime.
    pub fn historical(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(365),
            end: now - Duration::days(30),
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One trade in a participant's append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub executed_at: DateTime<Utc>,
}

/// Final per-participant results, populated at completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResults {
    pub final_value: f64,
    pub return_pct: f64,
    pub trade_count: u32,
    pub max_drawdown_pct: f64,
}

/// One side of a battle session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub username: String,
    /// Rating snapshot at match time; Elo deltas are computed from this,
    /// never from an intermediate value
    pub starting_rating: i32,
    /// Populated exactly once, after a ranked battle completes
    pub rating_delta: Option<i32>,
    pub results: Option<BattleResults>,
    pub trades: Vec<TradeRecord>,
}

impl Participant {
    pub fn new(user_id: UserId, username: String, starting_rating: i32) -> Self {
        Self {
            user_id,
            username,
            starting_rating,
            rating_delta: None,
            results: None,
            trades: Vec::new(),
        }
    }
}

/// Battle lifecycle state; transitions are forward-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Ready,
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Ready, SessionStatus::InProgress)
                | (SessionStatus::Ready, SessionStatus::Completed)
                | (SessionStatus::InProgress, SessionStatus::Completed)
        )
    }
}

/// A head-to-head trading battle between two players
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSession {
    pub id: SessionId,
    pub game_mode: GameMode,
    pub kind: BattleKind,
    pub participants: [Participant; 2],
    pub data_window: DataWindow,
    pub created_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Set at completion; `None` while running, and on a drawn battle
    pub winner: Option<UserId>,
}

impl BattleSession {
    pub fn new(
        game_mode: GameMode,
        kind: BattleKind,
        first: Participant,
        second: Participant,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::utils::generate_session_id(),
            game_mode,
            kind,
            participants: [first, second],
            data_window: DataWindow::historical(now),
            created_at: now,
            ends_at: now + game_mode.battle_duration(),
            status: SessionStatus::Ready,
            winner: None,
        }
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn opponent_of(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id != user_id)
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Whether rating deltas have already been written for this battle
    pub fn deltas_applied(&self) -> bool {
        self.participants.iter().all(|p| p.rating_delta.is_some())
    }

    /// Outcome for one participant of a completed battle
    pub fn outcome_for(&self, user_id: &str) -> Option<Outcome> {
        if !self.is_completed() {
            return None;
        }
        Some(match &self.winner {
            None => Outcome::Draw,
            Some(winner) if winner == user_id => Outcome::Win,
            Some(_) => Outcome::Loss,
        })
    }
}

/// Event emitted to each participant when the matcher pairs them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFound {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub game_mode: GameMode,
    pub opponent_username: String,
    pub opponent_rating: i32,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a battle finishes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleCompleted {
    pub session_id: SessionId,
    pub game_mode: GameMode,
    pub winner: Option<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// Rating movement for one player after a ranked battle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingChange {
    pub user_id: UserId,
    pub old_rating: i32,
    pub new_rating: i32,
    pub delta: i32,
    pub outcome: Outcome,
}

/// Event emitted after both ratings for a ranked battle are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingsUpdated {
    pub session_id: SessionId,
    pub game_mode: GameMode,
    pub changes: Vec<RatingChange>,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all outbound events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArenaEvent {
    MatchFound(MatchFound),
    BattleCompleted(BattleCompleted),
    RatingsUpdated(RatingsUpdated),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_mode_roundtrip() {
        for mode in GameMode::ALL {
            let parsed: GameMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("blitz".parse::<GameMode>().is_err());
    }

    #[test]
    fn test_rating_range_contains_and_widen() {
        let mut range = RatingRange::around(1200, 100);
        assert_eq!(range.min, 1100);
        assert_eq!(range.max, 1300);
        assert!(range.contains(1100));
        assert!(range.contains(1300));
        assert!(!range.contains(1301));

        range.widen(50);
        assert_eq!(range.min, 1050);
        assert_eq!(range.max, 1350);
    }

    #[test]
    fn test_rating_range_floor_at_zero() {
        let mut range = RatingRange::around(30, 100);
        assert_eq!(range.min, 0);
        range.widen(50);
        assert_eq!(range.min, 0);
        assert_eq!(range.max, 180);
    }

    #[test]
    fn test_session_status_transitions() {
        assert!(SessionStatus::Ready.can_transition_to(SessionStatus::InProgress));
        assert!(SessionStatus::Ready.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::InProgress.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::InProgress));
        assert!(!SessionStatus::InProgress.can_transition_to(SessionStatus::Ready));
    }

    #[test]
    fn test_outcome_scores() {
        assert_eq!(Outcome::Win.score(), 1.0);
        assert_eq!(Outcome::Loss.score(), 0.0);
        assert_eq!(Outcome::Draw.score(), 0.5);
        assert_eq!(Outcome::Win.opposite(), Outcome::Loss);
        assert_eq!(Outcome::Draw.opposite(), Outcome::Draw);
    }

    #[test]
    fn test_session_outcome_for() {
        let a = Participant::new("alice".to_string(), "Alice".to_string(), 1200);
        let b = Participant::new("bob".to_string(), "Bob".to_string(), 1250);
        let mut session = BattleSession::new(GameMode::Standard, BattleKind::Ranked, a, b);

        // Not completed yet
        assert_eq!(session.outcome_for("alice"), None);

        session.status = SessionStatus::Completed;
        session.winner = Some("alice".to_string());
        assert_eq!(session.outcome_for("alice"), Some(Outcome::Win));
        assert_eq!(session.outcome_for("bob"), Some(Outcome::Loss));

        session.winner = None;
        assert_eq!(session.outcome_for("alice"), Some(Outcome::Draw));
    }

    #[test]
    fn test_data_window_offsets() {
        let now = Utc::now();
        let window = DataWindow::historical(now);
        assert_eq!(window.start, now - Duration::days(365));
        assert_eq!(window.end, now - Duration::days(30));
        assert!(window.start < window.end);
    }
}
