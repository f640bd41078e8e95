//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid join request: {reason}")]
    InvalidJoinRequest { reason: String },

    #[error("User already queued: {user_id}")]
    AlreadyQueued { user_id: String },

    #[error("User not in queue: {user_id}")]
    NotQueued { user_id: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session already completed: {session_id}")]
    SessionCompleted { session_id: String },

    #[error("Session not completed yet: {session_id}")]
    SessionNotCompleted { session_id: String },

    #[error("Queue entry no longer searching: {user_id}")]
    EntryNotSearching { user_id: String },

    #[error("Rating calculation failed: {reason}")]
    RatingCalculationFailed { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
