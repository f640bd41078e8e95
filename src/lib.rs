//! Trade Arena - Matchmaking and rating microservice for trading battles
//!
//! This crate pairs queued players into head-to-head trading battles by
//! skill rating, widening each player's acceptable opponent range the
//! longer they wait, and applies Elo rating updates when battles complete.

pub mod amqp;
pub mod config;
pub mod error;
pub mod http;
pub mod matcher;
pub mod metrics;
pub mod queue;
pub mod rating;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use matcher::{MatchScanner, MatcherConfig};
pub use rating::RatingUpdater;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
