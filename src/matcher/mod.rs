//! Matchmaking core
//!
//! This module contains the pairing algorithm (range expansion, mutual
//! compatibility, FIFO-fair greedy pairing) and the scanner that drives it
//! on a timer against the queue and session stores.

pub mod pairing;
pub mod scanner;

// Re-export commonly used types
pub use pairing::MatcherConfig;
pub use scanner::{JoinOutcome, MatchScanner, ScanReport, ScannerStats};
