//! Utility functions for the matchmaking service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique battle session ID
pub fn generate_session_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: i32, rating2: i32) -> i32 {
    (rating1 - rating2).abs()
}

/// Check if two ratings are within the given tolerance
pub fn ratings_within_tolerance(rating1: i32, rating2: i32, tolerance: i32) -> bool {
    rating_difference(rating1, rating2) <= tolerance
}
