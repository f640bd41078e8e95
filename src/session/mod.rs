//! Battle session storage
//!
//! Sessions are the persisted record of a head-to-head battle: the two
//! participants, the simulated trading window, trade logs and final
//! results. Completed sessions are immutable history and never deleted.

pub mod store;

// Re-export commonly used types
pub use store::{decide_winner, InMemorySessionStore, SessionStore};
