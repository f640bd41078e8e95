//! Queue storage interface and implementations
//!
//! The queue holds one entry per player currently searching for a match.
//! Matched entries linger until the grace window elapses so that late
//! status polls still observe the match.

use crate::error::MatchmakingError;
use crate::types::{GameMode, QueueEntry, QueueStatus, SessionId, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Trait for queue storage operations
pub trait QueueStore: Send + Sync {
    /// Add a new searching entry. Fails with `AlreadyQueued` if the user
    /// already has a searching entry.
    fn enqueue(&self, entry: QueueEntry) -> crate::error::Result<QueueEntry>;

    /// Remove a user's entry entirely. Returns whether an entry existed.
    fn dequeue(&self, user_id: &str) -> crate::error::Result<bool>;

    /// Get a user's entry, searching or matched
    fn get(&self, user_id: &str) -> crate::error::Result<Option<QueueEntry>>;

    /// All searching entries, oldest `search_start` first. Optionally
    /// restricted to one game mode.
    fn list_searching(&self, mode: Option<GameMode>) -> crate::error::Result<Vec<QueueEntry>>;

    /// Persist an updated entry (range expansion)
    fn update(&self, entry: QueueEntry) -> crate::error::Result<()>;

    /// Atomically flip two entries from searching to matched, pointing
    /// both at the given session. Fails with `EntryNotSearching` if either
    /// entry is missing or no longer searching, in which case neither
    /// entry is modified.
    fn mark_matched_pair(
        &self,
        first: &str,
        second: &str,
        session_id: SessionId,
        matched_at: DateTime<Utc>,
    ) -> crate::error::Result<()>;

    /// Remove matched entries whose `matched_at` is before the cutoff.
    /// Returns the number of entries removed.
    fn purge_matched(&self, cutoff: DateTime<Utc>) -> crate::error::Result<usize>;

    /// Number of entries currently searching
    fn searching_count(&self) -> crate::error::Result<usize>;
}

/// In-memory queue store implementation
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    entries: RwLock<HashMap<UserId, QueueEntry>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn enqueue(&self, entry: QueueEntry) -> crate::error::Result<QueueEntry> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue write lock".to_string(),
            })?;

        if let Some(existing) = entries.get(&entry.user_id) {
            if existing.is_searching() {
                return Err(MatchmakingError::AlreadyQueued {
                    user_id: entry.user_id.clone(),
                }
                .into());
            }
        }

        entries.insert(entry.user_id.clone(), entry.clone());
        Ok(entry)
    }

    fn dequeue(&self, user_id: &str) -> crate::error::Result<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue write lock".to_string(),
            })?;

        Ok(entries.remove(user_id).is_some())
    }

    fn get(&self, user_id: &str) -> crate::error::Result<Option<QueueEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue read lock".to_string(),
            })?;

        Ok(entries.get(user_id).cloned())
    }

    fn list_searching(&self, mode: Option<GameMode>) -> crate::error::Result<Vec<QueueEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue read lock".to_string(),
            })?;

        let mut searching: Vec<QueueEntry> = entries
            .values()
            .filter(|entry| entry.is_searching())
            .filter(|entry| mode.map_or(true, |m| entry.game_mode == m))
            .cloned()
            .collect();

        // Oldest searchers first, for FIFO fairness
        searching.sort_by_key(|entry| entry.search_start);

        Ok(searching)
    }

    fn update(&self, entry: QueueEntry) -> crate::error::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue write lock".to_string(),
            })?;

        entries.insert(entry.user_id.clone(), entry);
        Ok(())
    }

    fn mark_matched_pair(
        &self,
        first: &str,
        second: &str,
        session_id: SessionId,
        matched_at: DateTime<Utc>,
    ) -> crate::error::Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue write lock".to_string(),
            })?;

        // Re-validate both sides before touching either: a leave request
        // may have landed since the scan loaded its snapshot.
        for user_id in [first, second] {
            match entries.get(user_id) {
                Some(entry) if entry.is_searching() => {}
                _ => {
                    return Err(MatchmakingError::EntryNotSearching {
                        user_id: user_id.to_string(),
                    }
                    .into());
                }
            }
        }

        for user_id in [first, second] {
            let entry = entries.get_mut(user_id).expect("validated above");
            entry.status = QueueStatus::Matched;
            entry.matched_session = Some(session_id);
            entry.matched_at = Some(matched_at);
        }

        Ok(())
    }

    fn purge_matched(&self, cutoff: DateTime<Utc>) -> crate::error::Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue write lock".to_string(),
            })?;

        let before = entries.len();
        entries.retain(|_, entry| match (entry.status, entry.matched_at) {
            (QueueStatus::Matched, Some(at)) => at >= cutoff,
            _ => true,
        });

        Ok(before - entries.len())
    }

    fn searching_count(&self) -> crate::error::Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue read lock".to_string(),
            })?;

        Ok(entries.values().filter(|e| e.is_searching()).count())
    }
}

/// Mock queue store for testing that records mutation calls
#[derive(Debug, Default)]
pub struct MockQueueStore {
    inner: InMemoryQueueStore,
    enqueue_calls: RwLock<Vec<UserId>>,
    dequeue_calls: RwLock<Vec<UserId>>,
}

impl MockQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// User IDs passed to enqueue (for testing)
    pub fn enqueued_users(&self) -> Vec<UserId> {
        self.enqueue_calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// User IDs passed to dequeue (for testing)
    pub fn dequeued_users(&self) -> Vec<UserId> {
        self.dequeue_calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl QueueStore for MockQueueStore {
    fn enqueue(&self, entry: QueueEntry) -> crate::error::Result<QueueEntry> {
        if let Ok(mut calls) = self.enqueue_calls.write() {
            calls.push(entry.user_id.clone());
        }
        self.inner.enqueue(entry)
    }

    fn dequeue(&self, user_id: &str) -> crate::error::Result<bool> {
        if let Ok(mut calls) = self.dequeue_calls.write() {
            calls.push(user_id.to_string());
        }
        self.inner.dequeue(user_id)
    }

    fn get(&self, user_id: &str) -> crate::error::Result<Option<QueueEntry>> {
        self.inner.get(user_id)
    }

    fn list_searching(&self, mode: Option<GameMode>) -> crate::error::Result<Vec<QueueEntry>> {
        self.inner.list_searching(mode)
    }

    fn update(&self, entry: QueueEntry) -> crate::error::Result<()> {
        self.inner.update(entry)
    }

    fn mark_matched_pair(
        &self,
        first: &str,
        second: &str,
        session_id: SessionId,
        matched_at: DateTime<Utc>,
    ) -> crate::error::Result<()> {
        self.inner
            .mark_matched_pair(first, second, session_id, matched_at)
    }

    fn purge_matched(&self, cutoff: DateTime<Utc>) -> crate::error::Result<usize> {
        self.inner.purge_matched(cutoff)
    }

    fn searching_count(&self) -> crate::error::Result<usize> {
        self.inner.searching_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameMode;
    use crate::utils::generate_session_id;
    use chrono::Duration;

    fn entry(user_id: &str, rating: i32) -> QueueEntry {
        QueueEntry::new(
            user_id.to_string(),
            format!("user-{}", user_id),
            GameMode::Standard,
            rating,
            100,
        )
    }

    #[test]
    fn test_enqueue_and_get() {
        let store = InMemoryQueueStore::new();

        assert!(store.get("alice").unwrap().is_none());
        store.enqueue(entry("alice", 1200)).unwrap();

        let stored = store.get("alice").unwrap().unwrap();
        assert_eq!(stored.current_rating, 1200);
        assert!(stored.is_searching());
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let store = InMemoryQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();

        let err = store.enqueue(entry("alice", 1200)).unwrap_err();
        let err = err.downcast_ref::<MatchmakingError>().unwrap();
        assert!(matches!(err, MatchmakingError::AlreadyQueued { .. }));
    }

    #[test]
    fn test_reenqueue_allowed_after_match() {
        let store = InMemoryQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();
        store.enqueue(entry("bob", 1210)).unwrap();
        store
            .mark_matched_pair("alice", "bob", generate_session_id(), Utc::now())
            .unwrap();

        // A matched entry does not block a fresh search
        assert!(store.enqueue(entry("alice", 1216)).is_ok());
    }

    #[test]
    fn test_list_searching_fifo_order() {
        let store = InMemoryQueueStore::new();

        let mut first = entry("alice", 1200);
        first.search_start = Utc::now() - Duration::seconds(30);
        let mut second = entry("bob", 1210);
        second.search_start = Utc::now() - Duration::seconds(20);
        let mut third = entry("carol", 1190);
        third.search_start = Utc::now() - Duration::seconds(10);

        // Insert out of order
        store.enqueue(third).unwrap();
        store.enqueue(first).unwrap();
        store.enqueue(second).unwrap();

        let searching = store.list_searching(None).unwrap();
        let ids: Vec<&str> = searching.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_list_searching_mode_filter() {
        let store = InMemoryQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();

        let mut sprint = entry("bob", 1210);
        sprint.game_mode = GameMode::Sprint;
        store.enqueue(sprint).unwrap();

        let standard = store.list_searching(Some(GameMode::Standard)).unwrap();
        assert_eq!(standard.len(), 1);
        assert_eq!(standard[0].user_id, "alice");
    }

    #[test]
    fn test_mark_matched_pair() {
        let store = InMemoryQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();
        store.enqueue(entry("bob", 1210)).unwrap();

        let session_id = generate_session_id();
        store
            .mark_matched_pair("alice", "bob", session_id, Utc::now())
            .unwrap();

        for user in ["alice", "bob"] {
            let stored = store.get(user).unwrap().unwrap();
            assert_eq!(stored.status, QueueStatus::Matched);
            assert_eq!(stored.matched_session, Some(session_id));
        }
        assert_eq!(store.searching_count().unwrap(), 0);
    }

    #[test]
    fn test_mark_matched_pair_revalidates_both_sides() {
        let store = InMemoryQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();
        store.enqueue(entry("bob", 1210)).unwrap();

        // Bob leaves between the scan snapshot and the commit
        store.dequeue("bob").unwrap();

        let result = store.mark_matched_pair("alice", "bob", generate_session_id(), Utc::now());
        assert!(result.is_err());

        // Alice must be untouched and still searching
        let alice = store.get("alice").unwrap().unwrap();
        assert!(alice.is_searching());
        assert!(alice.matched_session.is_none());
    }

    #[test]
    fn test_purge_matched_respects_grace() {
        let store = InMemoryQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();
        store.enqueue(entry("bob", 1210)).unwrap();
        store.enqueue(entry("carol", 1250)).unwrap();

        let matched_at = Utc::now() - Duration::minutes(10);
        store
            .mark_matched_pair("alice", "bob", generate_session_id(), matched_at)
            .unwrap();

        // Cutoff five minutes ago: the ten-minute-old match is purged,
        // the still-searching entry is kept
        let purged = store.purge_matched(Utc::now() - Duration::minutes(5)).unwrap();
        assert_eq!(purged, 2);
        assert!(store.get("alice").unwrap().is_none());
        assert!(store.get("carol").unwrap().is_some());
    }

    #[test]
    fn test_dequeue() {
        let store = InMemoryQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();

        assert!(store.dequeue("alice").unwrap());
        assert!(!store.dequeue("alice").unwrap());
        assert!(store.get("alice").unwrap().is_none());
    }

    #[test]
    fn test_mock_records_calls() {
        let store = MockQueueStore::new();
        store.enqueue(entry("alice", 1200)).unwrap();
        store.dequeue("alice").unwrap();

        assert_eq!(store.enqueued_users(), vec!["alice".to_string()]);
        assert_eq!(store.dequeued_users(), vec!["alice".to_string()]);
    }
}
