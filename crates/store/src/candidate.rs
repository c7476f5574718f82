//! Candidate store — per-session collections of scoreable shards.
//!
//! Append-only within a session: no deduplication, no ordering guarantee
//! beyond insertion order, no persistence beyond process lifetime. Reads
//! on unknown sessions return an empty list, never an error.

use shardloom_core::Shard;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Per-session shard lists behind a read/write lock.
pub struct CandidateStore {
    sessions: RwLock<HashMap<String, Vec<Shard>>>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Append a shard to a session's list, creating the list if absent.
    pub fn add_shard(&self, session_id: &str, shard: Shard) {
        let mut sessions = self.sessions.write().unwrap();
        let list = sessions.entry(session_id.to_string()).or_default();
        debug!(session = %session_id, shard = %shard.id, tokens = shard.tokens, "Shard added");
        list.push(shard);
    }

    /// All shards for a session in insertion order. Empty for unknown
    /// sessions.
    pub fn retrieve_candidates(&self, session_id: &str) -> Vec<Shard> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Delete a session's list entirely.
    pub fn clear_session(&self, session_id: &str) {
        let removed = self.sessions.write().unwrap().remove(session_id);
        if let Some(list) = removed {
            debug!(session = %session_id, shards = list.len(), "Session cleared");
        }
    }

    /// Number of sessions with at least one stored shard.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Number of shards stored for a session.
    pub fn shard_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .map_or(0, Vec::len)
    }
}

impl Default for CandidateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(text: &str) -> Shard {
        Shard::new(text, vec![0.0; 4], false)
    }

    #[test]
    fn add_and_retrieve_in_insertion_order() {
        let store = CandidateStore::new();
        store.add_shard("s1", shard("first"));
        store.add_shard("s1", shard("second"));
        store.add_shard("s1", shard("third"));

        let candidates = store.retrieve_candidates("s1");
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].raw_text, "first");
        assert_eq!(candidates[2].raw_text, "third");
    }

    #[test]
    fn unknown_session_is_empty_not_error() {
        let store = CandidateStore::new();
        assert!(store.retrieve_candidates("never-seen").is_empty());
        assert_eq!(store.shard_count("never-seen"), 0);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = CandidateStore::new();
        store.add_shard("a", shard("for a"));
        store.add_shard("b", shard("for b"));

        assert_eq!(store.retrieve_candidates("a").len(), 1);
        assert_eq!(store.retrieve_candidates("b").len(), 1);
        assert_eq!(store.session_count(), 2);
    }

    #[test]
    fn clear_session_removes_list() {
        let store = CandidateStore::new();
        store.add_shard("s1", shard("one"));
        store.add_shard("s1", shard("two"));
        assert_eq!(store.shard_count("s1"), 2);

        store.clear_session("s1");
        assert!(store.retrieve_candidates("s1").is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn duplicates_are_kept() {
        let store = CandidateStore::new();
        store.add_shard("s1", shard("same text"));
        store.add_shard("s1", shard("same text"));
        assert_eq!(store.shard_count("s1"), 2);
    }
}
