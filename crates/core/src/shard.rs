//! Shard — one scoreable unit of conversation history.
//!
//! A shard is created by the caller after every request/response pair and
//! appended to the candidate store. Once created, its `raw_text`,
//! `intent_vector`, and `tokens` never change: compression produces new
//! derived text, not a mutation of the shard.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::token::estimate_tokens;

/// A single ranked unit of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shard {
    /// Unique ID for this shard.
    pub id: String,

    /// The original text content. Never mutated.
    pub raw_text: String,

    /// Fixed-length embedding of `raw_text`, produced at creation time.
    /// A zero vector of the service dimensionality when embedding failed.
    #[serde(default)]
    pub intent_vector: Vec<f32>,

    /// Estimated token cost of `raw_text` (whitespace tokens, min 1).
    pub tokens: usize,

    /// Seconds since epoch when the shard was created.
    pub timestamp: i64,

    /// How many other shards causally depend on this one.
    #[serde(default)]
    pub dependency_count: u32,

    /// True if the shard originated from the human participant.
    #[serde(default)]
    pub user_flag: bool,
}

impl Shard {
    /// Create a shard with a fresh ID, the current time, and a whitespace
    /// token estimate of `raw_text`.
    pub fn new(raw_text: impl Into<String>, intent_vector: Vec<f32>, user_flag: bool) -> Self {
        let raw_text = raw_text.into();
        let tokens = estimate_tokens(&raw_text);
        Self {
            id: Uuid::new_v4().to_string(),
            raw_text,
            intent_vector,
            tokens,
            timestamp: Utc::now().timestamp(),
            dependency_count: 0,
            user_flag,
        }
    }

    /// Same as [`Shard::new`] with a caller-supplied dependency count,
    /// for replayed history where the dependency graph is already known.
    pub fn with_dependencies(
        raw_text: impl Into<String>,
        intent_vector: Vec<f32>,
        user_flag: bool,
        dependency_count: u32,
    ) -> Self {
        let mut shard = Self::new(raw_text, intent_vector, user_flag);
        shard.dependency_count = dependency_count;
        shard
    }

    /// Age of the shard in seconds relative to `now` (epoch seconds).
    /// Clamped to a minimum of 1.
    pub fn age_seconds(&self, now: i64) -> i64 {
        (now - self.timestamp).max(1)
    }
}

/// The narrow structural seam accepted by the checkpoint vault.
///
/// Both real shards and synthetic archival payloads (e.g. a ledger
/// generation) satisfy it, so the vault never needs to distinguish them.
pub trait Archivable {
    fn id(&self) -> &str;
    fn raw_text(&self) -> &str;
}

impl Archivable for Shard {
    fn id(&self) -> &str {
        &self.id
    }

    fn raw_text(&self) -> &str {
        &self.raw_text
    }
}

/// A synthetic archival payload for non-shard data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivePayload {
    pub id: String,
    pub raw_text: String,
}

impl ArchivePayload {
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
        }
    }
}

impl Archivable for ArchivePayload {
    fn id(&self) -> &str {
        &self.id
    }

    fn raw_text(&self) -> &str {
        &self.raw_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_shard_estimates_tokens() {
        let shard = Shard::new("three word sentence", vec![0.1, 0.2], true);
        assert_eq!(shard.tokens, 3);
        assert!(!shard.id.is_empty());
        assert!(shard.user_flag);
        assert_eq!(shard.dependency_count, 0);
    }

    #[test]
    fn with_dependencies_sets_count() {
        let shard = Shard::with_dependencies("hello", vec![], false, 7);
        assert_eq!(shard.dependency_count, 7);
    }

    #[test]
    fn age_is_clamped_to_one() {
        let shard = Shard::new("x", vec![], false);
        // "now" equal to (or before) creation still yields age 1
        assert_eq!(shard.age_seconds(shard.timestamp), 1);
        assert_eq!(shard.age_seconds(shard.timestamp - 100), 1);
        assert_eq!(shard.age_seconds(shard.timestamp + 50), 50);
    }

    #[test]
    fn shard_serialization_round_trip() {
        let shard = Shard::new("the quick brown fox", vec![1.0, 0.0], true);
        let json = serde_json::to_string(&shard).unwrap();
        let back: Shard = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, shard.id);
        assert_eq!(back.raw_text, shard.raw_text);
        assert_eq!(back.tokens, 4);
    }

    #[test]
    fn archivable_accepts_both_shapes() {
        fn fingerprint_source(a: &dyn Archivable) -> String {
            format!("{}:{}", a.id(), a.raw_text())
        }

        let shard = Shard::new("real shard", vec![], false);
        let payload = ArchivePayload::new("session-gen1", "archived entries");
        assert!(fingerprint_source(&shard).contains("real shard"));
        assert_eq!(fingerprint_source(&payload), "session-gen1:archived entries");
    }
}
