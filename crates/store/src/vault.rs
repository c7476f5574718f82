//! Checkpoint vault — write-once archive with content fingerprints.
//!
//! Every checkpoint links back to the fragment (or synthetic payload) it
//! derives from, carries the reason it was archived, and fingerprints the
//! original text so an audit surface can show lineage. Cryptographic
//! strength is not a goal of the fingerprint; reproducibility is.

use chrono::Utc;
use shardloom_core::checkpoint::{ArchiveReason, Checkpoint};
use shardloom_core::shard::Archivable;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Deterministic short fingerprint of a text: seahash folded to 16 hex
/// characters. Same input always yields the same output.
pub fn fingerprint(text: &str) -> String {
    format!("{:016x}", seahash::hash(text.as_bytes()))
}

/// Append-only, content-addressed checkpoint archive.
pub struct CheckpointVault {
    checkpoints: RwLock<Vec<Checkpoint>>,
}

impl CheckpointVault {
    pub fn new() -> Self {
        Self {
            checkpoints: RwLock::new(Vec::new()),
        }
    }

    /// Archive a fragment-like source. Accepts real shards and synthetic
    /// payloads alike; returns the stored checkpoint.
    pub fn create(
        &self,
        source: &dyn Archivable,
        summary: impl Into<String>,
        level: u8,
        reason: ArchiveReason,
    ) -> Checkpoint {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4().to_string(),
            parent_id: source.id().to_string(),
            summary: summary.into(),
            level: level.min(3),
            reason,
            original_hash: fingerprint(source.raw_text()),
            created_at: Utc::now(),
        };

        debug!(
            checkpoint = %checkpoint.id,
            parent = %checkpoint.parent_id,
            level = checkpoint.level,
            reason = %checkpoint.reason,
            "Checkpoint created"
        );

        self.checkpoints.write().unwrap().push(checkpoint.clone());
        checkpoint
    }

    /// Look up a checkpoint by id. Never errors.
    pub fn retrieve(&self, id: &str) -> Option<Checkpoint> {
        self.checkpoints
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Every checkpoint, newest first.
    pub fn get_all(&self) -> Vec<Checkpoint> {
        self.checkpoints.read().unwrap().iter().rev().cloned().collect()
    }

    /// Total number of stored checkpoints.
    pub fn count(&self) -> usize {
        self.checkpoints.read().unwrap().len()
    }
}

impl Default for CheckpointVault {
    fn default() -> Self {
        Self::new()
    }
}
