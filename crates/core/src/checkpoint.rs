//! Checkpoint — an immutable archival record with lineage.
//!
//! A checkpoint links a compressed or evicted piece of text back to its
//! original shard via `parent_id` and a deterministic content fingerprint.
//! Checkpoints are write-once: no update or delete operation exists
//! anywhere in the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a checkpoint was created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveReason {
    /// Evicted because no budget remained for the fragment.
    NoSpace,
    /// Compression lost too much meaning to trust.
    FidelityDrift,
    /// A ledger generation archived during a session fork.
    GenerationFork,
}

impl std::fmt::Display for ArchiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpace => write!(f, "no_space"),
            Self::FidelityDrift => write!(f, "fidelity_drift"),
            Self::GenerationFork => write!(f, "generation_fork"),
        }
    }
}

/// An immutable archival record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Freshly generated unique ID.
    pub id: String,

    /// ID of the shard (or synthetic payload) this checkpoint derives from.
    pub parent_id: String,

    /// The compressed or empty text stored in place of the original.
    pub summary: String,

    /// Compression level applied (0–3).
    pub level: u8,

    /// Why this checkpoint was created.
    pub reason: ArchiveReason,

    /// Deterministic fingerprint of the original text, for audit display.
    pub original_hash: String,

    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_display_matches_serde() {
        for reason in [
            ArchiveReason::NoSpace,
            ArchiveReason::FidelityDrift,
            ArchiveReason::GenerationFork,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json.trim_matches('"'), reason.to_string());
        }
    }

    #[test]
    fn checkpoint_serialization_round_trip() {
        let cp = Checkpoint {
            id: "cp-1".into(),
            parent_id: "shard-1".into(),
            summary: "a short summary".into(),
            level: 2,
            reason: ArchiveReason::FidelityDrift,
            original_hash: "deadbeefdeadbeef".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.parent_id, "shard-1");
        assert_eq!(back.level, 2);
        assert_eq!(back.reason, ArchiveReason::FidelityDrift);
    }
}
