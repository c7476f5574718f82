//! Thread-safe token ledger — records turn costs, detects exhaustion,
//! forecasts breaches, and forks generations.

use crate::model::{SessionStats, TurnRecord};
use chrono::Utc;
use shardloom_core::checkpoint::ArchiveReason;
use shardloom_core::shard::ArchivePayload;
use shardloom_store::CheckpointVault;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{info, warn};

/// The core ledger. Thread-safe via `RwLock`; one instance is shared by
/// all callers within a session's lifecycle.
pub struct TokenLedger {
    sessions: RwLock<HashMap<String, SessionStats>>,
    default_budget: usize,
}

impl TokenLedger {
    /// Create a ledger with the given default session budget.
    pub fn new(default_budget: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_budget,
        }
    }

    /// The budget applied to sessions that don't specify their own.
    pub fn default_budget(&self) -> usize {
        self.default_budget
    }

    /// Start a session with the default budget. Idempotent.
    pub fn start_session(&self, id: &str) {
        self.start_session_with_budget(id, self.default_budget);
    }

    /// Start a session with an explicit budget. No-op if the session
    /// already exists.
    pub fn start_session_with_budget(&self, id: &str, budget: usize) {
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .entry(id.to_string())
            .or_insert_with(|| SessionStats::new(budget));
    }

    /// Record one turn's token cost. Lazily starts the session if absent.
    pub fn record_turn(&self, id: &str, turn_id: &str, tokens_in: usize, tokens_out: usize) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| SessionStats::new(self.default_budget));

        session.cumulative += tokens_in + tokens_out;
        session.entries.push(TurnRecord {
            turn_id: turn_id.to_string(),
            tokens_in,
            tokens_out,
            cumulative_after: session.cumulative,
            recorded_at: Utc::now(),
        });

        if !session.exhausted && session.cumulative >= session.budget {
            session.exhausted = true;
            warn!(
                session = %id,
                cumulative = session.cumulative,
                budget = session.budget,
                "Session budget exhausted"
            );
        }
    }

    /// Tokens still available: `max(0, budget - cumulative)`. An unknown
    /// session is treated as "full budget", not an error.
    pub fn get_remaining(&self, id: &str) -> usize {
        self.sessions
            .read()
            .unwrap()
            .get(id)
            .map_or(self.default_budget, SessionStats::remaining)
    }

    /// Pure forecast: would spending `estimated_additional_tokens` more
    /// cross the budget? False for unknown sessions. Mutates nothing.
    pub fn predict_exhaustion(&self, id: &str, estimated_additional_tokens: usize) -> bool {
        self.sessions
            .read()
            .unwrap()
            .get(id)
            .is_some_and(|s| s.cumulative + estimated_additional_tokens >= s.budget)
    }

    /// Fork a session: archive the current generation's entries to the
    /// vault, then reset the accounting in place (entries cleared,
    /// cumulative zeroed, exhaustion cleared, generation incremented).
    ///
    /// Returns the new checkpoint's id, or `None` for unknown sessions.
    pub fn fork_session(&self, id: &str, vault: &CheckpointVault) -> Option<String> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(id)?;

        let serialized =
            serde_json::to_string(&session.entries).unwrap_or_else(|_| "[]".to_string());
        let payload = ArchivePayload::new(
            format!("{id}-gen{}", session.generation),
            serialized,
        );
        let summary = format!(
            "Archived generation {} of session {}: {} turns, {} tokens spent of {}",
            session.generation,
            id,
            session.entries.len(),
            session.cumulative,
            session.budget,
        );
        let checkpoint = vault.create(&payload, summary, 3, ArchiveReason::GenerationFork);

        info!(
            session = %id,
            generation = session.generation,
            checkpoint = %checkpoint.id,
            "Session forked"
        );

        session.entries.clear();
        session.cumulative = 0;
        session.exhausted = false;
        session.generation += 1;

        Some(checkpoint.id)
    }

    /// Snapshot of a session's state, or `None` if unknown.
    pub fn get_session_stats(&self, id: &str) -> Option<SessionStats> {
        self.sessions.read().unwrap().get(id).cloned()
    }
}
