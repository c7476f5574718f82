//! Data model for session accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded turn: input and output token cost plus the running total
/// after this turn was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Caller-supplied turn identifier.
    pub turn_id: String,
    /// Tokens sent to the model.
    pub tokens_in: usize,
    /// Tokens produced by the model.
    pub tokens_out: usize,
    /// Cumulative session spend after this turn.
    pub cumulative_after: usize,
    /// When the turn was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// The full accounting state of one session.
///
/// `cumulative` is monotonically non-decreasing within a generation;
/// `exhausted` is sticky once set and only cleared by forking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Token ceiling, fixed at session start.
    pub budget: usize,
    /// Sum of all recorded turn costs in this generation.
    pub cumulative: usize,
    /// Ordered turn records for this generation.
    pub entries: Vec<TurnRecord>,
    /// True once `cumulative >= budget`.
    pub exhausted: bool,
    /// Accounting epoch, starts at 1, incremented on fork.
    pub generation: u32,
    /// When the session was first seen.
    pub started_at: DateTime<Utc>,
}

impl SessionStats {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            budget,
            cumulative: 0,
            entries: Vec::new(),
            exhausted: false,
            generation: 1,
            started_at: Utc::now(),
        }
    }

    /// Tokens still available: `max(0, budget - cumulative)`.
    pub fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.cumulative)
    }
}
