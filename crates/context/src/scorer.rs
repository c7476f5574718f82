//! Priority scorer — weighted multi-factor ranking of shards.
//!
//! Scoring is a pure function of the shard, the current request's
//! embedding, and wall-clock "now" (via recency). No hidden state, no
//! side effects.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shardloom_config::ScorerConfig;
use shardloom_core::Shard;

use crate::vector::cosine_similarity;

/// Dependency counts at or above this saturate the dependency factor.
const DEPENDENCY_SATURATION: f32 = 5.0;

/// Weights for the four ranking factors. Not required to sum to 1; the
/// final score is clamped to [0, 1] regardless.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub intent: f32,
    pub recency: f32,
    pub dependency: f32,
    pub user: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            intent: 0.5,
            recency: 0.2,
            dependency: 0.2,
            user: 0.1,
        }
    }
}

/// Ranks shards against the current request's semantic vector.
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    weights: ScoreWeights,
    relevance_threshold: f32,
}

impl PriorityScorer {
    /// Create a scorer with explicit weights and relevance threshold.
    pub fn new(weights: ScoreWeights, relevance_threshold: f32) -> Self {
        Self {
            weights,
            relevance_threshold,
        }
    }

    /// Build a scorer from a [`ScorerConfig`] section.
    pub fn from_config(config: &ScorerConfig) -> Self {
        Self::new(
            ScoreWeights {
                intent: config.intent_weight,
                recency: config.recency_weight,
                dependency: config.dependency_weight,
                user: config.user_weight,
            },
            config.relevance_threshold,
        )
    }

    /// The raw-cosine cliff below which intent contributes nothing.
    pub fn relevance_threshold(&self) -> f32 {
        self.relevance_threshold
    }

    /// Score a shard against the current embedding, in [0, 1].
    pub fn score(&self, shard: &Shard, current_embedding: &[f32]) -> f32 {
        self.score_at(shard, current_embedding, Utc::now().timestamp())
    }

    /// Score with an explicit "now" (epoch seconds), for deterministic
    /// evaluation and tests.
    pub fn score_at(&self, shard: &Shard, current_embedding: &[f32], now: i64) -> f32 {
        let cosine = cosine_similarity(&shard.intent_vector, current_embedding);

        // Hard cliff: below the relevance threshold the intent term is
        // exactly zero, no partial credit.
        let intent = if cosine < self.relevance_threshold {
            0.0
        } else {
            (cosine + 1.0) / 2.0
        };

        let age = shard.age_seconds(now) as f32;
        let recency = 1.0 / (1.0 + (age + 1.0).ln());

        let dependency = (shard.dependency_count as f32 / DEPENDENCY_SATURATION).min(1.0);

        let user = if shard.user_flag { 1.0 } else { 0.0 };

        let score = self.weights.intent * intent
            + self.weights.recency * recency
            + self.weights.dependency * dependency
            + self.weights.user * user;

        score.clamp(0.0, 1.0)
    }
}

impl Default for PriorityScorer {
    fn default() -> Self {
        Self::from_config(&ScorerConfig::default())
    }
}
