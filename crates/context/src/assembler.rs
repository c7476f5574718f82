//! Context assembler — ranks candidates, applies budget and fidelity
//! policy, and emits the final request payload plus an assembly report.
//!
//! Allocation is greedy and single-pass: candidates are walked in
//! descending score order against a monotonically shrinking remainder, so
//! a later high-scoring shard can be starved of space an earlier shard
//! already consumed. Score order *is* priority order.
//!
//! Known risk, preserved deliberately: the frozen tier is exempt from
//! every budget check, so a pathological set of core-truth shards can
//! exceed the token budget the reserved-response headroom was meant to
//! protect. Callers wanting a cap must impose it upstream.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shardloom_config::AppConfig;
use shardloom_core::checkpoint::ArchiveReason;
use shardloom_core::Shard;
use shardloom_ledger::TokenLedger;
use shardloom_store::{CandidateStore, CheckpointVault};
use std::sync::Arc;
use tracing::{debug, info};

use crate::scorer::PriorityScorer;
use crate::summarizer::Summarizer;
use crate::vector::cosine_similarity;

/// Separator between assembled prompt pieces.
const PIECE_SEPARATOR: &str = "\n\n";

/// What happened to a shard during assembly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShardAction {
    /// Included verbatim within budget.
    Full,
    /// Included as a lossy summary.
    Compressed,
    /// Excluded; archived to the vault and replaced by a reference token.
    Vaulted,
    /// Core truth: included verbatim, exempt from budget.
    Frozen,
}

/// One line of the per-call assembly report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    /// The shard considered.
    pub shard_id: String,
    /// The action taken.
    pub action: ShardAction,
    /// Compression level used (0 if none).
    pub level: u8,
    /// Cosine similarity between the shard's original vector and the
    /// embedding actually included (the original vector itself for
    /// `Frozen`/`Full`).
    pub similarity: f32,
}

/// The assembled request payload plus its audit trail. Transient — never
/// persisted.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    /// The final prompt: included pieces joined, current text last.
    pub prompt: String,
    /// History tokens consumed plus the current text's cost.
    pub tokens_used: usize,
    /// True iff candidates exist and none is even weakly relevant to the
    /// new input — a signal the caller may use to offer a reset.
    pub dissonance_detected: bool,
    /// One entry per shard considered, in walk order.
    pub report: Vec<ReportEntry>,
}

/// Assembly policy knobs.
#[derive(Debug, Clone)]
pub struct AssemblyPolicy {
    /// Headroom reserved for the model's reply.
    pub reserved_response_tokens: usize,
    /// Fraction of the remaining budget usable for verbatim inclusion.
    pub assembly_factor: f32,
    /// Score at or above which a shard is frozen.
    pub core_truth_threshold: f32,
    /// Max-score floor below which dissonance is flagged.
    pub dissonance_threshold: f32,
    /// Raw-cosine relevance bar shared with the scorer's intent cliff and
    /// the post-compression fidelity gate.
    pub relevance_threshold: f32,
}

impl Default for AssemblyPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl AssemblyPolicy {
    /// Build a policy from the `[assembly]` and `[scorer]` config tables.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reserved_response_tokens: config.assembly.reserved_response_tokens,
            assembly_factor: config.assembly.assembly_factor,
            core_truth_threshold: config.assembly.core_truth_threshold,
            dissonance_threshold: config.assembly.dissonance_threshold,
            relevance_threshold: config.scorer.relevance_threshold,
        }
    }
}

struct ScoredShard {
    shard: Shard,
    cosine: f32,
    score: f32,
}

/// The orchestrator. Owns its candidate source, scorer, and summarizer;
/// the ledger and vault are passed per call by whatever owns the
/// session's lifecycle.
pub struct ContextAssembler {
    candidates: Arc<CandidateStore>,
    scorer: PriorityScorer,
    summarizer: Summarizer,
    policy: AssemblyPolicy,
}

impl ContextAssembler {
    pub fn new(
        candidates: Arc<CandidateStore>,
        scorer: PriorityScorer,
        summarizer: Summarizer,
        policy: AssemblyPolicy,
    ) -> Self {
        Self {
            candidates,
            scorer,
            summarizer,
            policy,
        }
    }

    /// Assemble the prompt for one outgoing request.
    ///
    /// Never fails: budget exhaustion, missing sessions, empty candidate
    /// pools, and upstream service failures all degrade to flags and
    /// fallback values. At minimum the returned prompt contains
    /// `current_text`.
    pub async fn assemble_prompt(
        &self,
        session_id: &str,
        current_text: &str,
        current_tokens: usize,
        ledger: &TokenLedger,
        vault: &CheckpointVault,
    ) -> AssembledPrompt {
        // Reserve headroom for the reply before any history is considered.
        // May go negative under pressure; later math stays signed.
        let remaining = ledger.get_remaining(session_id) as i64
            - self.policy.reserved_response_tokens as i64
            - current_tokens as i64;

        let candidates = self.candidates.retrieve_candidates(session_id);
        let current_embedding = self.summarizer.embed(current_text).await;
        let now = Utc::now().timestamp();

        // One cosine per shard, shared by the scorer's intent term and the
        // verbatim-inclusion check.
        let mut scored: Vec<ScoredShard> = candidates
            .into_iter()
            .map(|shard| {
                let cosine = cosine_similarity(&shard.intent_vector, &current_embedding);
                let score = self.scorer.score_at(&shard, &current_embedding, now);
                ScoredShard {
                    shard,
                    cosine,
                    score,
                }
            })
            .collect();
        // Stable sort: ties keep insertion order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let max_score = if scored.is_empty() {
            1.0
        } else {
            scored.iter().map(|s| s.score).fold(0.0f32, f32::max)
        };
        let dissonance_detected =
            !scored.is_empty() && max_score < self.policy.dissonance_threshold;
        if dissonance_detected {
            info!(
                session = %session_id,
                max_score,
                "Dissonance detected: no candidate is relevant to the new input"
            );
        }

        let mut pieces: Vec<String> = Vec::new();
        let mut report: Vec<ReportEntry> = Vec::new();
        let mut tokens_used: usize = 0;

        for ScoredShard {
            shard,
            cosine,
            score,
        } in &scored
        {
            // Frozen tier: core truth is never dropped or compressed,
            // regardless of space pressure. Counts toward tokens_used so
            // later shards see the shrunken remainder.
            if *score >= self.policy.core_truth_threshold {
                tokens_used += shard.tokens;
                pieces.push(shard.raw_text.clone());
                report.push(ReportEntry {
                    shard_id: shard.id.clone(),
                    action: ShardAction::Frozen,
                    level: 0,
                    similarity: *cosine,
                });
                debug!(shard = %shard.id, score, "Shard frozen");
                continue;
            }

            let is_breaching = ledger.predict_exhaustion(
                session_id,
                tokens_used + shard.tokens + current_tokens,
            );
            let space_budget = remaining as f32 * self.policy.assembly_factor;

            if *cosine >= self.policy.relevance_threshold
                && !is_breaching
                && (tokens_used + shard.tokens) as f32 <= space_budget
            {
                tokens_used += shard.tokens;
                pieces.push(shard.raw_text.clone());
                report.push(ReportEntry {
                    shard_id: shard.id.clone(),
                    action: ShardAction::Full,
                    level: 0,
                    similarity: *cosine,
                });
                debug!(shard = %shard.id, cosine, "Shard included verbatim");
                continue;
            }

            let available = remaining - tokens_used as i64;
            if available <= 0 {
                // Nothing left at all: evict to a reference.
                let checkpoint = vault.create(shard, "", 0, ArchiveReason::NoSpace);
                pieces.push(format!("[vault:{}]", checkpoint.id));
                report.push(ReportEntry {
                    shard_id: shard.id.clone(),
                    action: ShardAction::Vaulted,
                    level: 0,
                    similarity: *cosine,
                });
                debug!(shard = %shard.id, checkpoint = %checkpoint.id, "Shard vaulted: no space");
                continue;
            }

            let target_level = if is_breaching {
                3
            } else {
                self.summarizer.choose_level(available as usize, shard.tokens)
            };
            let compressed = self.summarizer.compress(shard, target_level).await;

            if compressed.level == 0 {
                // Level selection returned 0 despite reaching this branch:
                // the shard fits the raw remainder even though the verbatim
                // check failed. Include as-is.
                tokens_used += compressed.tokens;
                pieces.push(compressed.text);
                report.push(ReportEntry {
                    shard_id: shard.id.clone(),
                    action: ShardAction::Full,
                    level: 0,
                    similarity: *cosine,
                });
                continue;
            }

            let compressed_embedding = self.summarizer.embed(&compressed.text).await;
            let fidelity = cosine_similarity(&shard.intent_vector, &compressed_embedding);

            if fidelity < self.policy.relevance_threshold && !is_breaching {
                // Compression lost too much meaning to trust: archive the
                // original and reference it instead of the lossy summary.
                let checkpoint = vault.create(
                    shard,
                    compressed.text,
                    compressed.level,
                    ArchiveReason::FidelityDrift,
                );
                pieces.push(format!("[vault:{}]", checkpoint.id));
                report.push(ReportEntry {
                    shard_id: shard.id.clone(),
                    action: ShardAction::Vaulted,
                    level: compressed.level,
                    similarity: fidelity,
                });
                debug!(
                    shard = %shard.id,
                    checkpoint = %checkpoint.id,
                    fidelity,
                    "Shard vaulted: fidelity drift"
                );
            } else {
                tokens_used += compressed.tokens;
                pieces.push(compressed.text);
                report.push(ReportEntry {
                    shard_id: shard.id.clone(),
                    action: ShardAction::Compressed,
                    level: compressed.level,
                    similarity: fidelity,
                });
                debug!(
                    shard = %shard.id,
                    level = compressed.level,
                    fidelity,
                    "Shard compressed"
                );
            }
        }

        // The new input is never dropped or compressed.
        pieces.push(current_text.to_string());

        AssembledPrompt {
            prompt: pieces.join(PIECE_SEPARATOR),
            tokens_used: tokens_used + current_tokens,
            dissonance_detected,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shardloom_config::SummarizerConfig;
    use shardloom_core::error::ServiceError;
    use shardloom_core::service::{EmbeddingService, GenerationService};

    // ── Mock services ──────────────────────────────────────────────────

    /// Returns the same vector for every text.
    struct FixedEmbedder {
        vector: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingService for FixedEmbedder {
        fn dimension(&self) -> usize {
            self.vector.len()
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
            Ok(self.vector.clone())
        }
    }

    struct FixedGenerator {
        output: String,
    }

    #[async_trait]
    impl GenerationService for FixedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _system_instruction: &str,
            _max_output_tokens: u32,
        ) -> Result<String, ServiceError> {
            Ok(self.output.clone())
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn make_assembler(
        store: Arc<CandidateStore>,
        embedding: Vec<f32>,
        generator_output: &str,
        policy: AssemblyPolicy,
    ) -> ContextAssembler {
        let embedder = Arc::new(FixedEmbedder { vector: embedding });
        let generator = Arc::new(FixedGenerator {
            output: generator_output.into(),
        });
        ContextAssembler::new(
            store,
            PriorityScorer::default(),
            Summarizer::new(embedder, generator, SummarizerConfig::default()),
            policy,
        )
    }

    fn policy(reserved: usize) -> AssemblyPolicy {
        AssemblyPolicy {
            reserved_response_tokens: reserved,
            ..AssemblyPolicy::default()
        }
    }

    /// A shard with an explicit vector and token count (text padded to
    /// the requested size).
    fn sized_shard(vector: Vec<f32>, tokens: usize, user_flag: bool) -> Shard {
        let text: Vec<String> = (0..tokens).map(|i| format!("w{i}")).collect();
        Shard::new(text.join(" "), vector, user_flag)
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_session_yields_current_text_only() {
        let store = Arc::new(CandidateStore::new());
        let asm = make_assembler(store, vec![1.0, 0.0], "summary", policy(100));
        let ledger = TokenLedger::new(1000);
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "hello there", 2, &ledger, &vault)
            .await;

        assert_eq!(result.prompt, "hello there");
        assert_eq!(result.tokens_used, 2);
        assert!(!result.dissonance_detected);
        assert!(result.report.is_empty());
    }

    #[tokio::test]
    async fn current_text_is_always_final_segment() {
        let store = Arc::new(CandidateStore::new());
        store.add_shard("s1", sized_shard(vec![1.0, 0.0], 20, true));
        store.add_shard("s1", sized_shard(vec![0.0, 1.0], 20, false));
        let asm = make_assembler(store, vec![1.0, 0.0], "summary", policy(100));
        let ledger = TokenLedger::new(1000);
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "continue", 1, &ledger, &vault)
            .await;

        let last = result.prompt.split(PIECE_SEPARATOR).last().unwrap();
        assert_eq!(last, "continue");
    }

    #[tokio::test]
    async fn frozen_tier_bypasses_budget() {
        let store = Arc::new(CandidateStore::new());
        // Aligned, user-authored, heavily depended-upon: scores above the
        // core-truth threshold. Larger than the whole session budget.
        let mut core = sized_shard(vec![1.0, 0.0], 5000, true);
        core.dependency_count = 10;
        store.add_shard("s1", core.clone());

        let asm = make_assembler(store, vec![1.0, 0.0], "summary", policy(100));
        let ledger = TokenLedger::new(1000);
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "continue", 10, &ledger, &vault)
            .await;

        assert_eq!(result.report.len(), 1);
        assert_eq!(result.report[0].action, ShardAction::Frozen);
        assert_eq!(result.report[0].level, 0);
        assert!((result.report[0].similarity - 1.0).abs() < 1e-5);
        assert!(result.prompt.contains(&core.raw_text));
        assert_eq!(result.tokens_used, 5000 + 10);
        assert_eq!(vault.count(), 0);
    }

    #[tokio::test]
    async fn no_space_vaults_to_reference() {
        let store = Arc::new(CandidateStore::new());
        let shard = sized_shard(vec![0.0, 1.0], 50, false);
        store.add_shard("s1", shard.clone());

        // Reserve more than the whole budget: remaining goes negative.
        let asm = make_assembler(store, vec![1.0, 0.0], "summary", policy(2000));
        let ledger = TokenLedger::new(1000);
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "continue", 10, &ledger, &vault)
            .await;

        assert_eq!(result.report[0].action, ShardAction::Vaulted);
        assert_eq!(result.report[0].level, 0);
        assert_eq!(vault.count(), 1);

        let checkpoint = &vault.get_all()[0];
        assert_eq!(checkpoint.parent_id, shard.id);
        assert_eq!(checkpoint.reason, ArchiveReason::NoSpace);
        assert!(checkpoint.summary.is_empty());
        assert!(result.prompt.contains(&format!("[vault:{}]", checkpoint.id)));
        // the shard itself contributed zero content
        assert!(!result.prompt.contains(&shard.raw_text));
        assert_eq!(result.tokens_used, 10);
    }

    #[tokio::test]
    async fn dissonance_flagged_when_nothing_is_relevant() {
        let store = Arc::new(CandidateStore::new());
        let now = Utc::now().timestamp();
        for _ in 0..3 {
            // Orthogonal to the query, model-authored, old: score well
            // below the dissonance threshold.
            let mut shard = sized_shard(vec![0.0, 1.0], 10, false);
            shard.timestamp = now - 10_000;
            store.add_shard("s1", shard);
        }

        let asm = make_assembler(store, vec![1.0, 0.0], "summary", policy(100));
        let ledger = TokenLedger::new(10_000);
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "something new entirely", 4, &ledger, &vault)
            .await;

        assert!(result.dissonance_detected);
    }

    #[tokio::test]
    async fn irrelevant_but_fitting_shard_included_at_level_zero() {
        let store = Arc::new(CandidateStore::new());
        // Orthogonal (fails the verbatim relevance bar) but tiny, with a
        // wide-open budget: level selection returns 0 and the shard lands
        // verbatim as FULL.
        let shard = sized_shard(vec![0.0, 1.0], 5, false);
        store.add_shard("s1", shard.clone());

        let asm = make_assembler(store, vec![1.0, 0.0], "summary", policy(100));
        let ledger = TokenLedger::new(10_000);
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "continue", 1, &ledger, &vault)
            .await;

        assert_eq!(result.report[0].action, ShardAction::Full);
        assert_eq!(result.report[0].level, 0);
        assert!(result.prompt.contains(&shard.raw_text));
        assert_eq!(vault.count(), 0);
    }

    #[tokio::test]
    async fn breaching_forces_level_three_and_accepts_low_fidelity() {
        let store = Arc::new(CandidateStore::new());
        let shard = sized_shard(vec![0.0, 1.0], 50, false);
        store.add_shard("s1", shard.clone());

        let asm = make_assembler(store, vec![1.0, 0.0], "distilled output", policy(10));
        let ledger = TokenLedger::new(1000);
        ledger.record_turn("s1", "t1", 470, 470); // cumulative 940

        let vault = CheckpointVault::new();
        let result = asm
            .assemble_prompt("s1", "continue", 10, &ledger, &vault)
            .await;

        assert_eq!(result.report[0].action, ShardAction::Compressed);
        assert_eq!(result.report[0].level, 3);
        // fidelity is ~0 (orthogonal) but breaching forces acceptance
        assert!(result.report[0].similarity < 0.1);
        assert!(result.prompt.contains("distilled output"));
        assert_eq!(vault.count(), 0);
    }

    #[tokio::test]
    async fn fidelity_drift_vaults_the_original() {
        let store = Arc::new(CandidateStore::new());
        // Too big for the verbatim window, orthogonal to everything the
        // embedder returns: compression runs, fidelity comes back below
        // the bar, the original is archived.
        let shard = sized_shard(vec![0.0, 1.0], 1000, false);
        store.add_shard("s1", shard.clone());

        let asm = make_assembler(store, vec![1.0, 0.0], "lossy summary", policy(100));
        let ledger = TokenLedger::new(1000);
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "continue", 10, &ledger, &vault)
            .await;

        assert_eq!(result.report[0].action, ShardAction::Vaulted);
        assert_eq!(result.report[0].level, 1);
        assert_eq!(vault.count(), 1);

        let checkpoint = &vault.get_all()[0];
        assert_eq!(checkpoint.reason, ArchiveReason::FidelityDrift);
        assert_eq!(checkpoint.parent_id, shard.id);
        assert!(!checkpoint.summary.is_empty());
        assert!(result.prompt.contains(&format!("[vault:{}]", checkpoint.id)));
    }

    #[tokio::test]
    async fn greedy_allocation_starves_later_shards() {
        let store = Arc::new(CandidateStore::new());
        // Both aligned with the query; the user-authored one outscores and
        // consumes the verbatim window first.
        let first = sized_shard(vec![1.0, 0.0], 600, true);
        let second = sized_shard(vec![1.0, 0.0], 400, false);
        store.add_shard("s1", first.clone());
        store.add_shard("s1", second.clone());

        let asm = make_assembler(store, vec![1.0, 0.0], "summary", policy(100));
        let ledger = TokenLedger::new(1000);
        ledger.start_session("s1");
        let vault = CheckpointVault::new();

        let result = asm
            .assemble_prompt("s1", "continue", 10, &ledger, &vault)
            .await;

        let first_entry = result
            .report
            .iter()
            .find(|e| e.shard_id == first.id)
            .unwrap();
        let second_entry = result
            .report
            .iter()
            .find(|e| e.shard_id == second.id)
            .unwrap();

        assert_eq!(first_entry.action, ShardAction::Full);
        // starved of verbatim space, squeezed through compression instead
        assert_eq!(second_entry.action, ShardAction::Compressed);
        assert!(second_entry.level > 0);
    }
}
