//! Multi-level lossy text compression.
//!
//! Four levels, increasingly aggressive:
//!
//! | Level | Strategy | External call |
//! |-------|----------|---------------|
//! | 0 | identity | no |
//! | 1 | sentence-level deduplication | no |
//! | 2 | short intent-preserving summary (≈4 lines) | yes |
//! | 3 | 1–2 line distillation of core intent | yes |
//!
//! Every external call degrades gracefully: embedding failure yields a
//! zero vector, level-2 failure falls back to truncated level-1 output,
//! level-3 failure surfaces a fixed marker rather than silently losing
//! data. Nothing in this module ever returns an error.

use regex::Regex;
use shardloom_config::SummarizerConfig;
use shardloom_core::service::{EmbeddingService, GenerationService};
use shardloom_core::{Shard, estimate_tokens};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::warn;

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Appended to the level-2 local fallback so the degradation is visible.
const SUMMARY_STALLED_MARKER: &str = "[summary stalled]";

/// Terminal fallback for level 3: a visible stub beats silent loss.
const DISTILLATION_UNAVAILABLE: &str = "[distillation unavailable]";

const SUMMARY_INSTRUCTION: &str = "Condense the following conversation fragment into a \
     short summary of at most four lines. Preserve intent, decisions, and concrete facts. \
     Output only the summary.";

const DISTILL_INSTRUCTION: &str = "Distill the following conversation fragment into one or \
     two lines capturing only the core intent and key facts. Output only the distillation.";

/// The result of compressing a shard at a given level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compression {
    /// The derived text (the original for level 0).
    pub text: String,
    /// Re-measured token count of `text`.
    pub tokens: usize,
    /// The level actually applied.
    pub level: u8,
}

/// Multi-level compressor over the two external services.
pub struct Summarizer {
    embedder: Arc<dyn EmbeddingService>,
    generator: Arc<dyn GenerationService>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerationService>,
        config: SummarizerConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            config,
        }
    }

    /// Embed a text. On failure, returns a zero vector of the service's
    /// dimensionality — no similarity signal, but never a crash.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.embedder.embed(text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Embedding failed, degrading to zero vector");
                vec![0.0; self.embedder.dimension()]
            }
        }
    }

    /// Level 1: local deterministic reduction. Splits into sentences,
    /// drops case-insensitive exact duplicates preserving first-occurrence
    /// order, rejoins, and guarantees a trailing terminator.
    pub fn compress_level1(&self, text: &str) -> String {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for sentence in split_sentences(text) {
            if seen.insert(sentence.to_lowercase()) {
                kept.push(sentence);
            }
        }

        let mut result = kept.join(" ");
        if !result.is_empty() && !result.ends_with(['.', '!', '?']) {
            result.push('.');
        }
        result
    }

    /// Level 2: model-driven short summary. Falls back to truncated
    /// level-1 output with a visible marker if the service fails.
    pub async fn compress_level2(&self, text: &str) -> String {
        match self
            .generator
            .generate(text, SUMMARY_INSTRUCTION, self.config.summary_max_output_tokens)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Level-2 summary failed, falling back to local reduction");
                let mut fallback: String = self
                    .compress_level1(text)
                    .chars()
                    .take(self.config.level2_char_ceiling)
                    .collect();
                fallback.push(' ');
                fallback.push_str(SUMMARY_STALLED_MARKER);
                fallback
            }
        }
    }

    /// Level 3: model-driven distillation. On failure returns a fixed
    /// marker — level-3 output is already a lossy stub, so surfacing the
    /// failure is acceptable.
    pub async fn compress_level3(&self, text: &str) -> String {
        match self
            .generator
            .generate(text, DISTILL_INSTRUCTION, self.config.distill_max_output_tokens)
            .await
        {
            Ok(distilled) => distilled,
            Err(e) => {
                warn!(error = %e, "Level-3 distillation failed, surfacing marker");
                DISTILLATION_UNAVAILABLE.to_string()
            }
        }
    }

    /// The budget thermostat: the tighter the available space relative to
    /// the fragment's native size, the more aggressive the level.
    pub fn choose_level(&self, available_tokens: usize, original_tokens: usize) -> u8 {
        let original = original_tokens as f32;
        if available_tokens >= original_tokens {
            0
        } else if available_tokens as f32 >= self.config.level1_ratio * original {
            1
        } else if available_tokens as f32 >= self.config.level2_ratio * original {
            2
        } else {
            3
        }
    }

    /// Compress a shard at `target_level` (clamped to 3). Level 0 returns
    /// the original text and its known token count with no external call;
    /// levels 1–3 re-measure the produced text.
    pub async fn compress(&self, shard: &Shard, target_level: u8) -> Compression {
        let level = target_level.min(3);
        if level == 0 {
            return Compression {
                text: shard.raw_text.clone(),
                tokens: shard.tokens,
                level: 0,
            };
        }

        let text = match level {
            1 => self.compress_level1(&shard.raw_text),
            2 => self.compress_level2(&shard.raw_text).await,
            _ => self.compress_level3(&shard.raw_text).await,
        };
        let tokens = estimate_tokens(&text);
        Compression { text, tokens, level }
    }
}

/// Split text into sentences at terminal punctuation followed by
/// whitespace. The terminator stays attached to its sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;

    for m in SENTENCE_END.find_iter(text) {
        let sentence = text[last..m.start() + 1].trim().to_string();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        last = m.end();
    }

    let remainder = text[last..].trim().to_string();
    if !remainder.is_empty() {
        sentences.push(remainder);
    }

    sentences
}
