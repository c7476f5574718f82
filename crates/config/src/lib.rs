//! Configuration loading and validation for Shardloom.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides. Every field has a default, so a missing file (or an empty
//! one) yields the reference constants and the pipeline starts without
//! any setup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Token ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Priority scorer settings.
    #[serde(default)]
    pub scorer: ScorerConfig,

    /// Context assembly settings.
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Summarizer settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// External service endpoint settings.
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Token ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Token ceiling applied to sessions that don't specify their own.
    #[serde(default = "default_session_budget")]
    pub default_session_budget: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_session_budget: default_session_budget(),
        }
    }
}

/// Priority scorer settings. Weights are not required to sum to 1; the
/// final score is clamped to [0, 1] regardless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_intent_weight")]
    pub intent_weight: f32,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f32,

    #[serde(default = "default_dependency_weight")]
    pub dependency_weight: f32,

    #[serde(default = "default_user_weight")]
    pub user_weight: f32,

    /// Raw cosine below this contributes zero intent signal (hard cliff).
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            intent_weight: default_intent_weight(),
            recency_weight: default_recency_weight(),
            dependency_weight: default_dependency_weight(),
            user_weight: default_user_weight(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Headroom reserved for the model's reply before any history is
    /// considered.
    #[serde(default = "default_reserved_response_tokens")]
    pub reserved_response_tokens: usize,

    /// Fraction of the remaining budget usable for verbatim inclusion.
    #[serde(default = "default_assembly_factor")]
    pub assembly_factor: f32,

    /// Score at or above which a shard is included unconditionally.
    #[serde(default = "default_core_truth_threshold")]
    pub core_truth_threshold: f32,

    /// If the best candidate scores below this, nothing in history is
    /// even weakly relevant to the new input.
    #[serde(default = "default_dissonance_threshold")]
    pub dissonance_threshold: f32,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            reserved_response_tokens: default_reserved_response_tokens(),
            assembly_factor: default_assembly_factor(),
            core_truth_threshold: default_core_truth_threshold(),
            dissonance_threshold: default_dissonance_threshold(),
        }
    }
}

/// Summarizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Vector length of the embedding service (zero-vector fallback size).
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Available/original ratio at or above which level 1 suffices.
    #[serde(default = "default_level1_ratio")]
    pub level1_ratio: f32,

    /// Available/original ratio at or above which level 2 suffices.
    #[serde(default = "default_level2_ratio")]
    pub level2_ratio: f32,

    /// Character ceiling for the level-2 local fallback.
    #[serde(default = "default_level2_char_ceiling")]
    pub level2_char_ceiling: usize,

    /// Output token cap for level-2 summaries.
    #[serde(default = "default_summary_max_output_tokens")]
    pub summary_max_output_tokens: u32,

    /// Output token cap for level-3 distillations.
    #[serde(default = "default_distill_max_output_tokens")]
    pub distill_max_output_tokens: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: default_embedding_dimension(),
            level1_ratio: default_level1_ratio(),
            level2_ratio: default_level2_ratio(),
            level2_char_ceiling: default_level2_char_ceiling(),
            summary_max_output_tokens: default_summary_max_output_tokens(),
            distill_max_output_tokens: default_distill_max_output_tokens(),
        }
    }
}

/// External service endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Overridable via `SHARDLOOM_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat model used for level 2/3 compression.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_session_budget() -> usize {
    50_000
}
fn default_intent_weight() -> f32 {
    0.5
}
fn default_recency_weight() -> f32 {
    0.2
}
fn default_dependency_weight() -> f32 {
    0.2
}
fn default_user_weight() -> f32 {
    0.1
}
fn default_relevance_threshold() -> f32 {
    0.35
}
fn default_reserved_response_tokens() -> usize {
    1024
}
fn default_assembly_factor() -> f32 {
    0.7
}
fn default_core_truth_threshold() -> f32 {
    0.85
}
fn default_dissonance_threshold() -> f32 {
    0.25
}
fn default_embedding_dimension() -> usize {
    768
}
fn default_level1_ratio() -> f32 {
    0.6
}
fn default_level2_ratio() -> f32 {
    0.3
}
fn default_level2_char_ceiling() -> usize {
    600
}
fn default_summary_max_output_tokens() -> u32 {
    160
}
fn default_distill_max_output_tokens() -> u32 {
    60
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("ledger", &self.ledger)
            .field("scorer", &self.scorer)
            .field("assembly", &self.assembly)
            .field("summarizer", &self.summarizer)
            .field("provider", &self.provider)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    /// Environment overrides are applied after parsing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SHARDLOOM_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SHARDLOOM_API_KEY") {
            if !key.is_empty() {
                self.provider.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("SHARDLOOM_BASE_URL") {
            if !url.is_empty() {
                self.provider.base_url = url;
            }
        }
        if let Ok(budget) = std::env::var("SHARDLOOM_SESSION_BUDGET") {
            match budget.parse::<usize>() {
                Ok(value) if value > 0 => self.ledger.default_session_budget = value,
                _ => tracing::warn!(value = %budget, "Ignoring invalid SHARDLOOM_SESSION_BUDGET"),
            }
        }
    }

    /// Validate all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.default_session_budget == 0 {
            return Err(ConfigError::Invalid(
                "ledger.default_session_budget must be positive".into(),
            ));
        }
        if self.summarizer.embedding_dimension == 0 {
            return Err(ConfigError::Invalid(
                "summarizer.embedding_dimension must be positive".into(),
            ));
        }

        let weights = [
            ("scorer.intent_weight", self.scorer.intent_weight),
            ("scorer.recency_weight", self.scorer.recency_weight),
            ("scorer.dependency_weight", self.scorer.dependency_weight),
            ("scorer.user_weight", self.scorer.user_weight),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }

        let thresholds = [
            ("scorer.relevance_threshold", self.scorer.relevance_threshold),
            (
                "assembly.core_truth_threshold",
                self.assembly.core_truth_threshold,
            ),
            (
                "assembly.dissonance_threshold",
                self.assembly.dissonance_threshold,
            ),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.assembly.assembly_factor)
            || self.assembly.assembly_factor == 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "assembly.assembly_factor must be in (0, 1], got {}",
                self.assembly.assembly_factor
            )));
        }

        if self.summarizer.level2_ratio > self.summarizer.level1_ratio {
            return Err(ConfigError::Invalid(
                "summarizer.level2_ratio must not exceed level1_ratio".into(),
            ));
        }

        Ok(())
    }
}
