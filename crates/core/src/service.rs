//! Service traits — abstractions over the external model backends.
//!
//! Both services are opaque, potentially slow, potentially failing I/O
//! boundaries. The pipeline awaits them with no partial mutation of any
//! store on failure: callers catch `ServiceError` and degrade to the
//! documented fallback values.

use async_trait::async_trait;

use crate::error::ServiceError;

/// A text-embedding backend returning fixed-length numeric vectors.
///
/// `dimension()` is constant within a deployment; the pipeline uses it to
/// build the zero-vector fallback when a call fails.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// The fixed vector length this service returns.
    fn dimension(&self) -> usize;

    /// Embed a single text. Safe to call repeatedly.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ServiceError>;
}

/// A text-generation backend, used only for level 2/3 compression.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate a completion for `prompt` under `system_instruction`,
    /// bounded by `max_output_tokens`.
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        max_output_tokens: u32,
    ) -> std::result::Result<String, ServiceError>;
}
