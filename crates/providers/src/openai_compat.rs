//! OpenAI-compatible service client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/v1/embeddings` and `/v1/chat/completions`. One
//! client serves both core service traits, so a deployment can point the
//! whole pipeline at a single backend.

use async_trait::async_trait;
use serde::Deserialize;
use shardloom_config::ProviderConfig;
use shardloom_core::error::ServiceError;
use shardloom_core::service::{EmbeddingService, GenerationService};
use tracing::{debug, warn};

/// An OpenAI-compatible client implementing both service traits.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    embedding_dimension: usize,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        embedding_dimension: usize,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            embedding_dimension,
            client,
        }
    }

    /// Build a client from a [`ProviderConfig`] section.
    pub fn from_config(config: &ProviderConfig, embedding_dimension: usize) -> Self {
        Self::new(
            "openai_compat",
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
            config.chat_model.clone(),
            config.embedding_model.clone(),
            embedding_dimension,
            config.request_timeout_secs,
        )
    }

    /// Create an OpenAI client (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            "gpt-4o-mini",
            "text-embedding-3-small",
            1536,
            120,
        )
    }

    /// Create an Ollama client (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            "llama3.1",
            "nomic-embed-text",
            768,
            120,
        )
    }

    /// Map a non-200 status to the matching `ServiceError`.
    async fn status_error(status: u16, response: reqwest::Response) -> ServiceError {
        match status {
            429 => ServiceError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => {
                ServiceError::AuthFailed("Invalid API key or insufficient permissions".into())
            }
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Provider returned error");
                ServiceError::Api {
                    status_code: status,
                    message: error_body,
                }
            }
        }
    }

    fn map_transport_error(e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(e.to_string())
        } else {
            ServiceError::Network(e.to_string())
        }
    }
}

// ── Wire format mirror types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatApiResponse {
    choices: Vec<ChatApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatApiChoice {
    message: ChatApiMessage,
}

#[derive(Debug, Deserialize)]
struct ChatApiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingApiDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiDatum {
    embedding: Vec<f32>,
}

// ── Trait implementations ─────────────────────────────────────────────────

#[async_trait]
impl EmbeddingService for OpenAiCompatClient {
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
            "encoding_format": "float",
        });

        debug!(provider = %self.name, model = %self.embedding_model, "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(Self::status_error(status, response).await);
        }

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ServiceError::MalformedResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        let embedding = api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ServiceError::MalformedResponse("No embedding in response".into()))?;

        if embedding.len() != self.embedding_dimension {
            return Err(ServiceError::MalformedResponse(format!(
                "Expected {} dimensions, got {}",
                self.embedding_dimension,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

#[async_trait]
impl GenerationService for OpenAiCompatClient {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        max_output_tokens: u32,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.chat_model,
            "messages": [
                { "role": "system", "content": system_instruction },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": max_output_tokens,
            "stream": false,
        });

        debug!(provider = %self.name, model = %self.chat_model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(Self::status_error(status, response).await);
        }

        let api_resp: ChatApiResponse = response.json().await.map_err(|e| {
            ServiceError::MalformedResponse(format!("Failed to parse chat response: {e}"))
        })?;

        let content = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::MalformedResponse("No choices in response".into()))?;

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_parses() {
        let json = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "A summary." } }
            ]
        }"#;
        let resp: ChatApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            resp.choices[0].message.content.as_deref(),
            Some("A summary.")
        );
    }

    #[test]
    fn embedding_response_parses() {
        let json = r#"{
            "model": "text-embedding-3-small",
            "data": [ { "index": 0, "embedding": [0.1, -0.2, 0.3] } ]
        }"#;
        let resp: EmbeddingApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].embedding.len(), 3);
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = OpenAiCompatClient::new(
            "test",
            "http://localhost:8080/v1/",
            "key",
            "chat",
            "embed",
            8,
            5,
        );
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.dimension(), 8);
    }

    #[test]
    fn from_config_uses_section_values() {
        let config = ProviderConfig::default();
        let client = OpenAiCompatClient::from_config(&config, 768);
        assert_eq!(client.base_url, "https://api.openai.com/v1");
        assert_eq!(client.embedding_model, "text-embedding-3-small");
        assert_eq!(client.dimension(), 768);
    }
}
