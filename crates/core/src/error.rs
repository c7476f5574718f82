//! Error types for the Shardloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The pipeline itself
//! never surfaces errors for expected conditions (missing sessions, budget
//! exhaustion, low fidelity) — those degrade to status flags. `ServiceError`
//! exists so the external-call fallback policy is expressed as `Result`
//! handling at the call site instead of a buried catch.

use thiserror::Error;

/// The top-level error type for Shardloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- External service errors ---
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the external embedding / text-generation services.
///
/// Every variant is recoverable by design: callers inside the pipeline
/// catch these and degrade to the documented fallback values.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}
