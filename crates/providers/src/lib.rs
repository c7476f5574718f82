//! External service client implementations for Shardloom.
//!
//! The pipeline treats the embedding and text-generation backends as
//! opaque black boxes behind the traits in `shardloom-core`. This crate
//! provides the one implementation most deployments need: an
//! OpenAI-compatible HTTP client that serves both traits.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatClient;
