//! # Shardloom Core
//!
//! Domain types, traits, and error definitions for the Shardloom
//! context-budgeting pipeline. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! The two external services (embedding, text generation) are defined as
//! traits here. Implementations live in their own crate. This enables:
//! - Swapping backends via configuration
//! - Easy testing with mock/stub services
//! - Clean dependency graph (all crates depend inward on core)

pub mod checkpoint;
pub mod error;
pub mod service;
pub mod shard;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use checkpoint::{ArchiveReason, Checkpoint};
pub use error::{Error, Result, ServiceError};
pub use service::{EmbeddingService, GenerationService};
pub use shard::{Archivable, ArchivePayload, Shard};
pub use token::estimate_tokens;
