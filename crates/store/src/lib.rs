//! In-process stores for the Shardloom pipeline.
//!
//! Two stores with very different write disciplines:
//!
//! - [`CandidateStore`] — per-session, append-only lists of shards.
//!   Explicitly volatile: durability is an external concern.
//! - [`CheckpointVault`] — write-once, content-fingerprinted archive of
//!   compressed or evicted fragments. No update or delete API exists.
//!
//! Both are thread-safe via interior locking and are intended to be
//! constructed once and shared by reference by whatever owns a session's
//! lifecycle — no behavior depends on there being exactly one instance
//! process-wide.

pub mod candidate;
pub mod vault;

pub use candidate::CandidateStore;
pub use vault::{CheckpointVault, fingerprint};
