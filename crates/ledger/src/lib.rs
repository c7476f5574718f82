//! Per-session token accounting for Shardloom.
//!
//! Tracks cumulative token spend against a fixed per-session budget,
//! detects exhaustion, forecasts budget breaches before they happen, and
//! supports generational forking: archiving a generation's entries to the
//! checkpoint vault and starting the accounting over.
//!
//! Bookkeeping must never block a request: every read on an unknown
//! session degrades to a sensible default (full budget, no exhaustion,
//! absent stats) instead of failing.

pub mod ledger;
pub mod model;

pub use ledger::TokenLedger;
pub use model::{SessionStats, TurnRecord};
