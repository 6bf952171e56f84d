//! Account Synchronization Module
//!
//! This module provides the core logic for keeping the local view of an
//! account synchronized with the configured chain provider. It is composed of
//! two submodules:
//!
//! - `orchestrator`: the per-account refresh pipeline. It sequences the fetch
//!   stages, joins the fan-outs, merges results into the canonical
//!   collections, and persists the outcome.
//! - `scheduler`: the two-lane operation scheduler every network call goes
//!   through (a FIFO sequential lane for ordering-sensitive operations, a
//!   bounded concurrent lane for independent reads).
//!
//! The orchestrator is deliberately best-effort inside its fan-outs: one
//! unreachable sub-fetch degrades the result instead of failing the account.

/// Per-account refresh pipeline
pub mod orchestrator;
/// Two-lane operation scheduler
pub mod scheduler;

pub use orchestrator::*;
pub use scheduler::OperationScheduler;
