//! Chain and history endpoint integration.
//!
//! This module provides the clients and wire types for the configured chain
//! provider's RPC and history services, behind trait seams the rest of the
//! engine is written against.

/// HTTP clients and the `ChainRpc`/`HistoryRpc` trait seams
mod client;
/// Scripted in-memory endpoints for tests
#[cfg(test)]
pub mod mock;
/// Wire type definitions
mod types;

pub use client::*;
pub use types::*;
