//! Jetton Transfer Synchronization Module
//!
//! This module provides the core logic for keeping merchant payments in step with inbound jetton
//! transfers on the TON ledger. It is composed of several submodules, each responsible for a
//! specific aspect of the sync process:
//!
//! - `orchestrator`: The per-address entry point. It loads the cursor, selects a scan strategy and hands the result to reconciliation.
//! - `strategies`: Pluggable scan strategies (chain listing, jetton history indexer).
//! - `message_decoder`: Validates transactions and indexer operations and turns them into transfer candidates.
//! - `progress_tracker`: Counts visited items, rejections and page overlaps of one scan.
//! - `reconciliation`: Matches transfers to pending payments and persists the batch atomically.
//! - `repositories`: Persistence capabilities and their PostgreSQL implementation.
//!
//! Every network and persistence call takes the shared cancellation token.

/// Decoding of transfer notifications and indexer operations
pub mod message_decoder;
/// Per-address sync coordinator
pub mod orchestrator;
/// Tracks scan progress and statistics
pub mod progress_tracker;
/// Matching of transfers against pending payments
pub mod reconciliation;
/// Persistence capabilities
pub mod repositories;
/// Pluggable scan strategies
pub mod strategies;

#[cfg(test)]
pub(crate) mod fakes;

pub use orchestrator::*;
