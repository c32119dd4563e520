//! Per-address sync engine and integration point for the sync services.
//!
//! This module defines the `SyncEngine`, which runs one incremental sync of one merchant address:
//!
//! - Canonicalize the address and load the highest persisted logical time as the cursor
//! - Read the chain head and the account state
//! - Select the scan strategy once: the chain listing for active accounts, the jetton history
//!   indexer for inactive ones (sources are never mixed within one scan)
//! - Deduplicate the candidates by `(tx_hash, tx_lt)`
//! - Hand the batch to the `ReconciliationEngine`, which persists it in one transaction
//!
//! All network calls finish before the persistence transaction opens.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::reconciliation::ReconciliationEngine;
use super::repositories::TransferStore;
use super::strategies::{ChainScan, IndexerScan, ScanStrategy, ScanTarget};
use crate::chain::ChainApi;
use crate::indexer::IndexerApi;
use crate::payments::{AcceptedJettons, SyncError, SyncReport, TransferCandidate};
use crate::ton::AddressCodec;
use crate::utils::cancellable;

/// Page sizes of the two scan sources
#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub chain_page_size: usize,
    pub indexer_page_size: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chain_page_size: 10,
            indexer_page_size: 100,
        }
    }
}

/// Incremental jetton transfer sync for merchant addresses.
pub struct SyncEngine {
    codec: AddressCodec,
    chain: Arc<dyn ChainApi>,
    store: Arc<dyn TransferStore>,

    // Strategies
    primary: Box<dyn ScanStrategy>,
    fallback: Box<dyn ScanStrategy>,

    reconciliation: ReconciliationEngine,
}

impl SyncEngine {
    pub fn new(
        codec: AddressCodec,
        chain: Arc<dyn ChainApi>,
        indexer: Arc<dyn IndexerApi>,
        store: Arc<dyn TransferStore>,
        jettons: AcceptedJettons,
        settings: ScanSettings,
    ) -> Self {
        let primary = ChainScan::new(
            chain.clone(),
            codec,
            jettons.clone(),
            settings.chain_page_size,
        );
        let fallback = IndexerScan::new(indexer, codec, jettons, settings.indexer_page_size);

        Self {
            codec,
            chain,
            store: store.clone(),
            primary: Box::new(primary),
            fallback: Box::new(fallback),
            reconciliation: ReconciliationEngine::new(store),
        }
    }

    /// Sync one receiving address.
    ///
    /// Scans everything newer than the stored cursor and applies it. Errors abort this address
    /// for the current run only; nothing is persisted unless the whole batch commits.
    pub async fn sync_address(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let address = self.codec.parse(address)?;
        let receiver = address.to_string();

        let from_lt = cancellable(cancel, self.store.latest_transfer_lt(&receiver)).await?;
        let head = self.chain.masterchain_head(cancel).await?;
        let state = self
            .chain
            .account_state(address.address(), &head, cancel)
            .await?;

        let strategy = if state.active {
            &self.primary
        } else {
            &self.fallback
        };
        debug!(
            "Syncing {} via {} (active: {}, cursor: {:?}, head seqno: {})",
            receiver,
            strategy.name(),
            state.active,
            from_lt,
            head.seqno
        );

        let target = ScanTarget {
            address,
            from_lt,
            last: state.last,
        };
        let outcome = strategy.scan(&target, cancel).await?;
        let candidates = dedup_candidates(outcome.candidates);

        let applied = self.reconciliation.apply(&candidates, cancel).await?;
        if applied.persisted > 0 {
            info!(
                address = %receiver,
                source = %outcome.stats.source,
                persisted = applied.persisted,
                applied = applied.applied,
                "added new jetton transfers"
            );
        }

        Ok(SyncReport {
            address: receiver,
            source: outcome.stats.source,
            visited: outcome.stats.visited,
            candidates: candidates.len(),
            persisted: applied.persisted,
            applied: applied.applied,
        })
    }
}

/// Keeps the first candidate of every `(tx_hash, tx_lt)` key, preserving order.
fn dedup_candidates(candidates: Vec<TransferCandidate>) -> Vec<TransferCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert((candidate.tx_hash.clone(), candidate.tx_lt)))
        .collect()
}
