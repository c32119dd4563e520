use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message_decoder::{JettonWalletIndex, MessageDecoder};
use super::progress_tracker::{ScanProgressTracker, ScanStats};
use crate::chain::{ChainApi, TransactionId};
use crate::indexer::IndexerApi;
use crate::payments::{AcceptedJettons, SyncError, SyncSource, TransferCandidate};
use crate::ton::{AddressCodec, NormalizedAddress};

/// What a scan starts from.
#[derive(Debug, Clone)]
pub struct ScanTarget {
	/// Account under scan, canonicalized.
	pub address: NormalizedAddress,
	/// Highest persisted logical time for the account; the scan stops at or below it.
	pub from_lt: Option<u64>,
	/// Last transaction reported by the account state.
	pub last: Option<TransactionId>,
}

/// Transfers found by one scan, oldest first.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
	pub candidates: Vec<TransferCandidate>,
	pub stats: ScanStats,
}

/// Trait for the sources an account history can be scanned from
#[async_trait::async_trait]
pub trait ScanStrategy: Send + Sync {
	/// Walk the account history backwards down to `target.from_lt`
	async fn scan(
		&self,
		target: &ScanTarget,
		cancel: &CancellationToken,
	) -> Result<ScanOutcome, SyncError>;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// Whether an item at `lt` is already covered by the persisted cursor.
fn reached_cursor(lt: u64, from_lt: Option<u64>) -> bool {
	from_lt.is_some_and(|from| lt <= from)
}

/// Primary strategy: pages raw transactions from the chain API and decodes them locally
pub struct ChainScan {
	chain: Arc<dyn ChainApi>,
	codec: AddressCodec,
	decoder: MessageDecoder,
	jettons: AcceptedJettons,
	page_size: usize,
}

impl ChainScan {
	pub fn new(
		chain: Arc<dyn ChainApi>,
		codec: AddressCodec,
		jettons: AcceptedJettons,
		page_size: usize,
	) -> Self {
		Self {
			chain,
			codec,
			decoder: MessageDecoder::new(codec),
			jettons,
			page_size,
		}
	}

	/// Resolves the jetton wallet contract every accepted jetton has for `owner`.
	async fn resolve_wallets(
		&self,
		owner: &NormalizedAddress,
		cancel: &CancellationToken,
	) -> Result<JettonWalletIndex, SyncError> {
		let mut wallets = JettonWalletIndex::default();
		for jetton in self.jettons.iter() {
			let wallet = self
				.chain
				.jetton_wallet(&jetton.master, owner.address(), cancel)
				.await?;
			let wallet = self.codec.canonicalize(&wallet);
			debug!(
				"Jetton wallet of {} for {} is {}",
				owner, jetton.name, wallet
			);
			wallets.insert(wallet, jetton.clone());
		}
		Ok(wallets)
	}
}

#[async_trait::async_trait]
impl ScanStrategy for ChainScan {
	async fn scan(
		&self,
		target: &ScanTarget,
		cancel: &CancellationToken,
	) -> Result<ScanOutcome, SyncError> {
		let mut tracker = ScanProgressTracker::new(target.address.to_string(), SyncSource::Chain);

		let Some(last) = target.last else {
			debug!("{} has no transactions", target.address);
			return Ok(ScanOutcome {
				candidates: Vec::new(),
				stats: tracker.get_stats(),
			});
		};
		if target.from_lt == Some(last.lt) {
			debug!("{} is up to date at lt {}", target.address, last.lt);
			return Ok(ScanOutcome {
				candidates: Vec::new(),
				stats: tracker.get_stats(),
			});
		}

		let wallets = self.resolve_wallets(&target.address, cancel).await?;
		info!(
			"Starting chain scan of {} from lt {} down to {:?}",
			target.address, last.lt, target.from_lt
		);

		let mut newest_first = Vec::new();
		let mut cursor = last;
		// the API repeats the cursor transaction at the head of every following page
		let mut repeated: Option<TransactionId> = None;

		'pages: loop {
			let page = self
				.chain
				.list_transactions(target.address.address(), self.page_size, &cursor, cancel)
				.await?;
			tracker.record_page(page.len());

			for tx in &page {
				if repeated == Some(tx.id) {
					tracker.record_duplicate();
					continue;
				}
				if reached_cursor(tx.id.lt, target.from_lt) {
					break 'pages;
				}
				tracker.record_visited(tx.id.lt);
				match self.decoder.decode(tx, &target.address, &wallets) {
					Some(candidate) => {
						tracker.record_candidate();
						newest_first.push(candidate);
					}
					None => tracker.record_rejected(),
				}
			}

			let Some(tail) = page.last().map(|tx| tx.id) else {
				break;
			};
			if page.len() < self.page_size {
				break;
			}
			if tail == cursor {
				warn!(lt = tail.lt, "Chain page did not advance past its cursor, stopping the scan");
				break;
			}
			repeated = Some(tail);
			cursor = tail;
		}

		newest_first.reverse();
		let stats = tracker.get_stats();
		debug!("{}", stats.summary());
		Ok(ScanOutcome {
			candidates: newest_first,
			stats,
		})
	}

	fn name(&self) -> &'static str {
		"chain"
	}
}

/// Fallback strategy: pages pre-decoded operations from the jetton history indexer
pub struct IndexerScan {
	indexer: Arc<dyn IndexerApi>,
	decoder: MessageDecoder,
	jettons: AcceptedJettons,
	page_size: usize,
}

impl IndexerScan {
	pub fn new(
		indexer: Arc<dyn IndexerApi>,
		codec: AddressCodec,
		jettons: AcceptedJettons,
		page_size: usize,
	) -> Self {
		Self {
			indexer,
			decoder: MessageDecoder::new(codec),
			jettons,
			page_size,
		}
	}
}

#[async_trait::async_trait]
impl ScanStrategy for IndexerScan {
	async fn scan(
		&self,
		target: &ScanTarget,
		cancel: &CancellationToken,
	) -> Result<ScanOutcome, SyncError> {
		let mut tracker =
			ScanProgressTracker::new(target.address.to_string(), SyncSource::Indexer);
		info!(
			"Starting indexer scan of {} down to {:?}",
			target.address, target.from_lt
		);

		let mut newest_first = Vec::new();
		let mut before_lt: Option<u64> = None;

		'pages: loop {
			let page = self
				.indexer
				.jetton_history(target.address.address(), before_lt, self.page_size, cancel)
				.await?;
			tracker.record_page(page.len());

			for op in &page {
				if before_lt.is_some_and(|before| op.lt >= before) {
					tracker.record_duplicate();
					continue;
				}
				if reached_cursor(op.lt, target.from_lt) {
					break 'pages;
				}
				tracker.record_visited(op.lt);
				match self
					.decoder
					.decode_operation(op, &target.address, &self.jettons)
				{
					Some(candidate) => {
						tracker.record_candidate();
						newest_first.push(candidate);
					}
					None => tracker.record_rejected(),
				}
			}

			let Some(oldest) = page.iter().map(|op| op.lt).min() else {
				break;
			};
			if page.len() < self.page_size || before_lt.is_some_and(|before| oldest >= before) {
				break;
			}
			before_lt = Some(oldest);
		}

		newest_first.reverse();
		let stats = tracker.get_stats();
		debug!("{}", stats.summary());
		Ok(ScanOutcome {
			candidates: newest_first,
			stats,
		})
	}

	fn name(&self) -> &'static str {
		"indexer"
	}
}
