//! In-process fakes of the ledger APIs for strategy and orchestrator tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::chain::{AccountState, BlockRef, ChainApi, ChainError, RawTransaction, TransactionId};
use crate::indexer::{IndexerApi, IndexerError, JettonOperation};
use crate::ton::Address;
use crate::utils::Cancelled;

/// Ledger holding the transactions of one account, newest first.
#[derive(Default)]
pub(crate) struct FakeChain {
	pub active: bool,
	pub transactions: Vec<RawTransaction>,
	/// `(master, owner) -> wallet`
	pub wallets: HashMap<(Address, Address), Address>,
	pub list_calls: AtomicUsize,
	pub wallet_calls: AtomicUsize,
	/// Fail every listing with an API error.
	pub fail_listing: bool,
}

impl FakeChain {
	/// Transactions are given in any order and stored newest first.
	pub fn with_transactions(mut transactions: Vec<RawTransaction>) -> Self {
		transactions.sort_by(|a, b| b.id.lt.cmp(&a.id.lt));
		Self {
			active: true,
			transactions,
			..Self::default()
		}
	}

	pub fn last_id(&self) -> Option<TransactionId> {
		self.transactions.first().map(|tx| tx.id)
	}
}

#[async_trait]
impl ChainApi for FakeChain {
	async fn masterchain_head(&self, cancel: &CancellationToken) -> Result<BlockRef, ChainError> {
		if cancel.is_cancelled() {
			return Err(Cancelled.into());
		}
		Ok(BlockRef {
			workchain: -1,
			shard: "8000000000000000".to_string(),
			seqno: 1,
		})
	}

	async fn account_state(
		&self,
		_address: &Address,
		_block: &BlockRef,
		cancel: &CancellationToken,
	) -> Result<AccountState, ChainError> {
		if cancel.is_cancelled() {
			return Err(Cancelled.into());
		}
		Ok(AccountState {
			active: self.active,
			last: self.last_id(),
		})
	}

	async fn list_transactions(
		&self,
		_address: &Address,
		limit: usize,
		from: &TransactionId,
		cancel: &CancellationToken,
	) -> Result<Vec<RawTransaction>, ChainError> {
		self.list_calls.fetch_add(1, Ordering::SeqCst);
		if cancel.is_cancelled() {
			return Err(Cancelled.into());
		}
		if self.fail_listing {
			return Err(ChainError::Api {
				code: 500,
				message: "lite server timeout".to_string(),
			});
		}
		let start = self
			.transactions
			.iter()
			.position(|tx| tx.id == *from)
			.ok_or_else(|| ChainError::InvalidResponse(format!("unknown transaction {}", from)))?;
		Ok(self.transactions[start..]
			.iter()
			.take(limit)
			.cloned()
			.collect())
	}

	async fn jetton_wallet(
		&self,
		master: &Address,
		owner: &Address,
		_cancel: &CancellationToken,
	) -> Result<Address, ChainError> {
		self.wallet_calls.fetch_add(1, Ordering::SeqCst);
		self.wallets
			.get(&(*master, *owner))
			.copied()
			.ok_or_else(|| ChainError::Api {
				code: 404,
				message: "no jetton wallet".to_string(),
			})
	}
}

/// Jetton history of one account, newest first.
#[derive(Default)]
pub(crate) struct FakeIndexer {
	pub operations: Vec<JettonOperation>,
	/// `before_lt` of every call, in order.
	pub cursors: Mutex<Vec<Option<u64>>>,
}

impl FakeIndexer {
	pub fn with_operations(mut operations: Vec<JettonOperation>) -> Self {
		operations.sort_by(|a, b| b.lt.cmp(&a.lt));
		Self {
			operations,
			..Self::default()
		}
	}

	pub fn calls(&self) -> usize {
		self.cursors.lock().unwrap().len()
	}
}

#[async_trait]
impl IndexerApi for FakeIndexer {
	async fn jetton_history(
		&self,
		_account: &Address,
		before_lt: Option<u64>,
		limit: usize,
		cancel: &CancellationToken,
	) -> Result<Vec<JettonOperation>, IndexerError> {
		self.cursors.lock().unwrap().push(before_lt);
		if cancel.is_cancelled() {
			return Err(Cancelled.into());
		}
		Ok(self
			.operations
			.iter()
			.filter(|op| before_lt.is_none_or(|before| op.lt < before))
			.take(limit)
			.cloned()
			.collect())
	}
}
