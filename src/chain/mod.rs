//! Primary ledger access over a toncenter-compatible HTTP API.
//!
//! The client answers four questions for the sync engine: what is the current masterchain head,
//! is an account active and what is its last transaction, which transactions precede a given
//! one, and which jetton wallet contract belongs to a given owner. Every call takes the shared
//! cancellation token so a shutdown interrupts in-flight requests.

/// HTTP implementation of [`ChainApi`]
mod client;
/// Wire and domain types for chain access
mod types;

pub use client::TonCenterClient;
pub use types::*;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ton::Address;

/// Read access to the ledger used by the primary scan.
#[async_trait]
pub trait ChainApi: Send + Sync {
	/// Latest masterchain block.
	async fn masterchain_head(&self, cancel: &CancellationToken) -> Result<BlockRef, ChainError>;

	/// Account activity and last transaction as of `block`.
	async fn account_state(
		&self,
		address: &Address,
		block: &BlockRef,
		cancel: &CancellationToken,
	) -> Result<AccountState, ChainError>;

	/// Up to `limit` transactions of `address`, newest first, starting with `from` itself.
	async fn list_transactions(
		&self,
		address: &Address,
		limit: usize,
		from: &TransactionId,
		cancel: &CancellationToken,
	) -> Result<Vec<RawTransaction>, ChainError>;

	/// Address of the jetton wallet contract `master` deployed for `owner`.
	async fn jetton_wallet(
		&self,
		master: &Address,
		owner: &Address,
		cancel: &CancellationToken,
	) -> Result<Address, ChainError>;
}
