use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::chain::ChainError;
use crate::indexer::IndexerError;
use crate::ton::{Address, AddressError};
use crate::utils::Cancelled;

/// A jetton the merchant accepts as payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedJetton {
	pub name: String,
	/// Jetton master contract.
	pub master: Address,
	/// Decimal places of one whole token.
	pub decimals: u32,
}

/// Allow-list of accepted jettons, looked up by master address.
#[derive(Debug, Clone, Default)]
pub struct AcceptedJettons {
	jettons: Vec<AcceptedJetton>,
}

impl AcceptedJettons {
	pub fn new(jettons: Vec<AcceptedJetton>) -> Self {
		Self { jettons }
	}

	pub fn by_master(&self, master: &Address) -> Option<&AcceptedJetton> {
		self.jettons.iter().find(|j| &j.master == master)
	}

	pub fn iter(&self) -> impl Iterator<Item = &AcceptedJetton> {
		self.jettons.iter()
	}

	pub fn len(&self) -> usize {
		self.jettons.len()
	}

	pub fn is_empty(&self) -> bool {
		self.jettons.is_empty()
	}
}

/// A validated inbound jetton transfer, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCandidate {
	/// Hex encoded transaction hash.
	pub tx_hash: String,
	pub tx_lt: u64,
	/// Owner wallet that initiated the transfer.
	pub sender: String,
	/// Merchant address the transfer was credited to.
	pub receiver: String,
	pub jetton_name: String,
	pub amount: Decimal,
	pub comment: String,
	pub created_at: DateTime<Utc>,
}

impl TransferCandidate {
	/// Identity of the on-chain event.
	pub fn key(&self) -> (&str, u64) {
		(&self.tx_hash, self.tx_lt)
	}
}

/// Row of the `jetton_transfers` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
	pub transfer: TransferCandidate,
	pub is_applied: bool,
}

/// Payment status as stored in the `payment_status` enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Pending,
	Completed,
	Failed,
	Refunded,
	PendingRefund,
}

/// The subset of a payment row the reconciliation reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingPayment {
	pub id: Uuid,
	pub status: PaymentStatus,
	/// Required amount in whole tokens. `None` means the payment is not payable on-chain.
	pub jetton_amount: Option<Decimal>,
	/// Jetton the payment must be made in, any accepted jetton when `None`.
	pub jetton_name: Option<String>,
}

/// Where the transfers of one scan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
	Chain,
	Indexer,
}

impl fmt::Display for SyncSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncSource::Chain => f.write_str("chain"),
			SyncSource::Indexer => f.write_str("indexer"),
		}
	}
}

/// Outcome of syncing one receiving address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
	pub address: String,
	pub source: SyncSource,
	/// Transactions or operations looked at.
	pub visited: usize,
	/// Transfers that passed decoding and deduplication.
	pub candidates: usize,
	pub persisted: usize,
	pub applied: usize,
}

/// Error types for persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Migration error: {0}")]
	Migration(#[from] sqlx::migrate::MigrateError),

	#[error("Value out of range: {0}")]
	OutOfRange(String),

	#[error(transparent)]
	Cancelled(#[from] Cancelled),
}

/// Error types for syncing one address
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Invalid address: {0}")]
	Address(#[from] AddressError),

	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),

	#[error("Indexer error: {0}")]
	Indexer(#[from] IndexerError),

	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	#[error(transparent)]
	Cancelled(#[from] Cancelled),
}

impl SyncError {
	/// True when the failure only reflects a shutdown in progress.
	pub fn is_cancelled(&self) -> bool {
		matches!(
			self,
			SyncError::Cancelled(_)
				| SyncError::Chain(ChainError::Cancelled(_))
				| SyncError::Indexer(IndexerError::Cancelled(_))
				| SyncError::Store(StoreError::Cancelled(_))
		)
	}
}
