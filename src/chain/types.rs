//! Types for the toncenter v2 API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

use crate::ton::CellError;
use crate::utils::Cancelled;

/// Masterchain block the account state is read at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockRef {
	pub workchain: i32,
	pub shard: String,
	pub seqno: u32,
}

/// Logical time plus hash, the pagination key of transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId {
	pub lt: u64,
	pub hash: [u8; 32],
}

impl TransactionId {
	pub fn hash_hex(&self) -> String {
		hex::encode(self.hash)
	}
}

impl fmt::Display for TransactionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.lt, self.hash_hex())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
	pub active: bool,
	/// `None` for an account without any transaction yet.
	pub last: Option<TransactionId>,
}

/// A transaction as listed by the API; the BOC is decoded later by the message decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
	pub id: TransactionId,
	pub utime: u64,
	pub data: Vec<u8>,
}

/// Error types for chain API access
#[derive(Debug, Error)]
pub enum ChainError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("API error {code}: {message}")]
	Api { code: i64, message: String },

	#[error("Invalid response: {0}")]
	InvalidResponse(String),

	#[error("Cell error: {0}")]
	Cell(#[from] CellError),

	#[error(transparent)]
	Cancelled(#[from] Cancelled),
}

/// `{"ok": bool, "result": T}` or `{"ok": false, "error": "...", "code": n}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
	pub ok: bool,
	pub result: Option<T>,
	pub error: Option<String>,
	pub code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MasterchainInfo {
	pub last: BlockRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTransactionId {
	#[serde(deserialize_with = "u64_from_string")]
	pub lt: u64,
	#[serde(default)]
	pub hash: String,
}

impl WireTransactionId {
	/// `None` when the id is the all-zero placeholder of an account without history.
	pub fn into_id(self) -> Result<Option<TransactionId>, ChainError> {
		if self.lt == 0 {
			return Ok(None);
		}
		let bytes = STANDARD
			.decode(&self.hash)
			.map_err(|e| ChainError::InvalidResponse(format!("transaction hash: {}", e)))?;
		let hash: [u8; 32] = bytes.try_into().map_err(|_| {
			ChainError::InvalidResponse("transaction hash must be 32 bytes".to_string())
		})?;
		Ok(Some(TransactionId { lt: self.lt, hash }))
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddressInformation {
	pub state: String,
	pub last_transaction_id: WireTransactionId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTransaction {
	pub transaction_id: WireTransactionId,
	pub utime: u64,
	pub data: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunGetMethodResult {
	pub exit_code: i32,
	pub stack: Vec<(String, serde_json::Value)>,
}

/// Accepts both `"123"` and `123`.
pub(crate) fn u64_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum StringOrNumber {
		String(String),
		Number(u64),
	}

	match StringOrNumber::deserialize(deserializer)? {
		StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
		StringOrNumber::Number(n) => Ok(n),
	}
}
