//! Types for the jetton history endpoint

use serde::{Deserialize, Serialize};

use crate::utils::Cancelled;

/// Kind of jetton operation reported by the indexer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
	Transfer,
	Mint,
	Burn,
	#[serde(other)]
	Other,
}

/// Account reference inside an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRef {
	/// Raw `workchain:hex` address.
	pub address: String,
}

/// Jetton master reference inside an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JettonRef {
	/// Raw address of the jetton master contract.
	pub address: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub decimals: u32,
}

/// One jetton operation from the aggregated history.
///
/// Amounts are integer strings in the jetton's smallest unit; the forwarded payload is kept as
/// raw JSON and interpreted by the message decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JettonOperation {
	pub operation: OperationKind,
	pub utime: i64,
	pub lt: u64,
	pub transaction_hash: String,
	pub source: Option<AccountRef>,
	pub destination: Option<AccountRef>,
	pub amount: String,
	pub jetton: JettonRef,
	#[serde(default)]
	pub payload: Option<serde_json::Value>,
}

/// Text comment envelope used by the indexer for forwarded payloads.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PayloadEnvelope {
	#[serde(rename = "SumType")]
	pub sum_type: String,
	#[serde(rename = "OpCode", default)]
	pub op_code: i64,
	#[serde(rename = "Value", default)]
	pub value: Option<PayloadText>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PayloadText {
	#[serde(rename = "Text")]
	pub text: String,
}

/// Response body of `/v2/accounts/{id}/jettons/history`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JettonHistoryPage {
	#[serde(default)]
	pub operations: Vec<JettonOperation>,
}

/// Error body returned by the indexer
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
	pub error: String,
}

/// Error types for indexer operations
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("Indexer returned {status}: {message}")]
	ApiError { status: u16, message: String },

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error(transparent)]
	Cancelled(#[from] Cancelled),
}
