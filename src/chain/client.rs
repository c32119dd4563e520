//!
//! HTTP client for the toncenter v2 API.
//!
//! Thin request/response mapping: each [`ChainApi`] method is one API call. Errors are surfaced
//! unchanged to the caller; a failed request aborts the current scan and is retried by the next
//! scheduled run.

use super::ChainApi;
use super::types::*;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ton::tlb::load_msg_address;
use crate::ton::{Address, Cell, CellBuilder};
use crate::utils::cancellable;

const API_KEY_HEADER: &str = "X-API-Key";

/// toncenter v2 client
#[derive(Clone)]
pub struct TonCenterClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL, e.g. `https://toncenter.com/api/v2`.
	base_url: String,
	api_key: Option<String>,
}

impl TonCenterClient {
	/// Create a new client.
	///
	/// # Arguments
	/// * `base_url` - API root without a trailing method name.
	/// * `api_key` - Optional key sent as `X-API-Key`.
	/// * `timeout` - Per-request timeout.
	pub fn new(
		base_url: String,
		api_key: Option<String>,
		timeout: Duration,
	) -> Result<Self, ChainError> {
		let http_client = Client::builder().timeout(timeout).build()?;
		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			api_key,
		})
	}

	fn url(&self, method: &str) -> String {
		format!("{}/{}", self.base_url, method)
	}

	async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ChainError> {
		let request = match &self.api_key {
			Some(key) => request.header(API_KEY_HEADER, key),
			None => request,
		};
		let response = request.send().await?;
		let status = response.status();
		let body = response.text().await?;
		decode_envelope(status, &body)
	}

	async fn get<T: DeserializeOwned>(
		&self,
		method: &str,
		query: &[(&str, String)],
	) -> Result<T, ChainError> {
		debug!("GET {} {:?}", method, query);
		self.send(self.http_client.get(self.url(method)).query(query))
			.await
	}
}

/// Unwraps the `{ok, result}` envelope, mapping failures to [`ChainError::Api`].
pub(crate) fn decode_envelope<T: DeserializeOwned>(
	status: StatusCode,
	body: &str,
) -> Result<T, ChainError> {
	let envelope: Envelope<T> = match serde_json::from_str(body) {
		Ok(envelope) => envelope,
		Err(_) if !status.is_success() => {
			return Err(ChainError::Api {
				code: status.as_u16() as i64,
				message: body.chars().take(256).collect(),
			});
		}
		Err(e) => return Err(ChainError::InvalidResponse(e.to_string())),
	};

	match envelope {
		Envelope {
			ok: true,
			result: Some(result),
			..
		} => Ok(result),
		Envelope { error, code, .. } => Err(ChainError::Api {
			code: code.unwrap_or(status.as_u16() as i64),
			message: error.unwrap_or_else(|| "response without result".to_string()),
		}),
	}
}

/// Reads the address returned by `get_wallet_address`.
pub(crate) fn wallet_from_stack(result: RunGetMethodResult) -> Result<Address, ChainError> {
	if result.exit_code != 0 {
		return Err(ChainError::Api {
			code: result.exit_code as i64,
			message: "get_wallet_address failed".to_string(),
		});
	}
	let (kind, value) = result
		.stack
		.into_iter()
		.next()
		.ok_or_else(|| ChainError::InvalidResponse("empty get-method stack".to_string()))?;
	let boc = value
		.get("bytes")
		.and_then(|bytes| bytes.as_str())
		.ok_or_else(|| {
			ChainError::InvalidResponse(format!("unexpected stack entry of type {}", kind))
		})?;

	let cell = Cell::from_boc_base64(boc)?;
	let mut slice = cell.parse();
	load_msg_address(&mut slice)?
		.as_std()
		.copied()
		.ok_or_else(|| ChainError::InvalidResponse("jetton wallet is not a std address".to_string()))
}

#[async_trait]
impl ChainApi for TonCenterClient {
	async fn masterchain_head(&self, cancel: &CancellationToken) -> Result<BlockRef, ChainError> {
		let info: MasterchainInfo =
			cancellable(cancel, self.get("getMasterchainInfo", &[])).await?;
		Ok(info.last)
	}

	async fn account_state(
		&self,
		address: &Address,
		block: &BlockRef,
		cancel: &CancellationToken,
	) -> Result<AccountState, ChainError> {
		let query = [
			("address", address.to_raw()),
			("seqno", block.seqno.to_string()),
		];
		let info: AddressInformation =
			cancellable(cancel, self.get("getAddressInformation", &query)).await?;

		Ok(AccountState {
			active: info.state == "active",
			last: info.last_transaction_id.into_id()?,
		})
	}

	async fn list_transactions(
		&self,
		address: &Address,
		limit: usize,
		from: &TransactionId,
		cancel: &CancellationToken,
	) -> Result<Vec<RawTransaction>, ChainError> {
		let query = [
			("address", address.to_raw()),
			("limit", limit.to_string()),
			("lt", from.lt.to_string()),
			("hash", from.hash_hex()),
			("archival", "true".to_string()),
		];
		let transactions: Vec<WireTransaction> =
			cancellable(cancel, self.get("getTransactions", &query)).await?;

		let mut out = Vec::with_capacity(transactions.len());
		for tx in transactions {
			let id = tx.transaction_id.into_id()?.ok_or_else(|| {
				ChainError::InvalidResponse("listed transaction without id".to_string())
			})?;
			let data = STANDARD
				.decode(&tx.data)
				.map_err(|e| ChainError::InvalidResponse(format!("transaction data: {}", e)))?;
			out.push(RawTransaction {
				id,
				utime: tx.utime,
				data,
			});
		}
		Ok(out)
	}

	async fn jetton_wallet(
		&self,
		master: &Address,
		owner: &Address,
		cancel: &CancellationToken,
	) -> Result<Address, ChainError> {
		let owner_cell = CellBuilder::new().store_address(owner).build()?;
		let body = json!({
			"address": master.to_raw(),
			"method": "get_wallet_address",
			"stack": [["tvm.Slice", owner_cell.to_boc_base64()]],
		});
		let request = self.http_client.post(self.url("runGetMethod")).json(&body);
		let result: RunGetMethodResult = cancellable(cancel, self.send(request)).await?;
		wallet_from_stack(result)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ton::fixtures;

	#[test]
	fn test_decode_masterchain_info() {
		let body = r#"{"ok":true,"result":{"@type":"blocks.masterchainInfo","last":{"@type":"ton.blockIdExt","workchain":-1,"shard":"-9223372036854775808","seqno":41234567,"root_hash":"x","file_hash":"y"},"init":{}}}"#;
		let info: MasterchainInfo = decode_envelope(StatusCode::OK, body).unwrap();
		assert_eq!(info.last.seqno, 41234567);
		assert_eq!(info.last.workchain, -1);
	}

	#[test]
	fn test_decode_api_error() {
		let body = r#"{"ok":false,"error":"LITE_SERVER_UNKNOWN: cannot load block","code":500}"#;
		let err =
			decode_envelope::<MasterchainInfo>(StatusCode::INTERNAL_SERVER_ERROR, body).unwrap_err();
		assert!(matches!(err, ChainError::Api { code: 500, .. }));

		let err = decode_envelope::<MasterchainInfo>(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>")
			.unwrap_err();
		assert!(matches!(err, ChainError::Api { code: 502, .. }));

		let err = decode_envelope::<MasterchainInfo>(StatusCode::OK, "{").unwrap_err();
		assert!(matches!(err, ChainError::InvalidResponse(_)));
	}

	#[test]
	fn test_decode_address_information() {
		let hash = STANDARD.encode(fixtures::tx_hash(47_000_001));
		let body = format!(
			r#"{{"ok":true,"result":{{"balance":"1000","state":"active","last_transaction_id":{{"@type":"internal.transactionId","lt":"47000001","hash":"{}"}}}}}}"#,
			hash
		);
		let info: AddressInformation = decode_envelope(StatusCode::OK, &body).unwrap();
		assert_eq!(info.state, "active");
		let id = info.last_transaction_id.into_id().unwrap().unwrap();
		assert_eq!(id.lt, 47_000_001);
		assert_eq!(id.hash, fixtures::tx_hash(47_000_001));
	}

	#[test]
	fn test_uninitialized_account_has_no_last_transaction() {
		let body = r#"{"ok":true,"result":{"state":"uninitialized","last_transaction_id":{"lt":"0","hash":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="}}}"#;
		let info: AddressInformation = decode_envelope(StatusCode::OK, body).unwrap();
		assert_ne!(info.state, "active");
		assert_eq!(info.last_transaction_id.into_id().unwrap(), None);
	}

	#[test]
	fn test_decode_transactions() {
		let raw = fixtures::TxFixture::at(5).raw();
		let body = format!(
			r#"{{"ok":true,"result":[{{"@type":"raw.transaction","utime":{},"data":"{}","transaction_id":{{"lt":"5","hash":"{}"}},"fee":"0"}}]}}"#,
			raw.utime,
			STANDARD.encode(&raw.data),
			STANDARD.encode(raw.id.hash),
		);
		let txs: Vec<WireTransaction> = decode_envelope(StatusCode::OK, &body).unwrap();
		assert_eq!(txs.len(), 1);
		assert_eq!(txs[0].utime, raw.utime);
		assert_eq!(
			txs.into_iter().next().unwrap().transaction_id.into_id().unwrap(),
			Some(raw.id)
		);
	}

	#[test]
	fn test_wallet_from_get_method_stack() {
		let wallet = fixtures::address(77);
		let cell = CellBuilder::new().store_address(&wallet).build().unwrap();
		let body = format!(
			r#"{{"ok":true,"result":{{"gas_used":4000,"exit_code":0,"stack":[["cell",{{"bytes":"{}","object":{{}}}}]]}}}}"#,
			cell.to_boc_base64()
		);
		let result: RunGetMethodResult = decode_envelope(StatusCode::OK, &body).unwrap();
		assert_eq!(wallet_from_stack(result).unwrap(), wallet);
	}

	#[test]
	fn test_failed_get_method_is_an_error() {
		let result = RunGetMethodResult {
			exit_code: 11,
			stack: Vec::new(),
		};
		assert!(matches!(
			wallet_from_stack(result),
			Err(ChainError::Api { code: 11, .. })
		));
	}
}
