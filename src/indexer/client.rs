//!
//! HTTP client for the tonapi jetton history endpoint.
//!
//! Requests are spaced by a [`Throttle`] so the configured requests-per-second budget of the
//! provider is never exceeded, even when several pages are fetched back to back. Waiting for the
//! next slot is cancellable.

use super::IndexerApi;
use super::types::*;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ton::Address;
use crate::utils::{Cancelled, cancellable};

/// Spaces consecutive calls at least `min_interval` apart.
pub struct Throttle {
	min_interval: Duration,
	last: Mutex<Option<Instant>>,
}

impl Throttle {
	pub fn per_second(requests: u32) -> Self {
		Self {
			min_interval: Duration::from_secs(1) / requests.max(1),
			last: Mutex::new(None),
		}
	}

	/// Waits for the next free slot and claims it.
	pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
		let mut last = self.last.lock().await;
		if let Some(previous) = *last {
			let ready = previous + self.min_interval;
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Cancelled),
				_ = tokio::time::sleep_until(ready) => {}
			}
		}
		*last = Some(Instant::now());
		Ok(())
	}
}

/// tonapi client
pub struct TonApiClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL, e.g. `https://tonapi.io`.
	base_url: String,
	/// Bearer token, optional for the free tier.
	api_key: Option<String>,
	throttle: Throttle,
}

impl TonApiClient {
	/// Create a new indexer client.
	///
	/// # Arguments
	/// * `base_url` - API root, the `/v2/...` paths are appended.
	/// * `api_key` - Optional bearer token.
	/// * `requests_per_second` - Request budget granted by the provider.
	/// * `timeout` - Per-request timeout.
	pub fn new(
		base_url: String,
		api_key: Option<String>,
		requests_per_second: u32,
		timeout: Duration,
	) -> Result<Self, IndexerError> {
		let http_client = Client::builder().timeout(timeout).build()?;
		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
			api_key,
			throttle: Throttle::per_second(requests_per_second),
		})
	}

	async fn fetch_page(
		&self,
		account: &Address,
		before_lt: Option<u64>,
		limit: usize,
	) -> Result<Vec<JettonOperation>, IndexerError> {
		let url = format!(
			"{}/v2/accounts/{}/jettons/history",
			self.base_url,
			account.to_raw()
		);
		let mut query = vec![("limit", limit.to_string())];
		if let Some(lt) = before_lt {
			query.push(("before_lt", lt.to_string()));
		}
		debug!("GET {} {:?}", url, query);

		let mut request = self.http_client.get(&url).query(&query);
		if let Some(key) = &self.api_key {
			request = request.bearer_auth(key);
		}
		let response = request.send().await?;
		let status = response.status();
		let body = response.text().await?;
		parse_history(status, &body)
	}
}

pub(crate) fn parse_history(
	status: StatusCode,
	body: &str,
) -> Result<Vec<JettonOperation>, IndexerError> {
	if !status.is_success() {
		let message = serde_json::from_str::<ApiErrorBody>(body)
			.map(|e| e.error)
			.unwrap_or_else(|_| body.chars().take(256).collect());
		return Err(IndexerError::ApiError {
			status: status.as_u16(),
			message,
		});
	}
	let page: JettonHistoryPage = serde_json::from_str(body)?;
	Ok(page.operations)
}

#[async_trait]
impl IndexerApi for TonApiClient {
	async fn jetton_history(
		&self,
		account: &Address,
		before_lt: Option<u64>,
		limit: usize,
		cancel: &CancellationToken,
	) -> Result<Vec<JettonOperation>, IndexerError> {
		self.throttle.acquire(cancel).await?;
		cancellable(cancel, self.fetch_page(account, before_lt, limit)).await
	}
}
