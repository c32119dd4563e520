//! Fallback ledger access through a tonapi-compatible jetton history API.
//!
//! The aggregated history is used only for accounts the primary API reports as inactive, such as
//! a freshly provisioned wallet that has received funds but never sent a message. The provider
//! enforces a requests-per-second budget, so the client throttles itself before every call.

/// HTTP client with a self-imposed request budget
mod client;
/// Type definitions for jetton history data
mod types;

pub use client::{Throttle, TonApiClient};
pub use types::*;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ton::Address;

/// Paginated jetton operation history of one account.
#[async_trait]
pub trait IndexerApi: Send + Sync {
	/// Up to `limit` operations strictly older than `before_lt`, newest first.
	async fn jetton_history(
		&self,
		account: &Address,
		before_lt: Option<u64>,
		limit: usize,
		cancel: &CancellationToken,
	) -> Result<Vec<JettonOperation>, IndexerError>;
}
