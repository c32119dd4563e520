use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned when the shutdown token fires before an operation completes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Races `fut` against `cancel`. Cancellation wins ties, so nothing starts after shutdown.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, E>
where
	F: Future<Output = Result<T, E>>,
	E: From<Cancelled>,
{
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Cancelled.into()),
		result = fut => result,
	}
}
