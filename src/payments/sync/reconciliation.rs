//! Reconciliation of decoded transfers against pending payments.
//!
//! A batch of candidates is applied inside one store transaction: every candidate is persisted
//! (matched or not, as an audit trail), and a payment whose id appears as a transfer comment is
//! completed when the transfer covers the required amount. Any store failure aborts the whole
//! batch; the next scheduled run re-applies it, which is safe because transfer rows are keyed by
//! `(tx_hash, tx_lt)` and payment status is re-checked.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::repositories::{StoreTransaction, TransferStore};
use crate::payments::{PaymentStatus, StoreError, TransferCandidate, TransferRecord};
use crate::utils::{Cancelled, cancellable};

/// Counts of one applied batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
	/// Transfer rows written (after deduplication by the caller).
	pub persisted: usize,
	/// Payments completed by this batch.
	pub applied: usize,
}

pub struct ReconciliationEngine {
	store: Arc<dyn TransferStore>,
}

impl ReconciliationEngine {
	pub fn new(store: Arc<dyn TransferStore>) -> Self {
		Self { store }
	}

	/// Applies `candidates` atomically.
	pub async fn apply(
		&self,
		candidates: &[TransferCandidate],
		cancel: &CancellationToken,
	) -> Result<ApplyReport, StoreError> {
		if candidates.is_empty() {
			return Ok(ApplyReport::default());
		}
		if cancel.is_cancelled() {
			return Err(Cancelled.into());
		}

		let mut tx = cancellable(cancel, self.store.begin()).await?;
		let mut records = Vec::with_capacity(candidates.len());
		let mut applied = 0;
		for candidate in candidates {
			let is_applied = self.settle(tx.as_mut(), candidate, cancel).await?;
			if is_applied {
				applied += 1;
			}
			records.push(TransferRecord {
				transfer: candidate.clone(),
				is_applied,
			});
		}

		cancellable(cancel, tx.upsert_transfers(&records)).await?;
		// not raced against cancellation: the outcome of an interrupted commit would be unknown
		tx.commit().await?;

		Ok(ApplyReport {
			persisted: records.len(),
			applied,
		})
	}

	/// Completes the payment named by the transfer comment if the transfer pays for it.
	async fn settle(
		&self,
		tx: &mut dyn StoreTransaction,
		candidate: &TransferCandidate,
		cancel: &CancellationToken,
	) -> Result<bool, StoreError> {
		let Ok(payment_id) = Uuid::parse_str(candidate.comment.trim()) else {
			debug!(
				tx_hash = %candidate.tx_hash,
				"Transfer comment is not a payment id"
			);
			return Ok(false);
		};

		let Some(payment) = cancellable(cancel, tx.payment_by_id(payment_id)).await? else {
			warn!(
				tx_hash = %candidate.tx_hash,
				payment_id = %payment_id,
				"Transfer references an unknown payment"
			);
			return Ok(false);
		};

		if payment.status != PaymentStatus::Pending {
			info!(
				tx_hash = %candidate.tx_hash,
				payment_id = %payment_id,
				status = ?payment.status,
				"Payment is not pending, leaving it unchanged"
			);
			return Ok(false);
		}

		if let Some(required_jetton) = &payment.jetton_name {
			if required_jetton != &candidate.jetton_name {
				warn!(
					tx_hash = %candidate.tx_hash,
					payment_id = %payment_id,
					expected = %required_jetton,
					received = %candidate.jetton_name,
					"Transfer is in a different jetton than the payment"
				);
				return Ok(false);
			}
		}

		let Some(required) = payment.jetton_amount else {
			warn!(
				tx_hash = %candidate.tx_hash,
				payment_id = %payment_id,
				"Payment has no jetton amount"
			);
			return Ok(false);
		};

		if candidate.amount < required {
			warn!(
				tx_hash = %candidate.tx_hash,
				payment_id = %payment_id,
				required = %required,
				received = %candidate.amount,
				"Underpayment, payment stays pending"
			);
			return Ok(false);
		}

		cancellable(
			cancel,
			tx.update_payment_status(payment_id, PaymentStatus::Completed),
		)
		.await?;
		info!(
			tx_hash = %candidate.tx_hash,
			payment_id = %payment_id,
			amount = %candidate.amount,
			jetton = %candidate.jetton_name,
			"Payment completed"
		);
		Ok(true)
	}
}
