//! Decoding of inbound jetton transfer notifications.
//!
//! Arbitrary ledger traffic reaches a merchant address: plain coin transfers, bounces, failed
//! executions, notifications from jettons nobody accepts. The decoder turns each transaction (or
//! indexer operation) into either a [`TransferCandidate`] or a [`Rejection`]. Rejections are
//! logged and never propagated, since re-decoding immutable ledger data gives the same answer.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::chain::RawTransaction;
use crate::indexer::{JettonOperation, OperationKind, PayloadEnvelope};
use crate::payments::{AcceptedJetton, AcceptedJettons, TransferCandidate};
use crate::ton::tlb::{
	CommonMsgInfo, ComputePhase, ComputeSkipReason, Transaction, TransactionDescr,
	load_msg_address,
};
use crate::ton::{AddressCodec, Cell, CellError, CellSlice, NormalizedAddress};
use crate::utils::{parse_units, units_to_decimal};

/// `transfer_notification` op code of the jetton standard.
pub const TRANSFER_NOTIFICATION_OP: u64 = 0x7362_d09c;
/// Forward payload op code of a plain text comment.
const TEXT_COMMENT_OP: u64 = 0;
const TEXT_COMMENT_SUM_TYPE: &str = "TextComment";

/// Why a transaction did not yield a transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
	#[error("malformed cell data: {0}")]
	Malformed(#[from] CellError),
	#[error("transaction description is {0}, not ordinary")]
	NotOrdinary(&'static str),
	#[error("transaction includes a bounce phase")]
	BouncePhase,
	#[error("compute phase skipped: {0:?}")]
	ComputeSkipped(ComputeSkipReason),
	#[error("compute phase exit code is {0}")]
	ComputeExitCode(i32),
	#[error("action phase result code is {0}")]
	ActionResultCode(i32),
	#[error("no inbound message")]
	NoInboundMessage,
	#[error("inbound message is not internal")]
	NotInternal,
	#[error("inbound message bounced")]
	Bounced,
	#[error("destination is not the scanned address")]
	DestinationMismatch,
	#[error("sender is not a wallet of an accepted jetton")]
	UnknownJettonWallet,
	#[error("message body is empty")]
	EmptyPayload,
	#[error("op code {0:#x} is not transfer_notification")]
	NotTransferNotification(u64),
	#[error("original sender is not a standard address")]
	UnsupportedSender,
	#[error("forward payload is not a text comment")]
	NotTextComment,
	#[error("amount does not fit the jetton precision")]
	AmountOutOfRange,
	#[error("operation is not a transfer")]
	NotTransfer,
	#[error("jetton {0} is not accepted")]
	UnknownJetton(String),
	#[error("operation has no source")]
	MissingSource,
	#[error("invalid address {0:?}")]
	InvalidAddress(String),
	#[error("invalid amount {0:?}")]
	InvalidAmount(String),
	#[error("timestamp {0} is out of range")]
	InvalidTimestamp(i64),
}

impl Rejection {
	/// Ordinary unrelated traffic, as opposed to failed or malformed transfers.
	pub fn is_noise(&self) -> bool {
		matches!(
			self,
			Rejection::NoInboundMessage
				| Rejection::NotInternal
				| Rejection::DestinationMismatch
				| Rejection::UnknownJettonWallet
				| Rejection::EmptyPayload
				| Rejection::NotTransferNotification(_)
				| Rejection::NotTransfer
		)
	}
}

/// Jetton wallet contracts owned by the scanned address, keyed by wallet address.
#[derive(Debug, Clone, Default)]
pub struct JettonWalletIndex {
	wallets: HashMap<NormalizedAddress, AcceptedJetton>,
}

impl JettonWalletIndex {
	pub fn insert(&mut self, wallet: NormalizedAddress, jetton: AcceptedJetton) {
		self.wallets.insert(wallet, jetton);
	}

	pub fn get(&self, wallet: &NormalizedAddress) -> Option<&AcceptedJetton> {
		self.wallets.get(wallet)
	}

	pub fn len(&self) -> usize {
		self.wallets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.wallets.is_empty()
	}
}

struct Notification {
	amount: u128,
	sender: NormalizedAddress,
	comment: String,
}

/// Turns transactions and indexer operations into transfer candidates.
#[derive(Debug, Clone, Copy)]
pub struct MessageDecoder {
	codec: AddressCodec,
}

impl MessageDecoder {
	pub fn new(codec: AddressCodec) -> Self {
		Self { codec }
	}

	/// Decodes one listed transaction, logging the reason when it is not a valid transfer.
	pub fn decode(
		&self,
		tx: &RawTransaction,
		expected: &NormalizedAddress,
		wallets: &JettonWalletIndex,
	) -> Option<TransferCandidate> {
		match self.try_decode(tx, expected, wallets) {
			Ok(candidate) => Some(candidate),
			Err(rejection) => {
				log_rejection(&rejection, &tx.id.hash_hex(), tx.id.lt);
				None
			}
		}
	}

	pub fn try_decode(
		&self,
		tx: &RawTransaction,
		expected: &NormalizedAddress,
		wallets: &JettonWalletIndex,
	) -> Result<TransferCandidate, Rejection> {
		let root = Cell::from_boc(&tx.data)?;
		let parsed = Transaction::parse(&root)?;
		check_phases(&parsed.description)?;

		let message = parsed.in_msg.as_ref().ok_or(Rejection::NoInboundMessage)?;
		let CommonMsgInfo::Internal {
			bounced,
			src,
			dest,
			created_at,
			..
		} = &message.info
		else {
			return Err(Rejection::NotInternal);
		};
		if *bounced {
			return Err(Rejection::Bounced);
		}

		let destination = dest
			.as_std()
			.map(|address| self.codec.canonicalize(address))
			.ok_or(Rejection::DestinationMismatch)?;
		if destination != *expected {
			return Err(Rejection::DestinationMismatch);
		}

		let jetton = src
			.as_std()
			.map(|address| self.codec.canonicalize(address))
			.and_then(|wallet| wallets.get(&wallet))
			.ok_or(Rejection::UnknownJettonWallet)?;

		if message.body.is_empty() {
			return Err(Rejection::EmptyPayload);
		}
		let notification = self.parse_notification(message.body.parse())?;
		let amount = units_to_decimal(notification.amount, jetton.decimals)
			.ok_or(Rejection::AmountOutOfRange)?;

		Ok(TransferCandidate {
			tx_hash: tx.id.hash_hex(),
			tx_lt: tx.id.lt,
			sender: notification.sender.to_string(),
			receiver: destination.to_string(),
			jetton_name: jetton.name.clone(),
			amount,
			comment: notification.comment,
			created_at: timestamp(*created_at as i64)?,
		})
	}

	fn parse_notification(&self, mut body: CellSlice<'_>) -> Result<Notification, Rejection> {
		let op = body.load_uint(32)?;
		if op != TRANSFER_NOTIFICATION_OP {
			return Err(Rejection::NotTransferNotification(op));
		}
		body.load_uint(64)?; // query_id
		let amount = body.load_coins()?;
		let sender = load_msg_address(&mut body)?
			.as_std()
			.map(|address| self.codec.canonicalize(address))
			.ok_or(Rejection::UnsupportedSender)?;

		// forward_payload:(Either Cell ^Cell)
		let comment = if body.load_bit()? {
			read_text_comment(body.load_ref()?)?
		} else {
			read_text_comment(body)?
		};

		Ok(Notification {
			amount,
			sender,
			comment,
		})
	}

	/// Decodes one operation from the indexer history.
	pub fn decode_operation(
		&self,
		op: &JettonOperation,
		expected: &NormalizedAddress,
		jettons: &AcceptedJettons,
	) -> Option<TransferCandidate> {
		match self.try_decode_operation(op, expected, jettons) {
			Ok(candidate) => Some(candidate),
			Err(rejection) => {
				log_rejection(&rejection, &op.transaction_hash, op.lt);
				None
			}
		}
	}

	pub fn try_decode_operation(
		&self,
		op: &JettonOperation,
		expected: &NormalizedAddress,
		jettons: &AcceptedJettons,
	) -> Result<TransferCandidate, Rejection> {
		if op.operation != OperationKind::Transfer {
			return Err(Rejection::NotTransfer);
		}

		let destination = op
			.destination
			.as_ref()
			.ok_or(Rejection::DestinationMismatch)
			.and_then(|dest| self.parse_address(&dest.address))?;
		if destination != *expected {
			return Err(Rejection::DestinationMismatch);
		}

		let master = self.parse_address(&op.jetton.address)?;
		let jetton = jettons
			.by_master(master.address())
			.ok_or_else(|| Rejection::UnknownJetton(op.jetton.address.clone()))?;

		let source = op
			.source
			.as_ref()
			.ok_or(Rejection::MissingSource)
			.and_then(|source| self.parse_address(&source.address))?;

		let payload: PayloadEnvelope = op
			.payload
			.clone()
			.and_then(|payload| serde_json::from_value(payload).ok())
			.ok_or(Rejection::NotTextComment)?;
		if payload.sum_type != TEXT_COMMENT_SUM_TYPE || payload.op_code != TEXT_COMMENT_OP as i64 {
			return Err(Rejection::NotTextComment);
		}
		let comment = payload.value.ok_or(Rejection::NotTextComment)?.text;
		check_comment(&comment)?;

		let amount = parse_units(&op.amount, jetton.decimals)
			.ok_or_else(|| Rejection::InvalidAmount(op.amount.clone()))?;

		Ok(TransferCandidate {
			tx_hash: op.transaction_hash.to_lowercase(),
			tx_lt: op.lt,
			sender: source.to_string(),
			receiver: destination.to_string(),
			jetton_name: jetton.name.clone(),
			amount,
			comment,
			created_at: timestamp(op.utime)?,
		})
	}

	fn parse_address(&self, raw: &str) -> Result<NormalizedAddress, Rejection> {
		self.codec
			.parse(raw)
			.map_err(|_| Rejection::InvalidAddress(raw.to_string()))
	}
}

/// Rejects every transaction that is not an ordinary, fully successful execution.
fn check_phases(description: &TransactionDescr) -> Result<(), Rejection> {
	let TransactionDescr::Ordinary(descr) = description else {
		return Err(Rejection::NotOrdinary(description.kind()));
	};
	if descr.bounce.is_some() {
		return Err(Rejection::BouncePhase);
	}
	match descr.compute {
		// a bare notification carries too little value to pay for gas
		ComputePhase::Skipped(ComputeSkipReason::NoGas) => {}
		ComputePhase::Skipped(reason) => return Err(Rejection::ComputeSkipped(reason)),
		ComputePhase::Vm {
			success: true,
			exit_code: 0,
		} => {}
		ComputePhase::Vm { exit_code, .. } => return Err(Rejection::ComputeExitCode(exit_code)),
	}
	match descr.action {
		Some(action) if action.result_code != 0 => {
			Err(Rejection::ActionResultCode(action.result_code))
		}
		_ => Ok(()),
	}
}

fn read_text_comment(mut payload: CellSlice<'_>) -> Result<String, Rejection> {
	if payload.remaining_bits() < 32 {
		return Err(Rejection::NotTextComment);
	}
	if payload.load_uint(32)? != TEXT_COMMENT_OP {
		return Err(Rejection::NotTextComment);
	}
	let comment = payload.load_string_snake()?;
	check_comment(&comment)?;
	Ok(comment)
}

/// Text columns cannot hold NUL.
fn check_comment(comment: &str) -> Result<(), Rejection> {
	if comment.contains('\0') {
		return Err(Rejection::NotTextComment);
	}
	Ok(())
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, Rejection> {
	DateTime::from_timestamp(seconds, 0).ok_or(Rejection::InvalidTimestamp(seconds))
}

fn log_rejection(rejection: &Rejection, tx_hash: &str, lt: u64) {
	if rejection.is_noise() {
		debug!(tx_hash, lt, reason = %rejection, "Skipping transaction");
	} else {
		warn!(tx_hash, lt, reason = %rejection, "Rejected jetton transfer");
	}
}
