//! Builders for realistic transaction trees used across the test suites.

use std::sync::Arc;

use super::tlb::{BouncePhase, ComputePhase, ComputeSkipReason};
use super::{Address, Cell, CellBuilder};
use crate::chain::{RawTransaction, TransactionId};

pub(crate) const TRANSFER_NOTIFICATION: u32 = 0x7362_d09c;

pub(crate) fn address(n: u8) -> Address {
	Address::new(0, [n; 32])
}

pub(crate) fn tx_hash(lt: u64) -> [u8; 32] {
	let mut hash = [0xaa; 32];
	hash[24..].copy_from_slice(&lt.to_be_bytes());
	hash
}

fn store_var_uint(builder: &mut CellBuilder, value: u128, len_bits: usize) {
	let len = (128 - value.leading_zeros() as usize).div_ceil(8);
	builder.store_uint(len as u128, len_bits);
	builder.store_uint(value, len * 8);
}

/// Copies all bits and references of `cell` into `builder`.
pub(crate) fn append(builder: &mut CellBuilder, cell: &Cell) {
	let mut slice = cell.parse();
	while slice.remaining_bits() > 0 {
		let bit = slice.load_bit().unwrap();
		builder.store_bit(bit);
	}
	while slice.remaining_refs() > 0 {
		builder.store_ref(slice.load_ref_cell().unwrap().clone());
	}
}

/// Snake string, 127 bytes per cell.
pub(crate) fn snake(builder: &mut CellBuilder, text: &str) {
	let bytes = text.as_bytes();
	let first = bytes.len().min(120);
	builder.store_bytes(&bytes[..first]);
	let mut tail: Option<Arc<Cell>> = None;
	for chunk in bytes[first..].chunks(127).rev() {
		let mut next = CellBuilder::new();
		next.store_bytes(chunk);
		if let Some(child) = tail.take() {
			next.store_ref(child);
		}
		tail = Some(Arc::new(next.build().unwrap()));
	}
	if let Some(child) = tail {
		builder.store_ref(child);
	}
}

/// `op:uint32` followed by a snake string.
pub(crate) fn text_comment_body(op: u32, text: &str) -> Cell {
	let mut builder = CellBuilder::new();
	builder.store_uint(op as u128, 32);
	snake(&mut builder, text);
	builder.build().unwrap()
}

/// How the forward payload is attached to a transfer notification.
#[derive(Debug, Clone)]
pub(crate) enum ForwardPayload {
	Empty,
	Inline(Cell),
	Ref(Cell),
}

pub(crate) fn transfer_notification(amount: u128, sender: &Address, payload: ForwardPayload) -> Cell {
	let mut builder = CellBuilder::new();
	builder
		.store_uint(TRANSFER_NOTIFICATION as u128, 32)
		.store_uint(42, 64)
		.store_coins(amount)
		.store_address(sender);
	match payload {
		ForwardPayload::Empty => {
			builder.store_bit(false);
		}
		ForwardPayload::Inline(cell) => {
			builder.store_bit(false);
			append(&mut builder, &cell);
		}
		ForwardPayload::Ref(cell) => {
			builder.store_bit(true).store_ref(Arc::new(cell));
		}
	}
	builder.build().unwrap()
}

fn store_internal_info(
	builder: &mut CellBuilder,
	src: &Address,
	dest: &Address,
	created_at: u32,
	bounced: bool,
) {
	builder
		.store_bit(false)
		.store_bit(true) // ihr_disabled
		.store_bit(false) // bounce
		.store_bit(bounced)
		.store_address(src)
		.store_address(dest)
		.store_coins(50_000_000)
		.store_bit(false)
		.store_coins(0)
		.store_coins(1_000_000)
		.store_uint(created_at as u128 * 1000, 64)
		.store_uint(created_at as u128, 32);
}

fn store_body(builder: &mut CellBuilder, body: &Cell, as_ref: bool) {
	builder.store_bit(false); // no init
	if as_ref {
		builder.store_bit(true).store_ref(Arc::new(body.clone()));
	} else {
		builder.store_bit(false);
		append(builder, body);
	}
}

pub(crate) fn internal_message(
	src: &Address,
	dest: &Address,
	created_at: u32,
	body: &Cell,
	body_as_ref: bool,
) -> Cell {
	let mut builder = CellBuilder::new();
	store_internal_info(&mut builder, src, dest, created_at, false);
	store_body(&mut builder, body, body_as_ref);
	builder.build().unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InMsgKind {
	Internal,
	Bounced,
	ExternalIn,
	Missing,
}

/// Knobs for one transaction tree. `Default` is a successful transfer notification of
/// 5 units with a payment id comment.
#[derive(Debug, Clone)]
pub(crate) struct TxFixture {
	pub lt: u64,
	pub now: u32,
	pub source: Address,
	pub destination: Address,
	pub body: Cell,
	pub in_msg: InMsgKind,
	pub description_tag: u128,
	pub compute: ComputePhase,
	pub action_result: Option<i32>,
	pub bounce: Option<BouncePhase>,
}

pub(crate) const PAYMENT_ID: &str = "11111111-1111-1111-1111-111111111111";

pub(crate) fn owner() -> Address {
	address(3)
}

impl Default for TxFixture {
	fn default() -> Self {
		Self {
			lt: 1_000,
			now: 1_700_000_000,
			source: address(1),
			destination: address(2),
			body: transfer_notification(
				5_000_000,
				&owner(),
				ForwardPayload::Ref(text_comment_body(0, PAYMENT_ID)),
			),
			in_msg: InMsgKind::Internal,
			description_tag: 0b0000,
			compute: ComputePhase::Skipped(ComputeSkipReason::NoGas),
			action_result: None,
			bounce: None,
		}
	}
}

impl TxFixture {
	pub fn at(lt: u64) -> Self {
		Self {
			lt,
			now: 1_700_000_000 + lt as u32,
			..Self::default()
		}
	}

	fn message(&self) -> Option<Cell> {
		let mut builder = CellBuilder::new();
		match self.in_msg {
			InMsgKind::Missing => return None,
			InMsgKind::Internal | InMsgKind::Bounced => {
				store_internal_info(
					&mut builder,
					&self.source,
					&self.destination,
					self.now,
					self.in_msg == InMsgKind::Bounced,
				);
			}
			InMsgKind::ExternalIn => {
				builder
					.store_uint(0b10, 2)
					.store_uint(0b00, 2)
					.store_address(&self.destination)
					.store_coins(0);
			}
		}
		store_body(&mut builder, &self.body, true);
		Some(builder.build().unwrap())
	}

	fn description(&self) -> Cell {
		let mut builder = CellBuilder::new();
		builder.store_uint(self.description_tag, 4);
		if self.description_tag != 0 {
			return builder.build().unwrap();
		}

		builder.store_bit(false); // credit_first
		builder
			.store_bit(true)
			.store_coins(1_000)
			.store_bit(false)
			.store_bit(false);
		builder.store_bit(true).store_bit(false).store_coins(50_000_000).store_bit(false);

		match self.compute {
			ComputePhase::Skipped(reason) => {
				builder.store_bit(false);
				match reason {
					ComputeSkipReason::NoState => builder.store_uint(0b00, 2),
					ComputeSkipReason::BadState => builder.store_uint(0b01, 2),
					ComputeSkipReason::NoGas => builder.store_uint(0b10, 2),
					ComputeSkipReason::Suspended => builder.store_uint(0b110, 3),
				};
			}
			ComputePhase::Vm { success, exit_code } => {
				let mut details = CellBuilder::new();
				store_var_uint(&mut details, 3_308, 3);
				store_var_uint(&mut details, 1_000_000, 3);
				details
					.store_bit(false)
					.store_int(0, 8)
					.store_int(exit_code as i64, 32)
					.store_bit(false)
					.store_uint(68, 32)
					.store_uint(0, 256)
					.store_uint(0, 256);
				builder
					.store_bit(true)
					.store_bit(success)
					.store_bit(false)
					.store_bit(false)
					.store_coins(1_323_200)
					.store_ref(Arc::new(details.build().unwrap()));
			}
		}

		match self.action_result {
			Some(code) => {
				let mut action = CellBuilder::new();
				action
					.store_bit(code == 0)
					.store_bit(true)
					.store_bit(false)
					.store_bit(false)
					.store_bit(false)
					.store_bit(false)
					.store_int(code as i64, 32)
					.store_bit(false)
					.store_uint(0, 16)
					.store_uint(0, 16)
					.store_uint(0, 16)
					.store_uint(0, 16)
					.store_uint(0, 256);
				store_var_uint(&mut action, 0, 3);
				store_var_uint(&mut action, 0, 3);
				builder.store_bit(true).store_ref(Arc::new(action.build().unwrap()));
			}
			None => {
				builder.store_bit(false);
			}
		}

		builder.store_bit(false); // aborted
		match self.bounce {
			None => {
				builder.store_bit(false);
			}
			Some(BouncePhase::NegativeFunds) => {
				builder.store_bit(true).store_uint(0b00, 2);
			}
			Some(BouncePhase::NoFunds) => {
				builder.store_bit(true).store_uint(0b01, 2);
				store_var_uint(&mut builder, 1, 3);
				store_var_uint(&mut builder, 600, 3);
				builder.store_coins(7_000);
			}
			Some(BouncePhase::Ok) => {
				builder.store_bit(true).store_bit(true);
				store_var_uint(&mut builder, 1, 3);
				store_var_uint(&mut builder, 600, 3);
				builder.store_coins(0).store_coins(7_000);
			}
		}
		builder.store_bit(false); // destroyed
		builder.build().unwrap()
	}

	pub fn build(&self) -> Cell {
		let mut messages = CellBuilder::new();
		match self.message() {
			Some(msg) => {
				messages.store_bit(true).store_ref(Arc::new(msg));
			}
			None => {
				messages.store_bit(false);
			}
		}
		messages.store_bit(false); // out_msgs

		let mut builder = CellBuilder::new();
		builder
			.store_uint(0b0111, 4)
			.store_bytes(&self.destination.hash)
			.store_uint(self.lt as u128, 64)
			.store_uint(0, 256)
			.store_uint(self.lt.saturating_sub(1) as u128, 64)
			.store_uint(self.now as u128, 32)
			.store_uint(0, 15)
			.store_uint(0b10, 2)
			.store_uint(0b10, 2)
			.store_ref(Arc::new(messages.build().unwrap()))
			.store_coins(3_000_000)
			.store_bit(false)
			.store_ref(Arc::new(Cell::default()))
			.store_ref(Arc::new(self.description()));
		builder.build().unwrap()
	}

	pub fn raw(&self) -> RawTransaction {
		RawTransaction {
			id: TransactionId {
				lt: self.lt,
				hash: tx_hash(self.lt),
			},
			utime: self.now as u64,
			data: self.build().to_boc(),
		}
	}
}

/// Account of the merchant in the encoded transactions below.
pub(crate) const ENCODED_MERCHANT: &str = "0:9e786cce0d95f0f608958afef7a476a21f6c6fb3dce981d2ac054b5f1e9cb921";
/// Jetton wallet that sent both notifications.
pub(crate) const ENCODED_JETTON_WALLET: &str = "0:baf0b552501913dd03038ea511efeb69d4f7585b962e082d3e8d414fc6fee04f";
pub(crate) const ENCODED_PAYER: &str = "0:8d65fcf7d4880cd5224b36c33e43617cc519fc6514f79759f65fb571649dffab";

/// Transaction BOC encoded bit by bit from block.tlb, independently of [`CellBuilder`].
///
/// lt 47000000000003, now 1717000123. Compute skipped for lack of gas, aborted, no action phase.
/// The notification body is referenced and carries 5000000 units with an inline comment.
pub(crate) const ENCODED_NO_GAS_NOTIFICATION_TX: &str = concat!(
	"b5ee9c72010206010001630003b379e786cce0d95f0f608958afef7a476a21f6c6fb3dce981d2ac054b5f1e9cb921000",
	"02abf0a4df00384fd9bac333ad79154348296204fa7f8c537a96e08983e5f73b3f5aca8e8edf700002abf0a3eadc3665",
	"757bb00014409a480102030101a004008272cba06b5736faf67e54b07b561eae94395e774c517a7d910a54369e1263cc",
	"fbd411507a0e2f5e69d5dfa40a62a1bd7b6ee57e6bcd85c67c9b8431b36fff21c437000d0481348840492001ab680175",
	"e16aa4a03227ba06071d4a23dfd6d3a9eeb0b72c5c105a7d1a829f8dfdc09f00279e1b3383657c3d822562bfbde91da8",
	"87db1becf73a6074ab0152d7c7a72e484404060953800000557e149be004ccaeaf76c00500b27362d09c0000018f7a3b",
	"2c1134c4b408011acbf9efa91019aa44966d867c86c2f98a33f8ca29ef2eb3ecbf6ae2c93bff56000000003131313131",
	"3131312d313131312d313131312d313131312d313131313131313131313131",
);

/// lt 47000000000117, now 1717000456. Compute ran with exit code 0, action phase result 0.
/// The notification carries 125500000 units, its comment sits in a referenced cell.
pub(crate) const ENCODED_VM_NOTIFICATION_TX: &str = concat!(
	"b5ee9c72010209010001ee0003b379e786cce0d95f0f608958afef7a476a21f6c6fb3dce981d2ac054b5f1e9cb921000",
	"02abf0a4df07584fd9bac333ad79154348296204fa7f8c537a96e08983e5f73b3f5aca8e8edf700002abf0a3eae35665",
	"7590800014409a480102030101a004008272cba06b5736faf67e54b07b561eae94395e774c517a7d910a54369e1263cc",
	"fbd411507a0e2f5e69d5dfa40a62a1bd7b6ee57e6bcd85c67c9b8431b36fff21c437021304813488405865b3f6110506",
	"01ab680175e16aa4a03227ba06071d4a23dfd6d3a9eeb0b72c5c105a7d1a829f8dfdc09f00279e1b3383657c3d822562",
	"bfbde91da887db1becf73a6074ab0152d7c7a72e484404060953800000557e149be0e8ccaeb210c007009e4175cc3d09",
	"00000000000000000038ec18eac8d758b1eba52d3c10d39adc6dd9806472cb4ae069635d383d9086a513e8bc163c82ee",
	"e18733288c7d4ac636db3a6deb013ef2d37b68322be20edc45cc005dc840000000000000000000000000561b9ba8002c",
	"12d70a5b3ab6f3bc55aae0493b91c9a9d7c9f495703c55535e6a0401647362d09c0000018f7a3b2c114077afa608011a",
	"cbf9efa91019aa44966d867c86c2f98a33f8ca29ef2eb3ecbf6ae2c93bff570800500000000031313131313131312d31",
	"3131312d313131312d313131312d313131313131313131313131",
);
