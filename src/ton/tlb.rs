//! Typed views over transaction and message cells.
//!
//! Only the fields needed to judge whether a transaction carried a successful inbound jetton
//! transfer are kept. Everything else is skipped structurally so that a malformed cell still
//! fails to parse instead of being silently accepted.

use std::sync::Arc;

use super::{Address, Cell, CellError, CellSlice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgAddress {
	None,
	External { bit_len: usize },
	Std(Address),
	Var { workchain: i32, bit_len: usize },
}

impl MsgAddress {
	pub fn as_std(&self) -> Option<&Address> {
		match self {
			MsgAddress::Std(address) => Some(address),
			_ => None,
		}
	}
}

/// Reads any `MsgAddress` constructor.
pub fn load_msg_address(slice: &mut CellSlice<'_>) -> Result<MsgAddress, CellError> {
	match slice.load_uint(2)? {
		0b00 => Ok(MsgAddress::None),
		0b01 => {
			let bit_len = slice.load_uint(9)? as usize;
			slice.skip_bits(bit_len)?;
			Ok(MsgAddress::External { bit_len })
		}
		0b10 => {
			skip_anycast(slice)?;
			let workchain = slice.load_int(8)? as i32;
			let bytes = slice.load_bytes(32)?;
			let mut hash = [0u8; 32];
			hash.copy_from_slice(&bytes);
			Ok(MsgAddress::Std(Address::new(workchain, hash)))
		}
		_ => {
			skip_anycast(slice)?;
			let bit_len = slice.load_uint(9)? as usize;
			let workchain = slice.load_int(32)? as i32;
			slice.skip_bits(bit_len)?;
			Ok(MsgAddress::Var { workchain, bit_len })
		}
	}
}

fn skip_anycast(slice: &mut CellSlice<'_>) -> Result<(), CellError> {
	if slice.load_bit()? {
		let depth = slice.load_uint(5)? as usize;
		slice.skip_bits(depth)?;
	}
	Ok(())
}

fn skip_currency_collection(slice: &mut CellSlice<'_>) -> Result<(), CellError> {
	slice.load_coins()?;
	slice.skip_dict()
}

fn skip_maybe_coins(slice: &mut CellSlice<'_>) -> Result<(), CellError> {
	if slice.load_bit()? {
		slice.load_coins()?;
	}
	Ok(())
}

fn skip_status_change(slice: &mut CellSlice<'_>) -> Result<(), CellError> {
	// acst_unchanged$0, acst_frozen$10, acst_deleted$11
	if slice.load_bit()? {
		slice.load_bit()?;
	}
	Ok(())
}

fn skip_storage_used_short(slice: &mut CellSlice<'_>) -> Result<(), CellError> {
	slice.load_var_uint(3)?;
	slice.load_var_uint(3)?;
	Ok(())
}

/// `StateInit`, only walked over.
fn skip_state_init(slice: &mut CellSlice<'_>) -> Result<(), CellError> {
	if slice.load_bit()? {
		slice.skip_bits(5)?;
	}
	if slice.load_bit()? {
		slice.skip_bits(2)?;
	}
	slice.load_maybe_ref()?;
	slice.load_maybe_ref()?;
	slice.skip_dict()
}

/// Header of a message. External messages only matter as something to reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonMsgInfo {
	Internal {
		bounced: bool,
		src: MsgAddress,
		dest: MsgAddress,
		created_at: u32,
	},
	ExternalIn,
	ExternalOut,
}

impl CommonMsgInfo {
	fn parse(slice: &mut CellSlice<'_>) -> Result<Self, CellError> {
		if !slice.load_bit()? {
			slice.skip_bits(2)?; // ihr_disabled, bounce
			let bounced = slice.load_bit()?;
			let src = load_msg_address(slice)?;
			let dest = load_msg_address(slice)?;
			skip_currency_collection(slice)?;
			slice.load_coins()?; // ihr_fee
			slice.load_coins()?; // fwd_fee
			slice.skip_bits(64)?; // created_lt
			let created_at = slice.load_uint(32)? as u32;
			return Ok(CommonMsgInfo::Internal {
				bounced,
				src,
				dest,
				created_at,
			});
		}

		if !slice.load_bit()? {
			load_msg_address(slice)?; // src
			load_msg_address(slice)?; // dest
			slice.load_coins()?; // import_fee
			Ok(CommonMsgInfo::ExternalIn)
		} else {
			load_msg_address(slice)?; // src
			load_msg_address(slice)?; // dest
			slice.skip_bits(64 + 32)?; // created_lt, created_at
			Ok(CommonMsgInfo::ExternalOut)
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub info: CommonMsgInfo,
	pub body: Arc<Cell>,
}

impl Message {
	pub fn parse(mut slice: CellSlice<'_>) -> Result<Self, CellError> {
		let info = CommonMsgInfo::parse(&mut slice)?;

		if slice.load_bit()? {
			if slice.load_bit()? {
				slice.load_ref_cell()?;
			} else {
				skip_state_init(&mut slice)?;
			}
		}

		let body = if slice.load_bit()? {
			slice.load_ref_cell()?.clone()
		} else {
			Arc::new(slice.to_cell())
		};

		Ok(Self { info, body })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeSkipReason {
	NoState,
	BadState,
	NoGas,
	Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputePhase {
	Skipped(ComputeSkipReason),
	Vm { success: bool, exit_code: i32 },
}

impl ComputePhase {
	fn parse(slice: &mut CellSlice<'_>) -> Result<Self, CellError> {
		if !slice.load_bit()? {
			let reason = match slice.load_uint(2)? {
				0b00 => ComputeSkipReason::NoState,
				0b01 => ComputeSkipReason::BadState,
				0b10 => ComputeSkipReason::NoGas,
				_ => match slice.load_bit()? {
					false => ComputeSkipReason::Suspended,
					true => {
						return Err(CellError::InvalidTag {
							what: "compute skip reason",
							tag: 0b111,
						});
					}
				},
			};
			return Ok(ComputePhase::Skipped(reason));
		}

		let success = slice.load_bit()?;
		slice.load_bit()?; // msg_state_used
		slice.load_bit()?; // account_activated
		slice.load_coins()?; // gas_fees

		let mut details = slice.load_ref()?;
		details.load_var_uint(3)?; // gas_used
		details.load_var_uint(3)?; // gas_limit
		if details.load_bit()? {
			details.load_var_uint(2)?; // gas_credit
		}
		details.load_int(8)?; // mode
		let exit_code = details.load_int(32)? as i32;

		Ok(ComputePhase::Vm { success, exit_code })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPhase {
	pub result_code: i32,
}

impl ActionPhase {
	fn parse(mut slice: CellSlice<'_>) -> Result<Self, CellError> {
		slice.skip_bits(3)?; // success, valid, no_funds
		skip_status_change(&mut slice)?;
		skip_maybe_coins(&mut slice)?; // total_fwd_fees
		skip_maybe_coins(&mut slice)?; // total_action_fees
		let result_code = slice.load_int(32)? as i32;
		Ok(Self { result_code })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BouncePhase {
	NegativeFunds,
	NoFunds,
	Ok,
}

impl BouncePhase {
	fn parse(slice: &mut CellSlice<'_>) -> Result<Self, CellError> {
		if slice.load_bit()? {
			skip_storage_used_short(slice)?;
			slice.load_coins()?; // msg_fees
			slice.load_coins()?; // fwd_fees
			return Ok(BouncePhase::Ok);
		}
		if slice.load_bit()? {
			skip_storage_used_short(slice)?;
			slice.load_coins()?; // req_fwd_fees
			Ok(BouncePhase::NoFunds)
		} else {
			Ok(BouncePhase::NegativeFunds)
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinaryDescr {
	pub compute: ComputePhase,
	pub action: Option<ActionPhase>,
	pub bounce: Option<BouncePhase>,
}

impl OrdinaryDescr {
	fn parse(slice: &mut CellSlice<'_>) -> Result<Self, CellError> {
		slice.load_bit()?; // credit_first

		if slice.load_bit()? {
			slice.load_coins()?; // storage_fees_collected
			skip_maybe_coins(slice)?; // storage_fees_due
			skip_status_change(slice)?;
		}
		if slice.load_bit()? {
			skip_maybe_coins(slice)?; // due_fees_collected
			skip_currency_collection(slice)?;
		}

		let compute = ComputePhase::parse(slice)?;
		let action = match slice.load_maybe_ref()? {
			Some(action) => Some(ActionPhase::parse(action)?),
			None => None,
		};
		slice.load_bit()?; // aborted
		let bounce = if slice.load_bit()? {
			Some(BouncePhase::parse(slice)?)
		} else {
			None
		};
		slice.load_bit()?; // destroyed

		Ok(Self {
			compute,
			action,
			bounce,
		})
	}
}

/// Transaction kind. Only ordinary transactions are decoded in depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionDescr {
	Ordinary(OrdinaryDescr),
	Storage,
	TickTock,
	SplitPrepare,
	SplitInstall,
	MergePrepare,
	MergeInstall,
}

impl TransactionDescr {
	pub fn parse(mut slice: CellSlice<'_>) -> Result<Self, CellError> {
		let tag = slice.load_uint(4)?;
		Ok(match tag {
			0b0000 => TransactionDescr::Ordinary(OrdinaryDescr::parse(&mut slice)?),
			0b0001 => TransactionDescr::Storage,
			0b0010 | 0b0011 => TransactionDescr::TickTock,
			0b0100 => TransactionDescr::SplitPrepare,
			0b0101 => TransactionDescr::SplitInstall,
			0b0110 => TransactionDescr::MergePrepare,
			0b0111 => TransactionDescr::MergeInstall,
			other => {
				return Err(CellError::InvalidTag {
					what: "transaction description",
					tag: other,
				});
			}
		})
	}

	pub fn kind(&self) -> &'static str {
		match self {
			TransactionDescr::Ordinary(_) => "ordinary",
			TransactionDescr::Storage => "storage",
			TransactionDescr::TickTock => "tick_tock",
			TransactionDescr::SplitPrepare => "split_prepare",
			TransactionDescr::SplitInstall => "split_install",
			TransactionDescr::MergePrepare => "merge_prepare",
			TransactionDescr::MergeInstall => "merge_install",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	pub lt: u64,
	pub in_msg: Option<Message>,
	pub description: TransactionDescr,
}

const TRANSACTION_TAG: u64 = 0b0111;

impl Transaction {
	pub fn parse(cell: &Cell) -> Result<Self, CellError> {
		let mut slice = cell.parse();

		let tag = slice.load_uint(4)?;
		if tag != TRANSACTION_TAG {
			return Err(CellError::InvalidTag {
				what: "transaction",
				tag,
			});
		}

		slice.skip_bits(256)?; // account_addr
		let lt = slice.load_uint(64)?;
		// prev_trans_hash, prev_trans_lt, now, outmsg_cnt, orig_status, end_status
		slice.skip_bits(256 + 64 + 32 + 15 + 2 + 2)?;

		let mut messages = slice.load_ref()?;
		let in_msg = match messages.load_maybe_ref()? {
			Some(msg) => Some(Message::parse(msg)?),
			None => None,
		};

		skip_currency_collection(&mut slice)?; // total_fees
		slice.load_ref_cell()?; // state_update
		let description = TransactionDescr::parse(slice.load_ref()?)?;

		Ok(Self {
			lt,
			in_msg,
			description,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ton::CellBuilder;
	use crate::ton::fixtures::{self, TxFixture};

	#[test]
	fn test_parse_ordinary_transaction() {
		let fixture = TxFixture::default();
		let cell = fixture.build();
		let tx = Transaction::parse(&cell).expect("Failed while parsing transaction");

		assert_eq!(tx.lt, fixture.lt);
		let msg = tx.in_msg.expect("inbound message");
		match msg.info {
			CommonMsgInfo::Internal {
				bounced, src, dest, created_at, ..
			} => {
				assert!(!bounced);
				assert_eq!(src.as_std(), Some(&fixture.source));
				assert_eq!(dest.as_std(), Some(&fixture.destination));
				assert_eq!(created_at, fixture.now);
			}
			other => panic!("unexpected message info {:?}", other),
		}
		match tx.description {
			TransactionDescr::Ordinary(descr) => {
				assert_eq!(descr.compute, ComputePhase::Skipped(ComputeSkipReason::NoGas));
				assert!(descr.action.is_none());
				assert!(descr.bounce.is_none());
			}
			other => panic!("unexpected description {:?}", other),
		}
	}

	#[test]
	fn test_parse_phases() {
		let fixture = TxFixture {
			compute: ComputePhase::Vm {
				success: false,
				exit_code: -14,
			},
			action_result: Some(37),
			bounce: Some(BouncePhase::NoFunds),
			..TxFixture::default()
		};
		let tx = Transaction::parse(&fixture.build()).unwrap();
		let TransactionDescr::Ordinary(descr) = tx.description else {
			panic!("expected ordinary description");
		};
		assert_eq!(
			descr.compute,
			ComputePhase::Vm {
				success: false,
				exit_code: -14
			}
		);
		assert_eq!(descr.action.map(|a| a.result_code), Some(37));
		assert_eq!(descr.bounce, Some(BouncePhase::NoFunds));
	}

	#[test]
	fn test_non_ordinary_and_undefined_descriptions() {
		let storage = CellBuilder::new().store_uint(0b0001, 4).build().unwrap();
		assert_eq!(
			TransactionDescr::parse(storage.parse()).unwrap(),
			TransactionDescr::Storage
		);

		let tick = CellBuilder::new().store_uint(0b0011, 4).build().unwrap();
		assert_eq!(TransactionDescr::parse(tick.parse()).unwrap().kind(), "tick_tock");

		let undefined = CellBuilder::new().store_uint(0b1010, 4).build().unwrap();
		assert!(matches!(
			TransactionDescr::parse(undefined.parse()),
			Err(CellError::InvalidTag { tag: 0b1010, .. })
		));
	}

	#[test]
	fn test_rejects_wrong_transaction_tag() {
		let cell = CellBuilder::new().store_uint(0b0110, 4).build().unwrap();
		assert!(matches!(
			Transaction::parse(&cell),
			Err(CellError::InvalidTag {
				what: "transaction",
				..
			})
		));
	}

	#[test]
	fn test_inline_and_referenced_bodies_are_equivalent() {
		let body = fixtures::text_comment_body(0, "hello");
		let inline = fixtures::internal_message(
			&fixtures::address(1),
			&fixtures::address(2),
			7,
			&body,
			false,
		);
		let referenced = fixtures::internal_message(
			&fixtures::address(1),
			&fixtures::address(2),
			7,
			&body,
			true,
		);
		let a = Message::parse(inline.parse()).unwrap();
		let b = Message::parse(referenced.parse()).unwrap();
		assert_eq!(a.body, b.body);
		assert_eq!(a.info, b.info);
	}

	#[test]
	fn test_msg_address_variants() {
		let cell = CellBuilder::new()
			.store_uint(0b00, 2)
			.store_uint(0b01, 2)
			.store_uint(16, 9)
			.store_uint(0xbeef, 16)
			.store_address(&fixtures::address(9))
			.build()
			.unwrap();
		let mut slice = cell.parse();
		assert_eq!(load_msg_address(&mut slice).unwrap(), MsgAddress::None);
		assert_eq!(
			load_msg_address(&mut slice).unwrap(),
			MsgAddress::External { bit_len: 16 }
		);
		assert_eq!(
			load_msg_address(&mut slice).unwrap().as_std(),
			Some(&fixtures::address(9))
		);
	}

	fn encoded(hex_boc: &str) -> Transaction {
		let bytes = hex::decode(hex_boc).unwrap();
		Transaction::parse(&Cell::from_boc(&bytes).unwrap()).unwrap()
	}

	fn internal_header(tx: &Transaction) -> (&MsgAddress, &MsgAddress, u32) {
		match &tx.in_msg.as_ref().expect("inbound message").info {
			CommonMsgInfo::Internal {
				bounced: false,
				src,
				dest,
				created_at,
			} => (src, dest, *created_at),
			other => panic!("unexpected message info {:?}", other),
		}
	}

	#[test]
	fn test_parse_encoded_no_gas_transaction() {
		let tx = encoded(fixtures::ENCODED_NO_GAS_NOTIFICATION_TX);
		assert_eq!(tx.lt, 47_000_000_000_003);

		let wallet: Address = fixtures::ENCODED_JETTON_WALLET.parse().unwrap();
		let merchant: Address = fixtures::ENCODED_MERCHANT.parse().unwrap();
		let (src, dest, created_at) = internal_header(&tx);
		assert_eq!(src.as_std(), Some(&wallet));
		assert_eq!(dest.as_std(), Some(&merchant));
		assert_eq!(created_at, 1_717_000_123);

		let TransactionDescr::Ordinary(descr) = tx.description else {
			panic!("expected ordinary description");
		};
		assert_eq!(descr.compute, ComputePhase::Skipped(ComputeSkipReason::NoGas));
		assert!(descr.action.is_none());
		assert!(descr.bounce.is_none());

		let body = tx.in_msg.unwrap().body;
		assert_eq!(body.parse().load_uint(32).unwrap(), 0x7362_d09c);
	}

	#[test]
	fn test_parse_encoded_vm_transaction() {
		let tx = encoded(fixtures::ENCODED_VM_NOTIFICATION_TX);
		assert_eq!(tx.lt, 47_000_000_000_117);
		assert_eq!(internal_header(&tx).2, 1_717_000_456);

		let TransactionDescr::Ordinary(descr) = tx.description else {
			panic!("expected ordinary description");
		};
		assert_eq!(
			descr.compute,
			ComputePhase::Vm {
				success: true,
				exit_code: 0
			}
		);
		assert_eq!(descr.action, Some(ActionPhase { result_code: 0 }));
		assert!(descr.bounce.is_none());
	}
}
