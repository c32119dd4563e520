use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::Network;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
	#[error("raw address must look like 'workchain:hex', got {0:?}")]
	InvalidRaw(String),
	#[error("user-friendly address must be 48 base64 characters, got {0}")]
	InvalidLength(usize),
	#[error("invalid base64 in address: {0}")]
	InvalidBase64(String),
	#[error("unknown address tag 0x{0:02x}")]
	InvalidTag(u8),
	#[error("address checksum mismatch")]
	ChecksumMismatch,
}

/// Identity of a standard account: workchain plus 256-bit account id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
	pub workchain: i32,
	pub hash: [u8; 32],
}

/// Flags carried by the user-friendly encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFlags {
	pub bounceable: bool,
	pub testnet: bool,
}

impl Address {
	pub fn new(workchain: i32, hash: [u8; 32]) -> Self {
		Self { workchain, hash }
	}

	/// Parses either form and also returns the flags found in a user-friendly string.
	pub fn parse_with_flags(s: &str) -> Result<(Self, Option<AddressFlags>), AddressError> {
		let s = s.trim();
		if s.contains(':') {
			return Self::parse_raw(s).map(|a| (a, None));
		}

		if s.len() != 48 {
			return Err(AddressError::InvalidLength(s.len()));
		}
		let engine = if s.contains('-') || s.contains('_') {
			&URL_SAFE
		} else {
			&STANDARD
		};
		let bytes = engine
			.decode(s)
			.map_err(|e| AddressError::InvalidBase64(e.to_string()))?;
		// 48 base64 chars always decode to 36 bytes
		let expected = crc16(&bytes[..34]);
		if bytes[34..36] != expected.to_be_bytes() {
			return Err(AddressError::ChecksumMismatch);
		}

		let tag = bytes[0];
		let testnet = tag & TAG_TESTNET != 0;
		let bounceable = match tag & !TAG_TESTNET {
			TAG_BOUNCEABLE => true,
			TAG_NON_BOUNCEABLE => false,
			_ => return Err(AddressError::InvalidTag(tag)),
		};

		let mut hash = [0u8; 32];
		hash.copy_from_slice(&bytes[2..34]);
		Ok((
			Self {
				workchain: bytes[1] as i8 as i32,
				hash,
			},
			Some(AddressFlags {
				bounceable,
				testnet,
			}),
		))
	}

	fn parse_raw(s: &str) -> Result<Self, AddressError> {
		let (wc, hex_part) = s
			.split_once(':')
			.ok_or_else(|| AddressError::InvalidRaw(s.to_string()))?;
		// standard addresses carry an int8 workchain
		let workchain = wc
			.parse::<i8>()
			.map_err(|_| AddressError::InvalidRaw(s.to_string()))? as i32;
		let decoded =
			hex::decode(hex_part).map_err(|_| AddressError::InvalidRaw(s.to_string()))?;
		let hash: [u8; 32] = decoded
			.try_into()
			.map_err(|_| AddressError::InvalidRaw(s.to_string()))?;
		Ok(Self { workchain, hash })
	}

	/// `workchain:hex` form, lowercase.
	pub fn to_raw(&self) -> String {
		format!("{}:{}", self.workchain, hex::encode(self.hash))
	}

	/// Url-safe user-friendly form with the given flags.
	pub fn to_friendly(&self, flags: AddressFlags) -> String {
		let mut tag = if flags.bounceable {
			TAG_BOUNCEABLE
		} else {
			TAG_NON_BOUNCEABLE
		};
		if flags.testnet {
			tag |= TAG_TESTNET;
		}

		let mut bytes = Vec::with_capacity(36);
		bytes.push(tag);
		bytes.push(self.workchain as i8 as u8);
		bytes.extend_from_slice(&self.hash);
		let crc = crc16(&bytes);
		bytes.extend_from_slice(&crc.to_be_bytes());
		URL_SAFE.encode(bytes)
	}
}

impl FromStr for Address {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse_with_flags(s).map(|(address, _)| address)
	}
}

/// Address in the one form used for comparison and storage.
///
/// The bounceable flag is always set and the testnet flag follows the configured network, so
/// the same wallet compares equal no matter which textual form an API returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalizedAddress {
	address: Address,
	testnet: bool,
}

impl NormalizedAddress {
	pub fn address(&self) -> &Address {
		&self.address
	}

	pub fn to_raw(&self) -> String {
		self.address.to_raw()
	}
}

impl fmt::Display for NormalizedAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.address.to_friendly(AddressFlags {
			bounceable: true,
			testnet: self.testnet,
		}))
	}
}

/// Canonicalizes addresses for one network.
#[derive(Debug, Clone, Copy)]
pub struct AddressCodec {
	network: Network,
}

impl AddressCodec {
	pub fn new(network: Network) -> Self {
		Self { network }
	}

	pub fn network(&self) -> Network {
		self.network
	}

	pub fn canonicalize(&self, address: &Address) -> NormalizedAddress {
		NormalizedAddress {
			address: *address,
			testnet: self.network.is_testnet(),
		}
	}

	pub fn parse(&self, s: &str) -> Result<NormalizedAddress, AddressError> {
		Ok(self.canonicalize(&s.parse()?))
	}
}

/// CRC-16/XMODEM as used by the user-friendly address checksum.
fn crc16(data: &[u8]) -> u16 {
	let mut crc: u16 = 0;
	for byte in data {
		crc ^= (*byte as u16) << 8;
		for _ in 0..8 {
			crc = if crc & 0x8000 != 0 {
				(crc << 1) ^ 0x1021
			} else {
				crc << 1
			};
		}
	}
	crc
}
