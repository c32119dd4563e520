//! Low-level TON ledger primitives.
//!
//! This module holds everything needed to read ledger data without a node library:
//! addresses and their canonical form, the bag-of-cells container format, and the typed
//! transaction and message structures decoded from cells.

/// Address parsing, formatting and canonicalization
pub mod address;
/// Cells, bag-of-cells (de)serialization and bit readers
pub mod cell;
/// Typed transaction and message structures
pub mod tlb;

#[cfg(test)]
pub(crate) mod fixtures;

pub use address::{Address, AddressCodec, AddressError, NormalizedAddress};
pub use cell::{Cell, CellBuilder, CellError, CellSlice};

use serde::{Deserialize, Serialize};

/// Ledger network the service is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Mainnet,
	Testnet,
}

impl Network {
	pub fn is_testnet(&self) -> bool {
		matches!(self, Network::Testnet)
	}
}

impl std::fmt::Display for Network {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Network::Mainnet => f.write_str("mainnet"),
			Network::Testnet => f.write_str("testnet"),
		}
	}
}
