//!
//! Small helpers shared by the API clients and the sync engine.
//!
//! Re-exports the jetton amount conversion and the cancellation helpers.
/// Conversion of integer jetton units to decimals
pub mod amount;
/// Cancellation of in-flight network and persistence calls
pub mod cancel;

pub use amount::{parse_units, units_to_decimal};
pub use cancel::{Cancelled, cancellable};
