use rust_decimal::Decimal;

/// Converts an amount in the jetton's smallest unit to a decimal with `decimals` places.
///
/// Returns `None` when the value does not fit into a 96-bit decimal mantissa or the precision
/// exceeds 28 places.
pub fn units_to_decimal(amount: u128, decimals: u32) -> Option<Decimal> {
	let mantissa = i128::try_from(amount).ok()?;
	Decimal::try_from_i128_with_scale(mantissa, decimals).ok()
}

/// Parses a base-10 unit string as returned by HTTP indexers.
pub fn parse_units(amount: &str, decimals: u32) -> Option<Decimal> {
	let units = amount.trim().parse::<u128>().ok()?;
	units_to_decimal(units, decimals)
}
