//! Conversion between user-entered decimal amounts and on-chain integers.

use alloy_primitives::utils::{format_units, parse_units};
use dutch_types::U256;

use crate::error::ClientError;

/// Parse a positive decimal amount into base units.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, ClientError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(ClientError::InvalidAmount(amount.to_string()));
    }
    let value = parse_units(trimmed, decimals)
        .map_err(|e| ClientError::InvalidAmount(format!("{}: {}", amount, e)))?
        .get_absolute();
    if value.is_zero() {
        return Err(ClientError::InvalidAmount(amount.to_string()));
    }
    Ok(value)
}

/// Like [`parse_amount`] but for the 64-bit amounts confidential contracts take.
pub fn parse_amount_u64(amount: &str, decimals: u8) -> Result<u64, ClientError> {
    let value = parse_amount(amount, decimals)?;
    u64::try_from(value)
        .map_err(|_| ClientError::InvalidAmount(format!("{} does not fit in 64 bits", amount)))
}

/// Render base units as a decimal string without trailing zeros.
pub fn format_amount(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(s) if s.contains('.') => s.trim_end_matches('0').trim_end_matches('.').to_string(),
        Ok(s) => s,
        Err(_) => value.to_string(),
    }
}
