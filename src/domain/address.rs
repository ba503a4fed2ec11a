use crate::error::{BatchPayError, Result};
use alloy_primitives::Address;

/// Parses a 20-byte hex account identifier, with or without the `0x` prefix.
///
/// Single-case hex is accepted as-is. Mixed-case input must carry a valid
/// EIP-55 checksum, otherwise it is treated as a typo and rejected.
pub fn parse_address(input: &str) -> Option<Address> {
    let hex = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let address: Address = hex.parse().ok()?;

    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper && address.to_checksum(None)[2..] != *hex {
        return None;
    }
    Some(address)
}

pub fn is_valid_address(input: &str) -> bool {
    parse_address(input).is_some()
}

/// Validates the token contract address entered by the operator.
pub fn parse_token_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    parse_address(trimmed).ok_or_else(|| BatchPayError::InvalidTokenAddress(trimmed.to_string()))
}
