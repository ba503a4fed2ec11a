use crate::error::{BatchPayError, Result};
use alloy_primitives::U256;

/// Largest precision whose scaling factor (`10^precision`) still fits in a `U256`.
pub const MAX_PRECISION: u8 = 77;

/// Checks that `value` is a plain non-negative decimal: `digits[.digits]`.
///
/// Signs, exponents, digit separators and inner whitespace are all rejected so
/// that a value can never be read two different ways.
pub fn is_plain_decimal(value: &str) -> bool {
    split_decimal(value).is_some()
}

/// Number of significant fractional digits, ignoring trailing zeros.
pub fn max_fraction_digits(value: &str) -> usize {
    split_decimal(value)
        .map(|(_, frac)| frac.trim_end_matches('0').len())
        .unwrap_or(0)
}

/// Converts a decimal string into integer base units at the given precision.
///
/// Uses exact integer arithmetic only. Values with more significant fractional
/// digits than `precision` are rejected instead of truncated.
pub fn to_base_units(value: &str, precision: u8) -> Result<U256> {
    if precision > MAX_PRECISION {
        return Err(BatchPayError::InvalidAmount(format!(
            "precision {precision} exceeds the maximum of {MAX_PRECISION}"
        )));
    }

    let (int_part, frac_part) = split_decimal(value)
        .ok_or_else(|| BatchPayError::InvalidAmount(format!("'{value}' is not a decimal")))?;

    let frac_part = frac_part.trim_end_matches('0');
    let precision = usize::from(precision);
    if frac_part.len() > precision {
        return Err(BatchPayError::InvalidAmount(format!(
            "'{value}' has more than {precision} decimal places"
        )));
    }

    let mut digits = String::with_capacity(int_part.len() + precision);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    digits.extend(std::iter::repeat_n('0', precision - frac_part.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 10)
        .map_err(|_| BatchPayError::InvalidAmount(format!("'{value}' does not fit in 256 bits")))
}

/// Formats integer base units as a decimal string, for display only.
///
/// Trailing fractional zeros and a trailing decimal point are dropped.
pub fn from_base_units(value: U256, precision: u8) -> String {
    let digits = value.to_string();
    let precision = usize::from(precision);
    if precision == 0 {
        return digits;
    }

    let padded = if digits.len() <= precision {
        format!("{}{}", "0".repeat(precision + 1 - digits.len()), digits)
    } else {
        digits
    };

    let (int_part, frac_part) = padded.split_at(padded.len() - precision);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

fn split_decimal(value: &str) -> Option<(&str, &str)> {
    let (int_part, frac_part) = match value.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (value, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }
    Some((int_part, frac_part))
}
