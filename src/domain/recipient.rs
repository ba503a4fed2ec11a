use crate::domain::amount::{from_base_units, max_fraction_digits, to_base_units};
use crate::error::{BatchPayError, Result};
use alloy_primitives::{Address, U256};
use serde::Serialize;

/// One validated row of operator input: who gets paid and how much, as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientRecord {
    pub address: Address,
    pub amount: String,
}

impl RecipientRecord {
    pub fn new(address: Address, amount: impl Into<String>) -> Self {
        Self {
            address,
            amount: amount.into(),
        }
    }
}

/// A recipient whose amount has been scaled to the token's base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConvertedRecipient {
    pub address: Address,
    pub amount_base_units: U256,
}

/// Display-only sum of the currently valid rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewTotal {
    pub recipients: usize,
    pub total: String,
}

impl PreviewTotal {
    pub fn empty() -> Self {
        Self {
            recipients: 0,
            total: "0".to_string(),
        }
    }
}

/// Sums the records exactly, at the finest scale present in the input.
///
/// The token precision is not known before approval, so the preview works in
/// the input's own scale and never touches floating point.
pub fn preview_total(records: &[RecipientRecord]) -> Result<PreviewTotal> {
    if records.is_empty() {
        return Ok(PreviewTotal::empty());
    }

    let scale = records
        .iter()
        .map(|record| max_fraction_digits(&record.amount))
        .max()
        .unwrap_or(0);
    let scale = u8::try_from(scale).unwrap_or(u8::MAX);

    let mut total = U256::ZERO;
    for record in records {
        let amount = to_base_units(&record.amount, scale)?;
        total = total.checked_add(amount).ok_or_else(|| {
            BatchPayError::InvalidAmount("preview total exceeds 256 bits".to_string())
        })?;
    }

    Ok(PreviewTotal {
        recipients: records.len(),
        total: from_base_units(total, scale),
    })
}
