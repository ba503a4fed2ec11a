use crate::domain::amount::{from_base_units, to_base_units};
use crate::domain::recipient::{ConvertedRecipient, RecipientRecord};
use crate::error::{BatchPayError, Result};
use alloy_primitives::{Address, U256};
use serde::Serialize;

/// Per-recipient base-unit amounts plus the totals derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceBreakdown {
    pub amounts: Vec<U256>,
    pub total: U256,
    pub required_allowance: U256,
}

/// Converts every record and adds the protocol fee on top of the exact sum.
///
/// One bad record rejects the whole batch; a partial batch would break the
/// match between the approved allowance and what the transfer pulls.
pub fn required_allowance(
    records: &[RecipientRecord],
    precision: u8,
    fee: U256,
) -> Result<AllowanceBreakdown> {
    if records.is_empty() {
        return Err(BatchPayError::NoValidRecipients);
    }

    let mut amounts = Vec::with_capacity(records.len());
    let mut total = U256::ZERO;
    for record in records {
        let amount = to_base_units(&record.amount, precision)?;
        total = total.checked_add(amount).ok_or_else(overflow)?;
        amounts.push(amount);
    }
    let required_allowance = total.checked_add(fee).ok_or_else(overflow)?;

    Ok(AllowanceBreakdown {
        amounts,
        total,
        required_allowance,
    })
}

fn overflow() -> BatchPayError {
    BatchPayError::InvalidAmount("batch total exceeds 256 bits".to_string())
}

/// Everything the pay step needs, frozen at approval time.
///
/// Only [`BatchRequest::build`] creates one, so `required_allowance` is always
/// `total + fee` and `total` is always the sum of the recipient amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRequest {
    token: Address,
    precision: u8,
    recipients: Vec<ConvertedRecipient>,
    total_base_units: U256,
    fee_base_units: U256,
    required_allowance: U256,
}

impl BatchRequest {
    pub fn build(
        token: Address,
        records: &[RecipientRecord],
        precision: u8,
        fee: U256,
    ) -> Result<Self> {
        let breakdown = required_allowance(records, precision, fee)?;
        let recipients = records
            .iter()
            .zip(breakdown.amounts)
            .map(|(record, amount_base_units)| ConvertedRecipient {
                address: record.address,
                amount_base_units,
            })
            .collect();

        Ok(Self {
            token,
            precision,
            recipients,
            total_base_units: breakdown.total,
            fee_base_units: fee,
            required_allowance: breakdown.required_allowance,
        })
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn recipients(&self) -> &[ConvertedRecipient] {
        &self.recipients
    }

    pub fn total_base_units(&self) -> U256 {
        self.total_base_units
    }

    pub fn fee_base_units(&self) -> U256 {
        self.fee_base_units
    }

    pub fn required_allowance(&self) -> U256 {
        self.required_allowance
    }

    /// Recipient addresses and amounts as the parallel arrays the contract takes.
    pub fn transfer_arrays(&self) -> (Vec<Address>, Vec<U256>) {
        self.recipients
            .iter()
            .map(|r| (r.address, r.amount_base_units))
            .unzip()
    }

    pub fn display_required_allowance(&self) -> String {
        from_base_units(self.required_allowance, self.precision)
    }
}
