use crate::domain::address::parse_address;
use crate::domain::amount::is_plain_decimal;
use crate::domain::recipient::RecipientRecord;
use std::io::Read;

/// Reads `address,amount` rows from a CSV source.
///
/// There is no header row. Rows that do not hold a valid address followed by a
/// plain decimal amount are skipped, so a half-edited list still yields a usable
/// preview of its valid part. Extra columns are ignored.
pub struct RecipientReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RecipientReader<R> {
    /// Creates a new `RecipientReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator over the valid rows, in input order.
    pub fn recipients(self) -> impl Iterator<Item = RecipientRecord> {
        self.reader
            .into_records()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(record) => {
                    let parsed = parse_row(&record);
                    if parsed.is_none() {
                        tracing::debug!(line = index + 1, "skipping malformed recipient row");
                    }
                    parsed
                }
                Err(e) => {
                    tracing::debug!(line = index + 1, error = %e, "skipping unreadable row");
                    None
                }
            })
    }
}

fn parse_row(record: &csv::StringRecord) -> Option<RecipientRecord> {
    if record.len() < 2 {
        return None;
    }
    let address = parse_address(record.get(0)?)?;
    let amount = record.get(1)?;
    if !is_plain_decimal(amount) {
        return None;
    }
    Some(RecipientRecord::new(address, amount))
}

/// Parses raw pasted text into the valid recipient rows.
pub fn parse_recipients(raw: &str) -> Vec<RecipientRecord> {
    RecipientReader::new(raw.as_bytes()).recipients().collect()
}
