//! Reading raw card statements.
//!
//! Statements are CSV files using the upstream API's attribute names as the
//! header. Rows come newest first, as the bank lists them; the reader hands
//! them on oldest first.

use crate::error::{Result, SorterError};
use crate::transaction::RawTransaction;
use csv::{ReaderBuilder, Trim};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Reads a statement file.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<RawTransaction>> {
    let file = File::open(path.as_ref())?;
    read_csv(BufReader::new(file))
}

/// Reads statement rows from CSV and returns them oldest first.
///
/// A row that cannot be decoded fails the whole read: the statement is
/// incomplete and must not advance the watermark.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<RawTransaction>> {
    let mut csv_reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let mut records = Vec::new();
    for (row_idx, result) in csv_reader.deserialize::<RawTransaction>().enumerate() {
        let row_num = row_idx + 2; // 1-indexed, accounting for header row
        let record = result.map_err(|e| SorterError::InvalidRecord {
            row: row_num,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    records.reverse();
    debug!("Read {} statement records", records.len());
    Ok(records)
}
