//! Writing sorted transactions to disk.
//!
//! Mapped transactions go out as JSON or as a QIF document for import into
//! bookkeeping software. Ignored and unmapped records are always written as
//! JSON for review.

use crate::error::Result;
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Commissions at or below this are treated as rounding noise.
const COMMISSION_THRESHOLD: f32 = 0.01;

/// Output format for mapped transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Qif,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Qif => "qif",
        }
    }
}

/// Writes `items` as a pretty-printed JSON array.
pub fn write_json<W: Write, T: Serialize>(mut writer: W, items: &[T]) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, items)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// QIF (Quicken Interchange Format) writer for mapped transactions.
#[derive(Debug, Clone)]
pub struct QifWriter {
    /// Account the card statement belongs to
    pub source_account: String,

    /// Account commissions are booked against
    pub commission_account: String,

    /// Civil zone transaction dates are printed in
    pub timezone: Tz,
}

impl QifWriter {
    /// Writes the account header followed by one bank entry per transaction.
    ///
    /// Transactions carrying a commission are split between the destination
    /// and the commission account.
    pub fn write<W: Write>(&self, mut writer: W, transactions: &[Transaction]) -> Result<()> {
        write!(writer, "!Account\nN{}\n^\n", self.source_account)?;

        for tx in transactions {
            let date = tx.date.with_timezone(&self.timezone).format("%Y-%m-%d");
            write!(
                writer,
                "!Type:Bank\nD{}\nT{:.2}\nP{}\nS{}\n",
                date,
                tx.source_amount,
                flatten_newlines(&tx.note),
                tx.destination
            )?;

            let commission = tx.commission();
            if commission > COMMISSION_THRESHOLD {
                write!(
                    writer,
                    "${:.2}\nS{}\n${:.2}\n^\n",
                    tx.destination_amount, self.commission_account, commission
                )?;
            } else {
                write!(writer, "${:.2}\n^\n", -tx.source_amount)?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}

fn flatten_newlines(s: &str) -> String {
    s.replace('\n', " ").replace('\r', "")
}

/// Writes bucket files for one account run.
///
/// Files are named `<card>-<YYYY-MM-DDTHH-MM-SS>.<ext>` after the run's
/// start time. Empty buckets produce no file.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
    card: String,
    stamp: String,
}

impl Exporter {
    pub fn new<P: AsRef<Path>>(dir: P, card: &str, started: DateTime<Utc>) -> Self {
        Exporter {
            dir: dir.as_ref().to_path_buf(),
            card: card.to_string(),
            stamp: started.format("%Y-%m-%dT%H-%M-%S").to_string(),
        }
    }

    /// Writes `items` as JSON into `subdir` of the results directory.
    pub fn export_json<T: Serialize>(&self, subdir: &str, items: &[T]) -> Result<Option<PathBuf>> {
        if items.is_empty() {
            return Ok(None);
        }
        let path = self.prepare(subdir, ExportFormat::Json)?;
        write_json(BufWriter::new(File::create(&path)?), items)?;
        info!("Wrote {} records to {}", items.len(), path.display());
        Ok(Some(path))
    }

    /// Writes transactions as QIF into `subdir` of the results directory.
    pub fn export_qif(
        &self,
        subdir: &str,
        qif: &QifWriter,
        transactions: &[Transaction],
    ) -> Result<Option<PathBuf>> {
        if transactions.is_empty() {
            return Ok(None);
        }
        let path = self.prepare(subdir, ExportFormat::Qif)?;
        qif.write(BufWriter::new(File::create(&path)?), transactions)?;
        info!("Wrote {} records to {}", transactions.len(), path.display());
        Ok(Some(path))
    }

    fn prepare(&self, subdir: &str, format: ExportFormat) -> Result<PathBuf> {
        let dir = self.dir.join(subdir);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!(
            "{}-{}.{}",
            self.card,
            self.stamp,
            format.extension()
        )))
    }
}
