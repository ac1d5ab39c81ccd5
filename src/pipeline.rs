//! One incremental run for one account.
//!
//! statement -> watermark filter -> normalizer -> sorter -> exports, then
//! the watermark moves to the newest record of the statement as read.

use crate::config::AccountConfig;
use crate::dedup::{Deduplicator, Watermark};
use crate::error::{Result, SorterError};
use crate::export::{ExportFormat, Exporter, QifWriter};
use crate::rules::RuleSet;
use crate::sorter::{Sorted, Sorter, Unmapped};
use crate::statement;
use crate::transaction::{Normalizer, RawTransaction};
use chrono::Utc;
use log::{info, warn};

const IGNORED_DIR: &str = "ignored";
const UNMAPPED_DIR: &str = "unmapped";

/// Record counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records in the statement
    pub fetched: usize,
    /// Records newer than the watermark
    pub fresh: usize,
    pub ignored: usize,
    pub mapped: usize,
    pub unmapped: usize,
}

/// Filters, normalizes and sorts a batch without touching any state.
pub fn classify(
    batch: &[RawTransaction],
    dedup: &Deduplicator,
    normalizer: &Normalizer,
    sorter: &Sorter,
) -> Sorted {
    let fresh = dedup.filter(batch);
    sorter.sort(normalizer.parse_all(fresh))
}

/// Runs the whole pipeline for one account.
///
/// Errors are wrapped with the account name.
pub fn process_account(config: &AccountConfig) -> Result<RunSummary> {
    run(config).map_err(|e| SorterError::for_account(&config.name, e))
}

fn run(config: &AccountConfig) -> Result<RunSummary> {
    info!("Processing {}", config.name);
    let started = Utc::now();

    let sorter = Sorter::new(RuleSet::load(&config.rules_path)?);
    let mut dedup = Deduplicator::open(&config.dedup_dir, &config.card_number)?;
    let normalizer = Normalizer::new(config.timezone);

    let batch = statement::read_file(&config.statement_path)?;
    let last = match batch.last() {
        Some(last) => last.clone(),
        None => {
            info!("{}: no transactions found", config.name);
            return Ok(RunSummary::default());
        }
    };
    // Nothing is exported for a batch whose watermark could not be stored.
    Watermark::from_raw(&last).check_candidate()?;

    let sorted = classify(&batch, &dedup, &normalizer, &sorter);
    let summary = RunSummary {
        fetched: batch.len(),
        fresh: sorted.len(),
        ignored: sorted.ignored.len(),
        mapped: sorted.mapped.len(),
        unmapped: sorted.unmapped.len(),
    };
    info!(
        "{}: fetched {}, new {}; mapped: {}; unmapped: {}; ignored: {}",
        config.name,
        summary.fetched,
        summary.fresh,
        summary.mapped,
        summary.unmapped,
        summary.ignored
    );

    export(config, &sorted, started)?;
    report_unmapped(&config.name, &sorted.unmapped);

    dedup.advance(&last)?;
    Ok(summary)
}

fn export(config: &AccountConfig, sorted: &Sorted, started: chrono::DateTime<Utc>) -> Result<()> {
    let exporter = Exporter::new(&config.results_dir, &config.card_number, started);

    match config.export_format {
        ExportFormat::Json => {
            exporter.export_json("", &sorted.mapped)?;
        }
        ExportFormat::Qif => {
            let qif = QifWriter {
                source_account: config.source_account.clone(),
                commission_account: config.commission_account.clone(),
                timezone: config.timezone,
            };
            exporter.export_qif("", &qif, &sorted.mapped)?;
        }
    }
    exporter.export_json(IGNORED_DIR, &sorted.ignored)?;
    exporter.export_json(UNMAPPED_DIR, &sorted.unmapped)?;
    Ok(())
}

fn report_unmapped(account: &str, unmapped: &[Unmapped]) {
    for record in unmapped {
        warn!("{}: unmapped transaction: {}", account, record);
    }
}
