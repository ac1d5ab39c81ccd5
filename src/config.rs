//! Multi-account configuration.
//!
//! ```json
//! {
//!   "defaults": {
//!     "dedup_dir": "state",
//!     "rules_path": "rules.json",
//!     "results_dir": "results",
//!     "export_format": "qif",
//!     "source_account": "Assets:Card",
//!     "commission_account": "Expenses:Bank"
//!   },
//!   "accounts": [
//!     { "name": "Main card", "card_number": "4111", "statement_path": "4111.csv" }
//!   ]
//! }
//! ```
//!
//! Each account inherits every field it leaves out from `defaults`.
//! Relative paths are resolved against the directory of the config file.

use crate::error::{Result, SorterError};
use crate::export::ExportFormat;
use crate::transaction::DEFAULT_TIMEZONE;
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// One account entry as written in the file; any field may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountEntry {
    pub name: Option<String>,
    pub card_number: Option<String>,
    pub statement_path: Option<PathBuf>,
    pub dedup_dir: Option<PathBuf>,
    pub rules_path: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub export_format: Option<ExportFormat>,
    pub source_account: Option<String>,
    pub commission_account: Option<String>,
    pub timezone: Option<String>,
}

impl AccountEntry {
    /// Fills every unset field from `defaults`.
    pub fn with_defaults(self, defaults: &AccountEntry) -> AccountEntry {
        AccountEntry {
            name: self.name.or_else(|| defaults.name.clone()),
            card_number: self.card_number.or_else(|| defaults.card_number.clone()),
            statement_path: self.statement_path.or_else(|| defaults.statement_path.clone()),
            dedup_dir: self.dedup_dir.or_else(|| defaults.dedup_dir.clone()),
            rules_path: self.rules_path.or_else(|| defaults.rules_path.clone()),
            results_dir: self.results_dir.or_else(|| defaults.results_dir.clone()),
            export_format: self.export_format.or(defaults.export_format),
            source_account: self.source_account.or_else(|| defaults.source_account.clone()),
            commission_account: self
                .commission_account
                .or_else(|| defaults.commission_account.clone()),
            timezone: self.timezone.or_else(|| defaults.timezone.clone()),
        }
    }
}

/// Top-level config file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: AccountEntry,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

/// Validated settings for one account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Descriptive name used in logs and errors
    pub name: String,

    /// Card number; keys the watermark and names result files
    pub card_number: String,

    /// Raw statement CSV
    pub statement_path: PathBuf,

    /// Directory holding watermark state
    pub dedup_dir: PathBuf,

    /// Rule file
    pub rules_path: PathBuf,

    /// Directory receiving exported buckets
    pub results_dir: PathBuf,

    /// Format for mapped transactions
    pub export_format: ExportFormat,

    /// QIF: account the card belongs to
    pub source_account: String,

    /// QIF: account commissions are booked against
    pub commission_account: String,

    /// Civil zone statement timestamps are reported in
    pub timezone: Tz,
}

impl AccountConfig {
    /// Validates a merged entry, resolving relative paths against `base`.
    pub fn from_entry(entry: AccountEntry, base: &Path) -> Result<Self> {
        let name = required(entry.name, "no account name")?;
        let card_number = required(entry.card_number, "no card number")?;
        let statement_path = required_path(entry.statement_path, base, "no statement path")?;
        let dedup_dir = required_path(entry.dedup_dir, base, "no deduplicator dir")?;
        let rules_path = required_path(entry.rules_path, base, "no rules path")?;
        let results_dir = required_path(entry.results_dir, base, "no results dir")?;

        File::open(&rules_path).map_err(|e| {
            SorterError::Config(format!(
                "invalid path to rules file {}: {}",
                rules_path.display(),
                e
            ))
        })?;

        let timezone = match entry.timezone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| SorterError::Config(format!("invalid timezone {:?}: {}", name, e)))?,
            None => DEFAULT_TIMEZONE,
        };

        let export_format = entry.export_format.unwrap_or_default();
        let source_account = entry.source_account.unwrap_or_default();
        let commission_account = entry.commission_account.unwrap_or_default();
        if export_format == ExportFormat::Qif {
            if source_account.is_empty() {
                return Err(SorterError::Config("no source account name".to_string()));
            }
            if commission_account.is_empty() {
                return Err(SorterError::Config("no commission account name".to_string()));
            }
        }

        Ok(AccountConfig {
            name,
            card_number,
            statement_path,
            dedup_dir,
            rules_path,
            results_dir,
            export_format,
            source_account,
            commission_account,
            timezone,
        })
    }
}

/// Loads and validates every account in a config file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<AccountConfig>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    from_reader(BufReader::new(file), base)
}

/// Parses a config from `reader`; relative paths resolve against `base`.
pub fn from_reader<R: Read>(reader: R, base: &Path) -> Result<Vec<AccountConfig>> {
    let file: ConfigFile = serde_json::from_reader(reader)?;
    if file.accounts.is_empty() {
        return Err(SorterError::Config("no accounts configured".to_string()));
    }

    file.accounts
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            AccountConfig::from_entry(entry.with_defaults(&file.defaults), base).map_err(|e| {
                SorterError::Config(format!("account #{}: {}", idx, strip_prefix(e)))
            })
        })
        .collect()
}

fn strip_prefix(e: SorterError) -> String {
    match e {
        SorterError::Config(message) => message,
        other => other.to_string(),
    }
}

fn required(value: Option<String>, message: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SorterError::Config(message.to_string())),
    }
}

fn required_path(value: Option<PathBuf>, base: &Path, message: &str) -> Result<PathBuf> {
    match value {
        Some(p) if !p.as_os_str().is_empty() => Ok(base.join(p)),
        _ => Err(SorterError::Config(message.to_string())),
    }
}
