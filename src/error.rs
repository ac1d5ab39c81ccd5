//! Error types for the statement sorter.
//!
//! These are load-time and I/O failures that abort a run. Problems with a
//! single statement record are not errors here: they travel as data inside
//! [`Normalized`](crate::transaction::Normalized) and
//! [`Unmapped`](crate::sorter::Unmapped).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sorter operations
pub type Result<T> = std::result::Result<T, SorterError>;

/// Errors that can occur while loading state or running the pipeline.
#[derive(Error, Debug)]
pub enum SorterError {
    /// Failed to open, read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed statement row
    #[error("Invalid statement record at row {row}: {message}")]
    InvalidRecord { row: usize, message: String },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Rule set failed validation
    #[error("Invalid rules: {0}")]
    Rules(String),

    /// A rule or ignore pattern is not a valid regular expression
    #[error("Invalid pattern {pattern:?} in {location}: {source}")]
    Pattern {
        location: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Persisted watermark exists but cannot be read or decoded
    #[error("Corrupt watermark state {path}: {message}")]
    CorruptWatermark { path: PathBuf, message: String },

    /// Attempt to persist an empty or malformed watermark
    #[error("Refusing to store invalid watermark (date {date:?}, time {time:?})")]
    InvalidWatermark { date: String, time: String },

    /// Missing config file argument
    #[error("Missing config file argument. Usage: statement-sorter <config.json>")]
    MissingArgument,

    /// Failure while processing one configured account
    #[error("{account}: {source}")]
    Account {
        account: String,
        #[source]
        source: Box<SorterError>,
    },
}

impl SorterError {
    /// Wraps an error with the name of the account being processed.
    pub fn for_account(account: &str, source: SorterError) -> Self {
        SorterError::Account {
            account: account.to_string(),
            source: Box::new(source),
        }
    }
}
