//! # Statement Sorter
//!
//! Incrementally classifies bank card statements. Each run skips records
//! already processed, parses the rest and routes every transaction into one
//! of three buckets: mapped to a bookkeeping account, explicitly ignored,
//! or left unmapped for review.
//!
//! ## Design Principles
//!
//! - **Watermark deduplication**: one `"{date}T{time}"` watermark per card;
//!   only strictly newer records are processed
//! - **Failures are data**: a bad record becomes an unmapped entry with a
//!   reason and never aborts the batch
//! - **Deterministic rules**: rule groups are tried in declaration order and
//!   the first match wins
//! - **Fail closed on load**: invalid rules or watermark state abort the run
//!   before anything is written
//!
//! ## Example
//!
//! ```
//! use statement_sorter::{Normalizer, RawTransaction, RuleSet, Sorter};
//!
//! let rules = RuleSet::from_reader(
//!     r#"{"accounts": {"food": "Groceries"}, "rules": [{"food": ["Lidl"]}]}"#.as_bytes(),
//! )
//! .unwrap();
//! let raw = RawTransaction {
//!     card: "4111".into(),
//!     date: "2020-09-20".into(),
//!     time: "12:17:00".into(),
//!     amount: "10.00 UAH".into(),
//!     card_amount: "-10.00 UAH".into(),
//!     terminal: "Lidl Store #4".into(),
//!     description: "bread".into(),
//! };
//!
//! let sorted = Sorter::new(rules).sort(vec![Normalizer::default().parse(raw)]);
//! assert_eq!(sorted.mapped[0].destination, "Groceries");
//! assert_eq!(sorted.mapped[0].note, "Lidl Store #4: bread");
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod money;
pub mod pipeline;
pub mod rules;
pub mod sorter;
pub mod statement;
pub mod transaction;

pub use config::AccountConfig;
pub use dedup::{Deduplicator, Watermark};
pub use error::{Result, SorterError};
pub use export::{ExportFormat, Exporter, QifWriter};
pub use money::{Amount, AmountError, Currency};
pub use pipeline::{process_account, RunSummary};
pub use rules::{RuleDefinition, RuleGroup, RuleSet};
pub use sorter::{RejectReason, Sorted, Sorter, Unmapped};
pub use transaction::{
    Normalized, Normalizer, ParseError, ParseFailure, RawTransaction, Transaction,
};
