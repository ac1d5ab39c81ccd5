//! Routes normalized transactions into ignored, mapped and unmapped
//! buckets.
//!
//! Every input lands in exactly one bucket, and input order is kept inside
//! each bucket.

use crate::rules::RuleSet;
use crate::transaction::{Normalized, ParseFailure, Transaction};
use log::debug;
use serde::{Serialize, Serializer};
use std::fmt;

/// Why a parsed transaction could not be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Money came in rather than went out
    Deposit,

    /// Source and destination currencies differ
    CurrenciesDiffer,

    /// No rule matched the destination or the note
    NoMatchingRule,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::Deposit => "deposits are not implemented",
            RejectReason::CurrenciesDiffer => "currencies differ",
            RejectReason::NoMatchingRule => "no matching rule",
        };
        f.write_str(text)
    }
}

impl Serialize for RejectReason {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A record that needs manual attention.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Unmapped {
    /// The raw record could not be parsed
    Unparsed(ParseFailure),

    /// The record parsed but cannot be booked automatically
    Rejected {
        transaction: Transaction,
        reason: RejectReason,
    },
}

impl Unmapped {
    /// Human-readable failure reason.
    pub fn reason(&self) -> String {
        match self {
            Unmapped::Unparsed(failure) => failure.error.to_string(),
            Unmapped::Rejected { reason, .. } => reason.to_string(),
        }
    }

    /// The parsed transaction, if parsing succeeded.
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            Unmapped::Unparsed(_) => None,
            Unmapped::Rejected { transaction, .. } => Some(transaction),
        }
    }
}

impl fmt::Display for Unmapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unmapped::Unparsed(failure) => write!(
                f,
                "{} {:?} {:?} ({})",
                failure.raw.timestamp_key(),
                failure.raw.terminal,
                failure.raw.description,
                failure.error
            ),
            Unmapped::Rejected {
                transaction,
                reason,
            } => write!(
                f,
                "{} {:.2} {} -> {:?} {:?} ({})",
                transaction.date.format("%Y-%m-%dT%H:%M:%SZ"),
                transaction.source_amount,
                transaction.source_currency,
                transaction.destination,
                transaction.note,
                reason
            ),
        }
    }
}

/// Result of sorting one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sorted {
    pub ignored: Vec<Transaction>,
    pub mapped: Vec<Transaction>,
    pub unmapped: Vec<Unmapped>,
}

impl Sorted {
    /// Total number of records across all buckets.
    pub fn len(&self) -> usize {
        self.ignored.len() + self.mapped.len() + self.unmapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome for a single record.
enum Decision {
    Ignored(Transaction),
    Mapped(Transaction),
    Unmapped(Unmapped),
}

/// Classifies transactions against a rule set.
#[derive(Debug, Clone)]
pub struct Sorter {
    rules: RuleSet,
}

impl Sorter {
    /// Creates a sorter for the given rules.
    pub fn new(rules: RuleSet) -> Self {
        Sorter { rules }
    }

    /// The rules in use.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Sorts a batch into the three buckets.
    pub fn sort(&self, records: Vec<Normalized>) -> Sorted {
        let mut sorted = Sorted::default();
        for record in records {
            match self.decide(record) {
                Decision::Ignored(tx) => sorted.ignored.push(tx),
                Decision::Mapped(tx) => sorted.mapped.push(tx),
                Decision::Unmapped(unmapped) => sorted.unmapped.push(unmapped),
            }
        }
        sorted
    }

    /// Applies the checks in order; the first that fires decides.
    fn decide(&self, record: Normalized) -> Decision {
        let mut tx = match record {
            Normalized::Parsed(tx) => tx,
            Normalized::Failed(failure) => return Decision::Unmapped(Unmapped::Unparsed(failure)),
        };

        if tx.source_amount >= 0.0 {
            return reject(tx, RejectReason::Deposit);
        }
        if tx.source_currency != tx.destination_currency {
            return reject(tx, RejectReason::CurrenciesDiffer);
        }
        if self.rules.is_ignored(&tx.destination) || self.rules.is_ignored(&tx.note) {
            debug!("Ignoring {:?} / {:?}", tx.destination, tx.note);
            return Decision::Ignored(tx);
        }

        let account = match self
            .rules
            .resolve(&tx.destination)
            .or_else(|| self.rules.resolve(&tx.note))
        {
            Some(account) => account.to_string(),
            None => return reject(tx, RejectReason::NoMatchingRule),
        };

        debug!("Mapped {:?} to {}", tx.destination, account);
        tx.note = format!("{}: {}", tx.destination, tx.note);
        tx.destination = account;
        Decision::Mapped(tx)
    }
}

fn reject(transaction: Transaction, reason: RejectReason) -> Decision {
    debug!("Unmapped {:?}: {}", transaction.destination, reason);
    Decision::Unmapped(Unmapped::Rejected {
        transaction,
        reason,
    })
}
