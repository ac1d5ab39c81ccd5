//! Currencies and `"<number> <currency>"` amount strings.
//!
//! The upstream statement encodes every amount as a number and a
//! three-letter currency code separated by exactly one space.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;
use thiserror::Error;

/// Currencies the statement source is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Uah,
    Usd,
    Eur,
}

impl Currency {
    /// Returns the ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Uah => "UAH",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }
}

impl FromStr for Currency {
    type Err = AmountError;

    /// Parses a currency code, ignoring case.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UAH" => Ok(Currency::Uah),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            _ => Err(AmountError::Currency(s.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Why an amount string was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid tokens count: {0}")]
    TokenCount(usize),

    #[error("invalid number: {0}")]
    Number(#[from] ParseFloatError),

    #[error("invalid number: {0:?} is not finite")]
    NotFinite(String),

    #[error("invalid currency: {0:?}")]
    Currency(String),
}

/// A signed amount in a single currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amount {
    pub value: f32,
    pub currency: Currency,
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `"<number> <currency>"`.
    ///
    /// Surrounding whitespace is ignored; the two tokens must be separated
    /// by exactly one space.
    ///
    /// # Examples
    ///
    /// ```
    /// use statement_sorter::money::{Amount, Currency};
    ///
    /// let amount: Amount = " -2.11 eur ".parse().unwrap();
    /// assert_eq!(amount.value, -2.11);
    /// assert_eq!(amount.currency, Currency::Eur);
    /// ```
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim_matches([' ', '\t', '\n', '\r']);
        let tokens: Vec<&str> = trimmed.splitn(2, ' ').collect();
        if tokens.len() != 2 {
            return Err(AmountError::TokenCount(tokens.len()));
        }

        let value = f32::from_str(tokens[0])?;
        if !value.is_finite() {
            return Err(AmountError::NotFinite(tokens[0].to_string()));
        }
        let currency = Currency::from_str(tokens[1])?;

        Ok(Amount { value, currency })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.value, self.currency)
    }
}
