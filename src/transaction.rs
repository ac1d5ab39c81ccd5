//! Statement records and their normalization.
//!
//! A [`RawTransaction`] is what the statement source hands over, strings
//! only. The [`Normalizer`] turns each one into a [`Normalized`] value:
//! either a fully typed [`Transaction`] or a [`ParseFailure`] that keeps the
//! raw record for audit. Normalization never fails the batch.

use crate::money::{Amount, AmountError, Currency};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::debug;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Civil time zone the upstream statement API reports timestamps in.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Kyiv;

const DATE_LAYOUT: &str = "dddd-dd-dd";
const TIME_LAYOUT: &str = "dd:dd:dd";

/// Raw statement record as delivered by the statement source.
///
/// Field names on the wire follow the upstream API attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Card number the record belongs to
    pub card: String,

    /// Local date, `YYYY-MM-DD`
    #[serde(rename = "trandate")]
    pub date: String,

    /// Local time, `HH:MM:SS`
    #[serde(rename = "trantime")]
    pub time: String,

    /// Amount credited to the counterparty, `"<number> <currency>"`
    pub amount: String,

    /// Amount debited from the card, `"<number> <currency>"`
    #[serde(rename = "cardamount")]
    pub card_amount: String,

    /// Counterparty terminal name (HTML-escaped upstream)
    pub terminal: String,

    /// Free-text description (HTML-escaped upstream)
    pub description: String,
}

impl RawTransaction {
    /// The `"{date}T{time}"` key used for watermark comparisons.
    pub fn timestamp_key(&self) -> String {
        format!("{}T{}", self.date, self.time)
    }

    /// Returns `true` when date and time are zero-padded `YYYY-MM-DD` and
    /// `HH:MM:SS`, the layout under which lexicographic comparison of
    /// [`timestamp_key`](Self::timestamp_key) agrees with chronological
    /// order.
    pub fn has_canonical_timestamp(&self) -> bool {
        is_canonical_timestamp(&self.date, &self.time)
    }
}

pub(crate) fn is_canonical_timestamp(date: &str, time: &str) -> bool {
    matches_layout(date, DATE_LAYOUT) && matches_layout(time, TIME_LAYOUT)
}

/// `d` in `layout` stands for an ASCII digit; every other byte must match
/// exactly.
fn matches_layout(value: &str, layout: &str) -> bool {
    value.len() == layout.len()
        && value
            .bytes()
            .zip(layout.bytes())
            .all(|(v, l)| if l == b'd' { v.is_ascii_digit() } else { v == l })
}

/// A successfully normalized statement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Absolute instant, normalized to UTC
    pub date: DateTime<Utc>,

    /// Source account label
    pub source: String,

    /// Signed source amount; negative means money left the card
    pub source_amount: f32,

    pub source_currency: Currency,

    /// Destination account label
    pub destination: String,

    pub destination_amount: f32,

    pub destination_currency: Currency,

    /// Free-text note
    pub note: String,
}

impl Transaction {
    /// The fee implied by an outflow: the gap between what left the card
    /// and what reached the counterparty.
    ///
    /// Zero for inflows and for cross-currency transactions.
    pub fn commission(&self) -> f32 {
        if self.source_amount >= 0.0 || self.source_currency != self.destination_currency {
            return 0.0;
        }
        -(self.source_amount + self.destination_amount)
    }
}

/// Why a raw record could not be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("parse time: {value:?}: {reason}")]
    Time { value: String, reason: String },

    #[error("parse src amount: {0}")]
    SourceAmount(AmountError),

    #[error("parse dst amount: {0}")]
    DestinationAmount(AmountError),
}

impl Serialize for ParseError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A raw record that failed normalization, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseFailure {
    pub error: ParseError,
    pub raw: RawTransaction,
}

/// Outcome of normalizing one raw record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Normalized {
    Parsed(Transaction),
    Failed(ParseFailure),
}

impl Normalized {
    /// Returns the parsed transaction, if any.
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            Normalized::Parsed(tx) => Some(tx),
            Normalized::Failed(_) => None,
        }
    }

    /// Returns `true` if the record failed to parse.
    pub fn is_failed(&self) -> bool {
        matches!(self, Normalized::Failed(_))
    }
}

/// Converts raw statement records into typed transactions.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    timezone: Tz,
}

impl Normalizer {
    /// Creates a normalizer reading local timestamps in `timezone`.
    pub fn new(timezone: Tz) -> Self {
        Normalizer { timezone }
    }

    /// The civil zone local timestamps are interpreted in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Normalizes a single record.
    ///
    /// Checks run in a fixed order and the first failure wins: timestamp,
    /// then source (card) amount, then destination amount. Text fields are
    /// HTML-unescaped only once everything else parsed.
    pub fn parse(&self, raw: RawTransaction) -> Normalized {
        let date = match self.parse_time(&raw.date, &raw.time) {
            Ok(date) => date,
            Err(error) => return fail(error, raw),
        };
        let source = match raw.card_amount.parse::<Amount>() {
            Ok(amount) => amount,
            Err(e) => return fail(ParseError::SourceAmount(e), raw),
        };
        let destination = match raw.amount.parse::<Amount>() {
            Ok(amount) => amount,
            Err(e) => return fail(ParseError::DestinationAmount(e), raw),
        };

        Normalized::Parsed(Transaction {
            date,
            source: raw.card,
            source_amount: source.value,
            source_currency: source.currency,
            destination: unescape(&raw.terminal),
            destination_amount: destination.value,
            destination_currency: destination.currency,
            note: unescape(&raw.description),
        })
    }

    /// Normalizes a batch, preserving order.
    pub fn parse_all(&self, batch: Vec<RawTransaction>) -> Vec<Normalized> {
        batch.into_iter().map(|raw| self.parse(raw)).collect()
    }

    /// Parses a local date and time into a UTC instant.
    ///
    /// Ambiguous local times (clocks turned back) resolve to the earlier
    /// instant; times skipped by a forward shift are rejected.
    pub fn parse_time(&self, date: &str, time: &str) -> Result<DateTime<Utc>, ParseError> {
        let value = format!("{}T{}", date, time);
        if !is_canonical_timestamp(date, time) {
            return Err(ParseError::Time {
                value,
                reason: "expected YYYY-MM-DD and HH:MM:SS".to_string(),
            });
        }

        let naive = NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S").map_err(|e| {
            ParseError::Time {
                value: value.clone(),
                reason: e.to_string(),
            }
        })?;

        match self.timezone.from_local_datetime(&naive) {
            LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(ParseError::Time {
                value,
                reason: format!("local time does not exist in {}", self.timezone),
            }),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

fn fail(error: ParseError, raw: RawTransaction) -> Normalized {
    debug!("Record at {} failed to parse: {}", raw.timestamp_key(), error);
    Normalized::Failed(ParseFailure { error, raw })
}

fn unescape(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(date: &str, time: &str, amount: &str, card_amount: &str) -> RawTransaction {
        RawTransaction {
            card: "4111".to_string(),
            date: date.to_string(),
            time: time.to_string(),
            amount: amount.to_string(),
            card_amount: card_amount.to_string(),
            terminal: "Shop &amp; Go".to_string(),
            description: "Bread &quot;Kyiv&quot;".to_string(),
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_parse_full_record() {
        let normalized =
            Normalizer::default().parse(raw("2020-09-19", "12:13:14", "10.00 UAH", "-10.50 UAH"));

        assert!(!normalized.is_failed());
        let tx = normalized.transaction().unwrap();
        // Kyiv is UTC+3 in September.
        assert_eq!(tx.date, utc(2020, 9, 19, 9, 13, 14));
        assert_eq!(tx.source, "4111");
        assert_eq!(tx.source_amount, -10.5);
        assert_eq!(tx.source_currency, Currency::Uah);
        assert_eq!(tx.destination, "Shop & Go");
        assert_eq!(tx.destination_amount, 10.0);
        assert_eq!(tx.destination_currency, Currency::Uah);
        assert_eq!(tx.note, "Bread \"Kyiv\"");
    }

    #[test]
    fn test_parse_time_in_winter_and_utc() {
        let kyiv = Normalizer::default();
        assert_eq!(
            kyiv.parse_time("2021-01-15", "00:30:00").unwrap(),
            utc(2021, 1, 14, 22, 30, 0)
        );

        let utc_normalizer = Normalizer::new(chrono_tz::UTC);
        assert_eq!(
            utc_normalizer.parse_time("2020-09-19", "12:13:14").unwrap(),
            utc(2020, 9, 19, 12, 13, 14)
        );
    }

    #[test]
    fn test_parse_time_rejects_empty_and_short_fields() {
        let normalizer = Normalizer::default();
        assert!(normalizer.parse_time("", "").is_err());
        assert!(normalizer.parse_time("2020-9-19", "12:13:14").is_err());
        assert!(normalizer.parse_time("2020-09-19", "2:13:14").is_err());
        assert!(normalizer.parse_time("2020-13-19", "12:13:14").is_err());
    }

    #[test]
    fn test_canonical_timestamp_layout() {
        assert!(is_canonical_timestamp("2020-09-19", "12:13:14"));
        assert!(!is_canonical_timestamp("20-09-2020", "12:13:14"));
        assert!(!is_canonical_timestamp("2020/09/19", "12:13:14"));
        assert!(!is_canonical_timestamp("2020-09-19", "12.13.14"));
        assert!(!is_canonical_timestamp("xxxx-xx-xx", "yy:yy:yy"));
        assert!(!is_canonical_timestamp("2020-09-19", ""));
    }

    #[test]
    fn test_normalizer_reports_its_timezone() {
        assert_eq!(Normalizer::default().timezone(), chrono_tz::Europe::Kyiv);
        assert_eq!(Normalizer::new(chrono_tz::UTC).timezone(), chrono_tz::UTC);
    }

    #[test]
    fn test_parse_time_dst_transitions() {
        let normalizer = Normalizer::default();

        // 2021-03-28 03:30 local was skipped in Kyiv.
        assert!(normalizer.parse_time("2021-03-28", "03:30:00").is_err());

        // 2021-10-31 03:30 local happened twice; the earlier (UTC+3) wins.
        assert_eq!(
            normalizer.parse_time("2021-10-31", "03:30:00").unwrap(),
            utc(2021, 10, 31, 0, 30, 0)
        );
    }

    #[test]
    fn test_time_failure_wins_over_amount_failure() {
        let normalized = Normalizer::default().parse(raw("", "", "bad", "bad"));
        assert!(normalized.is_failed());
        match normalized {
            Normalized::Failed(failure) => {
                assert!(matches!(failure.error, ParseError::Time { .. }));
                assert_eq!(failure.raw.terminal, "Shop &amp; Go");
            }
            _ => panic!("Expected Failed"),
        }
    }

    #[test]
    fn test_source_amount_checked_before_destination() {
        let normalized = Normalizer::default().parse(raw("2020-09-19", "12:13:14", "bad", "bad"));
        match normalized {
            Normalized::Failed(failure) => {
                assert!(matches!(failure.error, ParseError::SourceAmount(_)));
            }
            _ => panic!("Expected Failed"),
        }

        let normalized =
            Normalizer::default().parse(raw("2020-09-19", "12:13:14", "bad", "-1.00 UAH"));
        match normalized {
            Normalized::Failed(failure) => {
                assert!(matches!(failure.error, ParseError::DestinationAmount(_)));
                assert!(failure.error.to_string().starts_with("parse dst amount"));
            }
            _ => panic!("Expected Failed"),
        }
    }

    #[test]
    fn test_commission() {
        let base = Transaction {
            date: utc(2020, 9, 19, 0, 0, 0),
            source: String::new(),
            source_amount: 0.0,
            source_currency: Currency::Uah,
            destination: String::new(),
            destination_amount: 0.0,
            destination_currency: Currency::Uah,
            note: String::new(),
        };
        assert_eq!(base.commission(), 0.0);

        let with_fee = Transaction {
            source_amount: -2.25,
            destination_amount: 2.0,
            ..base.clone()
        };
        assert_eq!(with_fee.commission(), 0.25);

        let no_fee = Transaction {
            source_amount: -2.0,
            destination_amount: 2.0,
            ..base.clone()
        };
        assert_eq!(no_fee.commission(), 0.0);

        let cross_currency = Transaction {
            source_amount: -2.01,
            destination_amount: 2.0,
            destination_currency: Currency::Usd,
            ..base
        };
        assert_eq!(cross_currency.commission(), 0.0);
    }

    #[test]
    fn test_raw_deserializes_from_api_attribute_names() {
        let json = r#"{"card":"4111","trandate":"2020-09-20","trantime":"12:17:00",
            "amount":"1 UAH","cardamount":"-1 UAH","terminal":"T","description":"D"}"#;
        let raw: RawTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(raw.timestamp_key(), "2020-09-20T12:17:00");
        assert!(raw.has_canonical_timestamp());
        assert_eq!(raw.card_amount, "-1 UAH");
    }
}
