//! Watermark-based deduplication of statement batches.
//!
//! The statement source has no stable transaction identifier, so each
//! account remembers the timestamp of the last record it processed. A
//! record is new when its `"{date}T{time}"` key sorts strictly after the
//! watermark. Records at exactly the same timestamp as the watermark are
//! treated as already seen.

use crate::error::{Result, SorterError};
use crate::transaction::{is_canonical_timestamp, RawTransaction};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The last processed timestamp of one account.
///
/// The default value has empty fields and means "nothing processed yet".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Watermark {
    pub date: String,
    pub time: String,
}

impl Watermark {
    /// Builds a watermark from a raw record's timestamp.
    pub fn from_raw(raw: &RawTransaction) -> Self {
        Watermark {
            date: raw.date.clone(),
            time: raw.time.clone(),
        }
    }

    /// Returns `true` if either field is empty.
    pub fn is_zero(&self) -> bool {
        self.date.is_empty() || self.time.is_empty()
    }

    /// Returns `true` if both fields are zero-padded `YYYY-MM-DD` and
    /// `HH:MM:SS`.
    pub fn is_canonical(&self) -> bool {
        is_canonical_timestamp(&self.date, &self.time)
    }

    /// Checks that this watermark may be stored: neither zero nor
    /// malformed.
    pub fn check_candidate(&self) -> Result<()> {
        if self.is_zero() || !self.is_canonical() {
            return Err(SorterError::InvalidWatermark {
                date: self.date.clone(),
                time: self.time.clone(),
            });
        }
        Ok(())
    }

    /// The `"{date}T{time}"` comparison key.
    pub fn key(&self) -> String {
        format!("{}T{}", self.date, self.time)
    }

    /// Returns `true` if `raw` was already processed under this watermark.
    ///
    /// A zero watermark covers nothing. Records with an empty or
    /// malformed timestamp are never covered, so they reach the
    /// normalizer instead of being dropped silently.
    pub fn covers(&self, raw: &RawTransaction) -> bool {
        if self.is_zero() || !raw.has_canonical_timestamp() {
            return false;
        }
        raw.timestamp_key() <= self.key()
    }

    /// Keeps the records strictly newer than this watermark, in order.
    ///
    /// A pure function of its inputs; a zero watermark keeps everything.
    pub fn filter(&self, batch: &[RawTransaction]) -> Vec<RawTransaction> {
        if self.is_zero() {
            return batch.to_vec();
        }
        batch
            .iter()
            .filter(|raw| {
                if !raw.has_canonical_timestamp() {
                    warn!(
                        "Record with malformed timestamp {:?} kept for parsing",
                        raw.timestamp_key()
                    );
                }
                !self.covers(raw)
            })
            .cloned()
            .collect()
    }
}

/// Persistent per-account watermark, stored as `<dir>/<account>.json`.
///
/// One deduplicator owns one account's state file; it is the only writer.
#[derive(Debug)]
pub struct Deduplicator {
    path: PathBuf,
    watermark: Watermark,
}

impl Deduplicator {
    /// Opens the watermark for `account_key` under `dir`, creating the
    /// directory if needed.
    ///
    /// A missing state file yields the zero watermark. A read or decode
    /// failure, a half-empty value or a malformed timestamp is an error.
    pub fn open<P: AsRef<Path>>(dir: P, account_key: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = state_path(dir, account_key);
        let watermark = load(&path)?;
        debug!("Loaded watermark {:?} from {}", watermark.key(), path.display());
        Ok(Deduplicator { path, watermark })
    }

    /// The current watermark.
    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Path of the backing state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the records of `batch` newer than the current watermark.
    pub fn filter(&self, batch: &[RawTransaction]) -> Vec<RawTransaction> {
        self.watermark.filter(batch)
    }

    /// Persists `raw`'s timestamp as the new watermark.
    ///
    /// An empty or malformed candidate is rejected and nothing is written.
    /// A candidate older than the current watermark leaves it unchanged.
    /// The in-memory value changes only after the file is durably replaced.
    pub fn advance(&mut self, raw: &RawTransaction) -> Result<()> {
        let candidate = Watermark::from_raw(raw);
        candidate.check_candidate()?;

        if !self.watermark.is_zero() && candidate.key() < self.watermark.key() {
            warn!(
                "Not rewinding watermark {} from {} to {}",
                self.path.display(),
                self.watermark.key(),
                candidate.key()
            );
            return Ok(());
        }

        store(&self.path, &candidate)?;
        info!("Watermark advanced to {}", candidate.key());
        self.watermark = candidate;
        Ok(())
    }
}

fn state_path(dir: &Path, account_key: &str) -> PathBuf {
    dir.join(format!("{}.json", account_key))
}

fn load(path: &Path) -> Result<Watermark> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Watermark::default()),
        Err(e) => {
            return Err(SorterError::CorruptWatermark {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };
    let corrupt = |message: String| SorterError::CorruptWatermark {
        path: path.to_path_buf(),
        message,
    };

    let watermark: Watermark = serde_json::from_slice(&data).map_err(|e| corrupt(e.to_string()))?;
    let empty = watermark.date.is_empty() && watermark.time.is_empty();
    if !empty && !watermark.is_canonical() {
        return Err(corrupt(format!(
            "malformed watermark {:?}",
            watermark.key()
        )));
    }
    Ok(watermark)
}

/// Replaces the state file atomically through a sibling temp file.
fn store(path: &Path, watermark: &Watermark) -> Result<()> {
    let data = serde_json::to_vec(watermark)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(date: &str, time: &str) -> RawTransaction {
        RawTransaction {
            date: date.to_string(),
            time: time.to_string(),
            ..Default::default()
        }
    }

    fn mark(date: &str, time: &str) -> Watermark {
        Watermark {
            date: date.to_string(),
            time: time.to_string(),
        }
    }

    #[test]
    fn test_is_zero() {
        assert!(Watermark::default().is_zero());
        assert!(mark("2020-09-20", "").is_zero());
        assert!(mark("", "12:17:00").is_zero());
        assert!(!mark("2020-09-20", "12:17:00").is_zero());
    }

    #[test]
    fn test_covers() {
        let cases = [
            (Watermark::default(), at("", ""), false),
            (mark("2020-09-20", "12:17:00"), at("", ""), false),
            (mark("2020-09-20", "12:17:00"), at("2020-09-20", "12:16:59"), true),
            (mark("2020-09-20", "12:17:00"), at("2020-09-20", "12:17:00"), true),
            (mark("2020-09-20", "12:17:00"), at("2020-09-20", "12:17:01"), false),
            (mark("2020-09-20", "12:17:25"), at("2020-09-19", "23:59:59"), true),
            (mark("2020-09-20", "12:17:25"), at("2020-09-21", "00:00:00"), false),
        ];

        for (n, (watermark, raw, expected)) in cases.iter().enumerate() {
            assert_eq!(watermark.covers(raw), *expected, "case #{}", n);
        }
    }

    #[test]
    fn test_malformed_timestamp_is_never_covered() {
        let watermark = mark("2020-09-20", "12:17:00");
        // "2020-9-1" would otherwise sort before the watermark.
        assert!(!watermark.covers(&at("2020-9-1", "12:00:00")));
        // Right width, wrong layout.
        assert!(!watermark.covers(&at("19-09-2020", "12:00:00")));
    }

    #[test]
    fn test_zero_watermark_keeps_everything() {
        let batch = vec![at("2020-09-20", "12:17:25"), at("", "")];
        assert_eq!(Watermark::default().filter(&batch), batch);
    }

    #[test]
    fn test_missing_state_file_is_zero() {
        let dir = TempDir::new().unwrap();
        let dedup = Deduplicator::open(dir.path().join("state"), "abcd").unwrap();
        assert!(dedup.watermark().is_zero());
        assert!(dir.path().join("state").is_dir());
    }

    #[test]
    fn test_corrupt_state_file_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("abcd.json"), "not json").unwrap();

        let err = Deduplicator::open(dir.path(), "abcd").unwrap_err();
        assert!(matches!(err, SorterError::CorruptWatermark { .. }));
    }

    #[test]
    fn test_malformed_state_file_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("abcd.json"),
            r#"{"date":"xxxx-xx-xx","time":"yy:yy:yy"}"#,
        )
        .unwrap();

        let err = Deduplicator::open(dir.path(), "abcd").unwrap_err();
        assert!(matches!(err, SorterError::CorruptWatermark { .. }));
        assert!(err.to_string().contains("malformed watermark"));
    }

    #[test]
    fn test_half_empty_state_file_is_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("abcd.json"),
            r#"{"date":"2020-09-20","time":""}"#,
        )
        .unwrap();

        let err = Deduplicator::open(dir.path(), "abcd").unwrap_err();
        assert!(matches!(err, SorterError::CorruptWatermark { .. }));
    }

    #[test]
    fn test_empty_state_file_value_is_zero() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("abcd.json"), r#"{"date":"","time":""}"#).unwrap();

        let dedup = Deduplicator::open(dir.path(), "abcd").unwrap();
        assert!(dedup.watermark().is_zero());
    }

    #[test]
    fn test_check_candidate() {
        assert!(mark("2020-09-20", "12:17:00").check_candidate().is_ok());
        assert!(Watermark::default().check_candidate().is_err());
        assert!(mark("2020-9-20", "12:17:00").check_candidate().is_err());
        assert!(mark("20-09-2020", "12:17:00").check_candidate().is_err());
    }

    #[test]
    fn test_advance_and_filter() {
        let dir = TempDir::new().unwrap();
        let mut dedup = Deduplicator::open(dir.path(), "abcd").unwrap();

        let batch = vec![
            at("2020-09-20", "12:17:25"),
            at("2020-09-20", "12:17:30"),
            at("2020-09-20", "12:17:35"),
        ];
        assert_eq!(dedup.filter(&batch), batch);

        dedup.advance(&batch[0]).unwrap();
        assert_eq!(dedup.filter(&batch), batch[1..].to_vec());

        dedup.advance(&batch[1]).unwrap();
        assert_eq!(dedup.filter(&batch), batch[2..].to_vec());

        dedup.advance(&batch[2]).unwrap();
        assert!(dedup.filter(&batch).is_empty());
    }

    #[test]
    fn test_advance_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let mut dedup = Deduplicator::open(dir.path(), "abcd").unwrap();
        dedup.advance(&at("2020-09-20", "12:17:00")).unwrap();

        let reopened = Deduplicator::open(dir.path(), "abcd").unwrap();
        assert_eq!(reopened.watermark(), &mark("2020-09-20", "12:17:00"));

        assert_eq!(reopened.path(), dir.path().join("abcd.json"));
        let stored = fs::read_to_string(reopened.path()).unwrap();
        assert_eq!(stored, r#"{"date":"2020-09-20","time":"12:17:00"}"#);
        assert!(!dir.path().join("abcd.json.tmp").exists());
    }

    #[test]
    fn test_advance_rejects_zero_candidate() {
        let dir = TempDir::new().unwrap();
        let mut dedup = Deduplicator::open(dir.path(), "abcd").unwrap();

        let err = dedup.advance(&at("2020-09-20", "")).unwrap_err();
        assert!(matches!(err, SorterError::InvalidWatermark { .. }));
        assert!(dedup.watermark().is_zero());
        assert!(!dir.path().join("abcd.json").exists());
    }

    #[test]
    fn test_advance_rejects_malformed_candidate() {
        let dir = TempDir::new().unwrap();
        let mut dedup = Deduplicator::open(dir.path(), "abcd").unwrap();

        assert!(dedup.advance(&at("2020-9-20", "12:17:00")).is_err());
        assert!(dedup.watermark().is_zero());
    }

    #[test]
    fn test_advance_never_rewinds() {
        let dir = TempDir::new().unwrap();
        let mut dedup = Deduplicator::open(dir.path(), "abcd").unwrap();

        dedup.advance(&at("2020-09-20", "12:17:00")).unwrap();
        dedup.advance(&at("2020-09-19", "08:00:00")).unwrap();
        assert_eq!(dedup.watermark(), &mark("2020-09-20", "12:17:00"));

        let reopened = Deduplicator::open(dir.path(), "abcd").unwrap();
        assert_eq!(reopened.watermark(), &mark("2020-09-20", "12:17:00"));
    }

    #[test]
    fn test_accounts_do_not_share_state() {
        let dir = TempDir::new().unwrap();
        let mut first = Deduplicator::open(dir.path(), "1111").unwrap();
        first.advance(&at("2020-09-20", "12:17:00")).unwrap();

        let second = Deduplicator::open(dir.path(), "2222").unwrap();
        assert!(second.watermark().is_zero());
    }
}
