//! Canonical record normalization.
//!
//! Each input variant has its own module; [`RecordNormalizer`] is the shared
//! facade used by the sources. It never fails: inputs that cannot be turned
//! into a record are counted as skipped and dropped.

pub mod bracketed;
pub mod header;
pub mod key_value;
pub mod regex_patterns;
pub mod tabular;
pub mod timestamp;

pub use bracketed::normalize_bracketed;
pub use header::{clean_header, strip_whitespace};
pub use key_value::normalize_key_value;
pub use regex_patterns::RegexError;
pub use tabular::{RowTime, TabularHeader};
pub use timestamp::{parse_timestamp, parse_timestamp_at, try_parse_timestamp};

use crate::domain::{CanonicalRecord, Destination};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the normalizer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizerSnapshot {
    pub produced: u64,
    pub skipped: u64,
}

/// Stateless apart from its counters; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct RecordNormalizer {
    produced: AtomicU64,
    skipped: AtomicU64,
}

impl RecordNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_value(&self, line: &str, destination: &Destination) -> Option<CanonicalRecord> {
        self.track(normalize_key_value(line, destination))
    }

    pub fn bracketed(&self, line: &str, destination: &Destination) -> Option<CanonicalRecord> {
        self.track(normalize_bracketed(line, destination))
    }

    pub fn tabular_row<'a>(
        &self,
        header: &TabularHeader,
        values: impl IntoIterator<Item = &'a str>,
        destination: &Destination,
        time: RowTime,
    ) -> Option<CanonicalRecord> {
        self.track(header.normalize_row(values, destination, time))
    }

    /// Counts an input that was rejected before reaching a normalizer,
    /// e.g. an undecodable CSV row.
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NormalizerSnapshot {
        NormalizerSnapshot {
            produced: self.produced.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    fn track(&self, record: Option<CanonicalRecord>) -> Option<CanonicalRecord> {
        match record {
            Some(_) => self.produced.fetch_add(1, Ordering::Relaxed),
            None => self.skipped.fetch_add(1, Ordering::Relaxed),
        };
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizer_counts_outcomes() {
        let normalizer = RecordNormalizer::new();
        let destination = Destination::new("cpuinfolog").unwrap();

        assert!(normalizer.key_value("cpu=1", &destination).is_some());
        assert!(normalizer.key_value("garbage", &destination).is_none());
        assert!(normalizer.bracketed("[x] y", &destination).is_some());
        normalizer.record_skip();

        assert_eq!(
            normalizer.snapshot(),
            NormalizerSnapshot {
                produced: 2,
                skipped: 2
            }
        );
    }
}
