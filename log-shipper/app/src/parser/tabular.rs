use super::header::{clean_header, strip_whitespace};
use super::timestamp::parse_timestamp;
use crate::domain::{CanonicalRecord, Destination, Fields};

const TIME_COLUMN: &str = "time";

/// Where a tabular row takes its timestamp from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTime {
    /// Extract the `time` column and run it through the timestamp parser.
    Column,
    /// Every row shares one timestamp; no column is extracted.
    Fixed(i64),
}

/// Cleaned header of a tabular source.
#[derive(Debug, Clone)]
pub struct TabularHeader {
    keys: Vec<String>,
}

impl TabularHeader {
    pub fn new<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            keys: columns.into_iter().map(clean_header).collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn has_time_column(&self) -> bool {
        self.keys.iter().any(|k| k == TIME_COLUMN)
    }

    /// Normalizes one data row. Returns `None` when the row has no
    /// non-empty field and no timestamp.
    pub fn normalize_row<'a>(
        &self,
        values: impl IntoIterator<Item = &'a str>,
        destination: &Destination,
        time: RowTime,
    ) -> Option<CanonicalRecord> {
        let mut fields = Fields::with_capacity(self.keys.len());
        let mut raw_time: Option<&str> = None;

        for (key, value) in self.keys.iter().zip(values) {
            if key.is_empty() {
                continue;
            }
            if time == RowTime::Column && key == TIME_COLUMN {
                if !value.is_empty() {
                    raw_time = Some(value);
                }
                continue;
            }
            fields.insert(key.as_str(), strip_whitespace(value));
        }

        let timestamp = match time {
            RowTime::Column => raw_time.map(parse_timestamp),
            RowTime::Fixed(ts) => Some(ts),
        };

        if fields.is_empty() && timestamp.is_none() {
            return None;
        }

        Some(CanonicalRecord::new(destination.clone(), timestamp, fields))
    }
}
