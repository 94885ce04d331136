use super::error::DomainError;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// Name of the remote log stream a record is delivered to.
///
/// Backed by an `Arc<str>` so every record of a channel can share one
/// allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination(Arc<str>);

impl Destination {
    pub fn new(name: impl AsRef<str>) -> Result<Self, DomainError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(DomainError::EmptyDestination);
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Destination {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered field map of a record.
///
/// Keys are unique and keep their first insertion position. Empty values are
/// never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, String)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a field, replacing the value of an existing key in place.
    /// Empty values are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

/// Latest time the envelope's 32-bit time field can carry.
pub const MAX_TIMESTAMP: i64 = u32::MAX as i64;

pub fn is_valid_timestamp(ts: i64) -> bool {
    (1..=MAX_TIMESTAMP).contains(&ts)
}

/// A normalized log record ready for queueing and delivery.
///
/// This is the canonical representation of a log line throughout the pipeline,
/// from normalizer output through to the wire envelope. It has no mutating API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    destination: Destination,
    timestamp: i64,
    fields: Fields,
}

impl CanonicalRecord {
    /// Builds a record. A missing timestamp, or one outside
    /// `1..=MAX_TIMESTAMP`, is replaced with the current UTC time.
    pub fn new(destination: Destination, timestamp: Option<i64>, fields: Fields) -> Self {
        let timestamp = timestamp
            .filter(|ts| is_valid_timestamp(*ts))
            .unwrap_or_else(|| Utc::now().timestamp());
        Self {
            destination,
            timestamp,
            fields,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key)
    }
}
