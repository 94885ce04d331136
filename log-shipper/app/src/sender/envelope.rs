//! Binary batch envelope.
//!
//! A batch becomes one protobuf `LogGroup`, is compressed, and is checksummed
//! over the compressed bytes. The encoded form is produced once per batch and
//! reused across retries.

use crate::buffer::Batch;
use crate::domain::{CanonicalRecord, EnvironmentTags};
use bytes::Bytes;
use flate2::Compression as DeflateLevel;
use flate2::write::ZlibEncoder;
use prost::Message;
use serde::Deserialize;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Refusing to encode an empty batch")]
    EmptyBatch,
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

#[derive(Clone, PartialEq, Message)]
pub struct LogContent {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Log {
    #[prost(uint32, required, tag = "1")]
    pub time: u32,
    #[prost(message, repeated, tag = "2")]
    pub contents: Vec<LogContent>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LogTag {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct LogGroup {
    #[prost(message, repeated, tag = "1")]
    pub logs: Vec<Log>,
    #[prost(string, tag = "3")]
    pub topic: String,
    #[prost(string, tag = "4")]
    pub source: String,
    #[prost(message, repeated, tag = "6")]
    pub log_tags: Vec<LogTag>,
}

/// Ingestion mode recorded as the group topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    StreamMode,
    FileMode,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::StreamMode => "StreamMode",
            Topic::FileMode => "FileMode",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Lz4,
    Deflate,
}

impl Compression {
    /// Value of the `x-log-compresstype` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Lz4 => "lz4",
            Compression::Deflate => "deflate",
        }
    }

    pub fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Compression::Lz4 => Ok(lz4_flex::block::compress(raw)),
            Compression::Deflate => {
                let mut encoder = ZlibEncoder::new(
                    Vec::with_capacity(raw.len() / 2),
                    DeflateLevel::default(),
                );
                encoder.write_all(raw)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lz4" => Ok(Compression::Lz4),
            "deflate" | "zlib" => Ok(Compression::Deflate),
            other => Err(format!("Unknown compression '{other}'. Expected lz4 or deflate")),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compressed, checksummed envelope ready to be sent.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub body: Bytes,
    pub raw_size: usize,
    /// Upper-case hex MD5 of `body`.
    pub checksum: String,
    pub compression: Compression,
}

/// Builds envelopes for one ingestion mode on one host.
#[derive(Debug, Clone)]
pub struct EnvelopeEncoder {
    topic: Topic,
    source: String,
    tags: EnvironmentTags,
    compression: Compression,
}

impl EnvelopeEncoder {
    pub fn new(
        topic: Topic,
        source: impl Into<String>,
        tags: EnvironmentTags,
        compression: Compression,
    ) -> Self {
        Self {
            topic,
            source: source.into(),
            tags,
            compression,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn log_group(&self, batch: &Batch) -> LogGroup {
        let logs = batch.records().iter().map(to_log).collect();

        let log_tags = self
            .tags
            .iter()
            .map(|(key, value)| LogTag {
                key: key.to_string(),
                value: value.to_string(),
            })
            .collect();

        LogGroup {
            logs,
            topic: self.topic.as_str().to_string(),
            source: self.source.clone(),
            log_tags,
        }
    }

    pub fn encode(&self, batch: &Batch) -> Result<EncodedBatch, EnvelopeError> {
        if batch.is_empty() {
            return Err(EnvelopeError::EmptyBatch);
        }

        let raw = self.log_group(batch).encode_to_vec();
        let compressed = self.compression.compress(&raw)?;
        let checksum = format!("{:X}", md5::compute(&compressed));

        Ok(EncodedBatch {
            body: Bytes::from(compressed),
            raw_size: raw.len(),
            checksum,
            compression: self.compression,
        })
    }
}

fn to_log(record: &CanonicalRecord) -> Log {
    // Records only carry timestamps in 1..=MAX_TIMESTAMP.
    let time = u32::try_from(record.timestamp()).unwrap_or(u32::MAX);
    let contents = record
        .fields()
        .iter()
        .map(|(key, value)| LogContent {
            key: key.to_string(),
            value: value.to_string(),
        })
        .collect();
    Log { time, contents }
}
