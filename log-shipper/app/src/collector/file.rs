//! One-shot file ingestion.
//!
//! [`FileSourceReader`] is a plain blocking iterator: it reads one row or line
//! at a time and hands back normalized records, so the caller decides how to
//! batch them and the file is never held in memory as a whole.

use crate::domain::{CanonicalRecord, Destination, FileFormat};
use crate::parser::regex_patterns::FILE_NAME_STAMP;
use crate::parser::{RecordNormalizer, RowTime, TabularHeader, try_parse_timestamp};
use chrono::{Datelike, Utc};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileSourceError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read CSV header of {path}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("File name of {path} carries no YYYYMMDD-HHMMSS stamp")]
    MissingFileStamp { path: PathBuf },
}

enum Rows {
    Tabular {
        header: TabularHeader,
        time: RowTime,
        rows: csv::ByteRecordsIntoIter<BufReader<File>>,
    },
    Lines {
        reader: BufReader<File>,
        buf: Vec<u8>,
    },
}

/// Streams the records of a single file for a single destination.
pub struct FileSourceReader {
    path: PathBuf,
    destination: Destination,
    normalizer: Arc<RecordNormalizer>,
    rows: Rows,
    finished: bool,
}

impl FileSourceReader {
    pub fn open(
        path: impl AsRef<Path>,
        destination: Destination,
        format: FileFormat,
        normalizer: Arc<RecordNormalizer>,
    ) -> Result<Self, FileSourceError> {
        let path = path.as_ref().to_path_buf();

        // Checked before the file is touched so a misnamed file reads nothing.
        let fixed_time = match format {
            FileFormat::StampedCsv => Some(file_stamp(&path)?),
            _ => None,
        };

        let file = File::open(&path).map_err(|source| FileSourceError::Open {
            path: path.clone(),
            source,
        })?;
        let reader = BufReader::new(file);

        let rows = match format {
            FileFormat::Bracketed => Rows::Lines {
                reader,
                buf: Vec::with_capacity(256),
            },
            FileFormat::Csv | FileFormat::StampedCsv => {
                let mut csv_reader = csv::ReaderBuilder::new()
                    .flexible(true)
                    .has_headers(true)
                    .from_reader(reader);
                let header = {
                    let raw = csv_reader
                        .byte_headers()
                        .map_err(|source| FileSourceError::Header {
                            path: path.clone(),
                            source,
                        })?;
                    let columns: Vec<Cow<'_, str>> =
                        raw.iter().map(String::from_utf8_lossy).collect();
                    TabularHeader::new(columns.iter().map(|c| c.as_ref()))
                };
                let time = match fixed_time {
                    Some(ts) => RowTime::Fixed(ts),
                    None => RowTime::Column,
                };
                Rows::Tabular {
                    header,
                    time,
                    rows: csv_reader.into_byte_records(),
                }
            }
        };

        tracing::debug!(
            "Opened {} as {} source for destination {}",
            path.display(),
            format,
            destination
        );

        Ok(Self {
            path,
            destination,
            normalizer,
            rows,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }
}

impl Iterator for FileSourceReader {
    type Item = Result<CanonicalRecord, FileSourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match &mut self.rows {
                Rows::Tabular { header, time, rows } => match rows.next()? {
                    Ok(row) => {
                        let values: Vec<Cow<'_, str>> =
                            row.iter().map(String::from_utf8_lossy).collect();
                        let record = self.normalizer.tabular_row(
                            header,
                            values.iter().map(|v| v.as_ref()),
                            &self.destination,
                            *time,
                        );
                        if let Some(record) = record {
                            return Some(Ok(record));
                        }
                    }
                    Err(e) if e.is_io_error() => {
                        self.finished = true;
                        return Some(Err(FileSourceError::Read {
                            path: self.path.clone(),
                            source: std::io::Error::other(e),
                        }));
                    }
                    Err(e) => {
                        tracing::debug!("Skipping undecodable row in {}: {}", self.path.display(), e);
                        self.normalizer.record_skip();
                    }
                },
                Rows::Lines { reader, buf } => {
                    buf.clear();
                    match reader.read_until(b'\n', buf) {
                        Ok(0) => {
                            self.finished = true;
                            return None;
                        }
                        Ok(_) => {
                            let line = String::from_utf8_lossy(buf);
                            let line = line.trim_end_matches(['\n', '\r']);
                            if line.trim().is_empty() {
                                continue;
                            }
                            if let Some(record) = self.normalizer.bracketed(line, &self.destination)
                            {
                                return Some(Ok(record));
                            }
                        }
                        Err(source) => {
                            self.finished = true;
                            return Some(Err(FileSourceError::Read {
                                path: self.path.clone(),
                                source,
                            }));
                        }
                    }
                }
            }
        }
    }
}

/// Extracts the `YYYYMMDD-HHMMSS` stamp from a file name as epoch seconds.
pub fn file_stamp(path: &Path) -> Result<i64, FileSourceError> {
    let missing = || FileSourceError::MissingFileStamp {
        path: path.to_path_buf(),
    };

    let name = path.file_name().map(|n| n.to_string_lossy()).ok_or_else(missing)?;
    let regex = FILE_NAME_STAMP.regex().map_err(|_| missing())?;
    let stamp = regex
        .captures(&name)
        .and_then(|caps| caps.get(1))
        .ok_or_else(missing)?;

    try_parse_timestamp(stamp.as_str(), Utc::now().year()).ok_or_else(missing)
}
