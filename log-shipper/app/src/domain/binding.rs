use super::error::DomainError;
use super::record::Destination;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Layout of an at-rest log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// CSV with a header row; a `time` column supplies the timestamp.
    #[default]
    Csv,
    /// `[<timestamp>]<message>` lines.
    Bracketed,
    /// CSV whose timestamp comes from a `YYYYMMDD-HHMMSS` stamp in the file name.
    StampedCsv,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Bracketed => "bracketed",
            FileFormat::StampedCsv => "stamped-csv",
        }
    }
}

impl FromStr for FileFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "bracketed" | "log" => Ok(FileFormat::Bracketed),
            "stamped-csv" | "stamped_csv" => Ok(FileFormat::StampedCsv),
            _ => Err(DomainError::UnknownFileFormat(s.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a live channel accepts its peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl FromStr for ListenAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(format!("Empty socket path in '{s}'"));
            }
            return Ok(ListenAddress::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return addr
                .parse()
                .map(ListenAddress::Tcp)
                .map_err(|e| format!("Invalid TCP address '{addr}': {e}"));
        }
        Err(format!(
            "Invalid listen address '{s}'. Expected 'unix:/path' or 'tcp:host:port'"
        ))
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Tcp(addr) => write!(f, "tcp:{addr}"),
            ListenAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Static mapping of an inbound channel to its destination.
///
/// Computed once at startup and never re-registered. Bindings without a
/// listen address are only reachable through file ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBinding {
    pub channel: String,
    pub destination: Destination,
    pub listen: Option<ListenAddress>,
    pub file_format: FileFormat,
}

impl SourceBinding {
    pub fn new(
        channel: impl Into<String>,
        destination: Destination,
        listen: Option<ListenAddress>,
        file_format: FileFormat,
    ) -> Result<Self, DomainError> {
        let channel = channel.into();
        if channel.trim().is_empty() {
            return Err(DomainError::EmptyChannel);
        }
        Ok(Self {
            channel,
            destination,
            listen,
            file_format,
        })
    }
}
