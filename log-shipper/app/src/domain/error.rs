use thiserror::Error;

/// Errors raised while constructing domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Destination name must not be empty")]
    EmptyDestination,

    #[error("Channel identifier must not be empty")]
    EmptyChannel,

    #[error("Unknown file format '{0}'. Valid formats: csv, bracketed, stamped-csv")]
    UnknownFileFormat(String),
}
