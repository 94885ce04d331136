//! Domain layer for log-shipper.
//!
//! Contains the canonical types shared across all modules:
//! - `CanonicalRecord`: The pipeline's core data type
//! - `Destination`: Remote log stream a record is shipped to
//! - `SourceBinding`: Static channel → destination mapping
//! - `EnvironmentTags`: Host metadata attached to every batch
//! - `DomainError`: Construction errors for the types above

pub mod binding;
pub mod error;
pub mod record;
pub mod tags;

pub use binding::{FileFormat, ListenAddress, SourceBinding};
pub use error::DomainError;
pub use record::{CanonicalRecord, Destination, Fields, MAX_TIMESTAMP, is_valid_timestamp};
pub use tags::EnvironmentTags;
