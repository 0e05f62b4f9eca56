//! Error types for geobisect.

use thiserror::Error;

use crate::family::AddressFamily;

/// Error type for geobisect operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database file length is not a whole number of records
    #[error("invalid {family} database: {len} bytes is not a multiple of the {stride}-byte stride")]
    InvalidDatabase {
        family: AddressFamily,
        len: usize,
        stride: usize,
    },

    /// Source feed could not be decoded
    #[error("invalid source feed: {0}")]
    InvalidSource(String),

    /// Source row without the start/end/country columns
    #[error("malformed row at line {line}: expected 3 fields, got {fields}")]
    MalformedRow { line: u64, fields: usize },

    /// Start address lower than the previous start of the same family
    #[error("unsorted input at line {line}: {family} start address goes backwards")]
    UnsortedInput { line: u64, family: AddressFamily },

    /// Address pushed to a writer of the other family
    #[error("address family mismatch: expected {expected}, got {actual}")]
    FamilyMismatch {
        expected: AddressFamily,
        actual: AddressFamily,
    },

    /// Invalid country code
    #[error("invalid country code: {0}")]
    InvalidCountryCode(String),

    /// Invalid IP address
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    /// Invalid artifact version
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Published versions are immutable
    #[error("version {0} already published")]
    VersionExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Download error
    #[error("download error: {0}")]
    Download(String),
}

/// Result type alias for geobisect operations.
pub type Result<T> = std::result::Result<T, Error>;
