//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Strategies swallow these into
//! `None`; they exist so the reason for a miss can be logged.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The document is too broken to scan.
    #[display("malformed {_0} document")]
    Malformed(#[error(not(source))] &'static str),
    /// A file the document structure requires is absent.
    #[display("missing document entry: {_0}")]
    MissingEntry(#[error(not(source))] String),
    /// An embedded payload was not valid base64.
    #[display("invalid embedded binary: {_0}")]
    Decode(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Documents are immutable; the same bytes fail the same way.
        false
    }
}
