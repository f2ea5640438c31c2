//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive file does not exist.
    #[display("archive not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The archive exists but its directory could not be read (corrupt,
    /// truncated, permission problem). Skip it and try something else.
    #[display("unreadable archive: {}", _0.display())]
    Unreadable(#[error(not(source))] PathBuf),
    /// The archive was readable but does not contain the requested entry.
    #[display("entry not found: {_0}")]
    EntryNotFound(#[error(not(source))] String),
    /// The external listing tool is missing or exited unsuccessfully.
    #[display("external tool failed: {_0}")]
    Tool(#[error(not(source))] String),
    /// The value is not a recognised book format.
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// A listing or read did not finish within the probe timeout.
    #[display("timed out probing archive: {}", _0.display())]
    TimedOut(#[error(not(source))] PathBuf),
    /// A blocking task could not be joined.
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Task | Self::Tool(_) | Self::TimedOut(_))
    }
}
