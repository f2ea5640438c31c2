//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the catalog, storage and
//! archive crates are wrapped as children of these kinds.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Expected misses
/// - [`ErrorKind::BookFileNotFound`]
/// - [`ErrorKind::CoverNotFound`]
///
/// ### Per-item failures (recovered from, logged or reported)
/// - [`ErrorKind::ArchiveUnreadable`]
/// - [`ErrorKind::CatalogInconsistency`]
///
/// ### Fatal for the offline tools
/// - [`ErrorKind::Persistence`]
/// - [`ErrorKind::ArchiveRoot`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No candidate archive yielded an entry for the book.
    #[display("no file found for book {_0}")]
    BookFileNotFound(#[error(not(source))] u64),
    /// Neither the attachments archive nor the book itself had a cover.
    #[display("no cover found for book {_0}")]
    CoverNotFound(#[error(not(source))] u64),
    /// An archive could not be listed or read (I/O, corruption, timeout).
    #[display("archive unreadable: {_0}")]
    ArchiveUnreadable(#[error(not(source))] String),
    /// The catalog disagrees with what is on disk.
    #[display("catalog inconsistency: {_0}")]
    CatalogInconsistency(#[error(not(source))] String),
    /// The catalog database failed.
    #[display("catalog persistence failure")]
    Persistence,
    /// The archive root itself could not be listed.
    #[display("cannot list archive root: {}", _0.display())]
    ArchiveRoot(#[error(not(source))] PathBuf),
    /// Reading or writing the asset cache failed.
    #[display("asset cache failure")]
    Cache,
    /// The library could not be assembled from configuration.
    #[display("invalid library configuration")]
    Config,
    /// A purge filter is not a valid regular expression.
    #[display("invalid filename pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ArchiveUnreadable(_) | Self::Persistence | Self::ArchiveRoot(_) | Self::Cache)
    }

    /// Expected misses, reported to callers as "not found" rather than failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BookFileNotFound(_) | Self::CoverNotFound(_))
    }
}
