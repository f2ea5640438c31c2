//! Archive classification and inspection.
//!
//! Book files live inside large ZIP archives whose names declare what they
//! hold. This crate provides:
//!
//! - **Filename classification** via an ordered [`PatternTable`], yielding an
//!   [`ArchiveFile`] with its [`Format`] and [`ArchiveKind`]
//! - **Entry helpers** for pulling numeric book ids out of entry names
//!   ([`book_id`], [`IdSpan`])
//! - **Readers** behind the [`ArchiveReader`] trait: [`ZipReader`] reads the
//!   central directory in-process, [`CommandReader`] shells out to `unzip`

mod entry;
pub mod error;
mod format;
mod pattern;
mod reader;

pub use crate::entry::{EntryInfo, IdSpan, basename, book_id};
pub use crate::format::{FALLBACK_EXTENSIONS, candidate_extensions};
pub use crate::pattern::{ArchiveFile, ArchiveKind, Family, PatternTable};
pub use crate::reader::{ArchiveReader, CommandReader, ZipReader};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type ReaderHandle = Arc<dyn ArchiveReader>;

/// A book document format, as declared by archive names and entry extensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// FictionBook XML (.fb2)
    Fb2,
    /// EPUB (.epub)
    Epub,
    /// DjVu (.djvu)
    Djvu,
    /// PDF (.pdf)
    Pdf,
    /// Mobipocket (.mobi)
    Mobi,
    /// Plain text (.txt)
    Txt,
    #[default]
    Unknown,
}
