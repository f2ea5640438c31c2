//! Archive reader trait and implementations.
//!
//! Archives can be many gigabytes, so readers only ever touch the central
//! directory (for listings) or a single entry (for reads). Nothing here ever
//! decompresses an archive as a whole.

mod command;
mod zip;

pub use self::command::CommandReader;
pub use self::zip::ZipReader;
use crate::EntryInfo;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for inspecting archives on disk.
///
/// # Examples
///
/// ```no_run
/// use folio_archive::{ArchiveReader, ZipReader};
/// use std::path::Path;
///
/// # async fn example() -> folio_archive::error::Result<()> {
/// let reader = ZipReader::new();
/// let archive = Path::new("/srv/library/f.fb2.1-1000.zip");
/// for entry in reader.list(archive).await? {
///     println!("{} ({} bytes)", entry.name, entry.size);
/// }
/// let bytes = reader.read_entry(archive, "17.fb2").await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ArchiveReader: Send + Sync {
    /// Name of the implementation, for logging only.
    fn name(&self) -> &str;

    /// List every entry in the archive along with its uncompressed size.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the archive
    /// does not exist, and [`Unreadable`](crate::error::ErrorKind::Unreadable)
    /// if its directory cannot be parsed.
    async fn list(&self, archive: &Path) -> Result<Vec<EntryInfo>>;

    /// Read a single entry, using its exact name as returned by
    /// [`list()`](Self::list).
    ///
    /// Returns [`EntryNotFound`](crate::error::ErrorKind::EntryNotFound) if
    /// the archive has no entry by that name.
    async fn read_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>>;
}
