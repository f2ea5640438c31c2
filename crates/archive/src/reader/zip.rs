//! In-process ZIP reader.

use crate::error::{ErrorKind, Result};
use crate::{ArchiveReader, EntryInfo};
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::instrument;
use ::zip::ZipArchive;
use ::zip::result::ZipError;

/// Reads archive metadata straight from the ZIP central directory.
///
/// Preferred over [`CommandReader`](crate::CommandReader): no process spawn
/// and no parsing of tool output. All file I/O happens on Tokio's blocking
/// pool.
#[derive(Clone, Debug, Default)]
pub struct ZipReader;
impl ZipReader {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            _ => ErrorKind::Unreadable(path.to_path_buf()),
        })?;
        ZipArchive::new(BufReader::new(file)).or_raise(|| ErrorKind::Unreadable(path.to_path_buf()))
    }

    fn list_blocking(path: &Path) -> Result<Vec<EntryInfo>> {
        let mut archive = Self::open(path)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            // Raw access skips the decompressor entirely.
            let file = archive.by_index_raw(index).or_raise(|| ErrorKind::Unreadable(path.to_path_buf()))?;
            if file.is_dir() {
                continue;
            }
            entries.push(EntryInfo::new(file.name(), file.size()));
        }
        Ok(entries)
    }

    fn read_blocking(path: &Path, entry: &str) -> Result<Vec<u8>> {
        let mut archive = Self::open(path)?;
        let mut file = match archive.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => exn::bail!(ErrorKind::EntryNotFound(entry.to_string())),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Unreadable(path.to_path_buf())),
        };
        let mut buffer = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut buffer).or_raise(|| ErrorKind::Unreadable(path.to_path_buf()))?;
        Ok(buffer)
    }

    async fn blocking<T, F>(path: &Path, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T> + Send + 'static,
    {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || task(path)).await.or_raise(|| ErrorKind::Task)?
    }
}

#[async_trait]
impl ArchiveReader for ZipReader {
    fn name(&self) -> &str {
        "zip"
    }

    #[instrument(skip(self), fields(archive = %archive.display(), entries))]
    async fn list(&self, archive: &Path) -> Result<Vec<EntryInfo>> {
        let entries = Self::blocking(archive, |path| Self::list_blocking(&path)).await?;
        tracing::Span::current().record("entries", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self), fields(archive = %archive.display()))]
    async fn read_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>> {
        let entry = entry.to_string();
        Self::blocking(archive, move |path| Self::read_blocking(&path, &entry)).await
    }
}
