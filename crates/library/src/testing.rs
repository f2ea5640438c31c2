//! Shared fixture for library tests: a temp archive root, a temp asset
//! cache and an in-memory catalog.

use crate::{Library, Settings};
use async_trait::async_trait;
use folio_archive::{ArchiveReader, EntryInfo, ReaderHandle, ZipReader};
use folio_catalog::{CatalogEntry, Database, Repository};
use folio_storage::BackendHandle;
use folio_storage::backend::LocalBackend;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub(crate) struct Fixture {
    _dir: TempDir,
    archives: PathBuf,
    assets: PathBuf,
    catalog: Database,
}

impl Fixture {
    pub(crate) async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let archives = dir.path().join("archives");
        let assets = dir.path().join("assets");
        std::fs::create_dir_all(&archives).unwrap();
        let catalog = Database::connect_in_memory().await.unwrap();
        Self { _dir: dir, archives, assets, catalog }
    }

    pub(crate) fn settings(&self) -> Settings {
        Settings::default()
    }

    pub(crate) fn library(&self) -> Library {
        self.library_with(self.settings())
    }

    pub(crate) fn library_with(&self, settings: Settings) -> Library {
        let archives = LocalBackend::open("archives", &self.archives).unwrap();
        self.library_from(Arc::new(archives), Arc::new(ZipReader::new()), settings)
    }

    /// Library over the fixture's catalog and asset cache with a custom
    /// archive listing and reader.
    pub(crate) fn library_from(&self, archives: BackendHandle, reader: ReaderHandle, settings: Settings) -> Library {
        let assets = LocalBackend::create("assets", &self.assets).unwrap();
        Library::new(self.catalog.clone(), &self.archives, archives, reader, Arc::new(assets), settings)
    }

    pub(crate) fn repo(&self) -> Repository {
        self.catalog.repository(false)
    }

    /// Catalog `filename` at priority 0.
    pub(crate) async fn range(&self, filename: &str, start: u64, end: u64) {
        self.repo().upsert(&CatalogEntry::new(filename, start, end, 0)).await.unwrap();
    }

    /// Write a stored-entry zip into the archive root.
    pub(crate) fn archive(&self, name: &str, entries: &[(&str, &[u8])]) {
        write_zip(&self.archives.join(name), entries);
    }

    pub(crate) fn raw_file(&self, name: &str, data: &[u8]) {
        std::fs::write(self.archives.join(name), data).unwrap();
    }

    pub(crate) fn remove(&self, name: &str) {
        std::fs::remove_file(self.archives.join(name)).unwrap();
    }

    pub(crate) fn archives_path(&self) -> &Path {
        &self.archives
    }

    pub(crate) fn assets_path(&self, relative: &str) -> PathBuf {
        self.assets.join(relative)
    }
}

/// Delegates to [`ZipReader`], but hangs for `delay` on any archive whose
/// filename contains `marker`.
pub(crate) struct StallingReader {
    inner: ZipReader,
    marker: &'static str,
    delay: Duration,
}

impl StallingReader {
    pub(crate) fn new(marker: &'static str, delay: Duration) -> Self {
        Self { inner: ZipReader::new(), marker, delay }
    }

    async fn stall(&self, archive: &Path) {
        if archive.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.contains(self.marker)) {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ArchiveReader for StallingReader {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn list(&self, archive: &Path) -> folio_archive::error::Result<Vec<EntryInfo>> {
        self.stall(archive).await;
        self.inner.list(archive).await
    }

    async fn read_entry(&self, archive: &Path, entry: &str) -> folio_archive::error::Result<Vec<u8>> {
        self.stall(archive).await;
        self.inner.read_entry(archive, entry).await
    }
}

pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Minimal FictionBook with one cover binary.
pub(crate) fn fb2_with_cover(image: &[u8]) -> Vec<u8> {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <FictionBook><body><p>text</p></body>\
         <binary id=\"cover.jpg\" content-type=\"image/jpeg\">{encoded}</binary></FictionBook>"
    )
    .into_bytes()
}
