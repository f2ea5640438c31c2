//! Write-once asset cache.
//!
//! Layout under the cache root: `covers/{book_id}.{ext}` and, when book
//! file caching is enabled, `files/{book_id}.{ext}`. Source archives never
//! change once published, so entries are never invalidated.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use folio_extract::ImageFormat;
use folio_storage::{BackendHandle, StorageBackend};
use folio_storage::error::ErrorKind as StorageErrorKind;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    File,
    Cover,
}
impl AssetKind {
    pub fn dir(&self) -> &'static str {
        match self {
            Self::File => "files",
            Self::Cover => "covers",
        }
    }
}

/// A cache hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedAsset {
    /// Path relative to the cache root.
    pub path: PathBuf,
    pub extension: String,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct AssetCache {
    backend: BackendHandle,
}
impl AssetCache {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    fn path(kind: AssetKind, book_id: u64, extension: &str) -> PathBuf {
        PathBuf::from(kind.dir()).join(format!("{book_id}.{extension}"))
    }

    /// First existing `{kind}/{book_id}.{ext}` among `extensions`.
    #[instrument(skip(self, extensions))]
    pub async fn get(&self, kind: AssetKind, book_id: u64, extensions: &[&str]) -> Result<Option<CachedAsset>> {
        for extension in extensions {
            let path = Self::path(kind, book_id, extension);
            match self.backend.read(&path).await {
                Ok(data) => {
                    debug!(path = %path.display(), "asset cache hit");
                    return Ok(Some(CachedAsset { path, extension: extension.to_string(), data }));
                },
                Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => continue,
                Err(err) => return Err(err).or_raise(|| ErrorKind::Cache),
            }
        }
        Ok(None)
    }

    /// Store `data` under an explicit extension. Returns the relative path.
    pub async fn put(&self, kind: AssetKind, book_id: u64, extension: &str, data: &[u8]) -> Result<PathBuf> {
        let path = Self::path(kind, book_id, extension);
        self.backend.write(&path, data).await.or_raise(|| ErrorKind::Cache)?;
        debug!(path = %path.display(), size = data.len(), "stored asset");
        Ok(path)
    }

    pub async fn get_cover(&self, book_id: u64) -> Result<Option<CachedAsset>> {
        self.get(AssetKind::Cover, book_id, &ImageFormat::EXTENSIONS).await
    }

    /// Store a cover under the extension its magic bytes imply.
    pub async fn put_cover(&self, book_id: u64, data: &[u8]) -> Result<ImageFormat> {
        let format = ImageFormat::from_magic_bytes(data);
        self.put(AssetKind::Cover, book_id, format.extension(), data).await?;
        Ok(format)
    }
}
