//! Book resolution, cover extraction and catalog maintenance.
//!
//! [`Library`] is the one service object everything goes through. It is
//! built once at startup and shared by reference:
//!
//! - **Serving path**: [`Library::resolve`] finds a book's bytes inside the
//!   range-partitioned archives, [`Library::cover`] finds or extracts its
//!   cover. Both recover from individual bad candidates and only report a
//!   miss once every option is exhausted.
//! - **Offline tools**: [`Library::audit`] (read-only report),
//!   [`Library::reconcile`] (rewrites catalog ranges from what is on disk)
//!   and [`Library::purge`] (drops rows for archives that no longer exist).

mod assets;
mod audit;
mod cover;
pub mod error;
mod locate;
mod probe;
mod purge;
mod reconcile;
mod resolve;
#[cfg(test)]
mod testing;

pub use crate::assets::{AssetCache, AssetKind, CachedAsset};
pub use crate::audit::{AuditFinding, AuditReport, MappingIssue};
pub use crate::cover::{Cover, CoverExtractor, CoverOrigin};
pub use crate::locate::{Match, locate};
pub use crate::probe::Prober;
pub use crate::purge::{PurgeOptions, PurgeReport};
pub use crate::reconcile::{Change, ChangeSet, Overlap, ReconcileOptions, SkipReason, Skipped};
pub use crate::resolve::{BookOrigin, ResolvedBook};

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use folio_archive::{CommandReader, Format, PatternTable, ReaderHandle, ZipReader};
use folio_catalog::{Database, Repository};
use folio_config::{Config, Lister};
use folio_storage::backend::LocalBackend;
use folio_storage::{BackendHandle, FileInfo, StorageBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Tunables the library needs at runtime, usually derived from [`Config`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Attachments archive filename, relative to the archive root.
    pub attachments: String,
    pub include_experimental: bool,
    pub cache_book_files: bool,
    pub max_concurrent_extractions: usize,
    pub probe_timeout: Duration,
    pub audit_sample_size: usize,
    /// Formats whose range archives must reach the end of the library.
    pub coverage_formats: Vec<Format>,
    pub purge_batch_size: usize,
    pub purge_sample_size: usize,
}
impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}
impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            attachments: config.archives.attachments.clone(),
            include_experimental: config.archives.include_experimental,
            cache_book_files: config.assets.cache_book_files,
            max_concurrent_extractions: config.limits.max_concurrent_extractions,
            probe_timeout: config.limits.probe_timeout(),
            audit_sample_size: config.limits.audit_sample_size,
            coverage_formats: config.archives.coverage_formats.clone(),
            purge_batch_size: config.limits.purge_batch_size,
            purge_sample_size: config.limits.purge_sample_size,
        }
    }
}

pub struct Library {
    catalog: Database,
    archives_root: PathBuf,
    archives: BackendHandle,
    prober: Prober,
    assets: AssetCache,
    covers: CoverExtractor,
    settings: Settings,
}

impl Library {
    /// Assemble a library from its parts. `archives` must list the
    /// directory at `archives_root`; readers receive absolute paths.
    pub fn new(
        catalog: Database,
        archives_root: impl Into<PathBuf>,
        archives: BackendHandle,
        reader: ReaderHandle,
        assets: BackendHandle,
        settings: Settings,
    ) -> Self {
        let prober = Prober::new(reader, settings.max_concurrent_extractions, settings.probe_timeout);
        Self {
            catalog,
            archives_root: archives_root.into(),
            archives,
            prober,
            assets: AssetCache::new(assets),
            covers: CoverExtractor::default(),
            settings,
        }
    }

    /// Open the catalog, archive root and asset cache named by `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let catalog = Database::connect(&config.catalog.database).await.or_raise(|| ErrorKind::Persistence)?;
        let root = &config.archives.root;
        let archives = LocalBackend::open("archives", root).or_raise(|| ErrorKind::ArchiveRoot(root.clone()))?;
        let assets = LocalBackend::create("assets", &config.assets.root).or_raise(|| ErrorKind::Cache)?;
        let reader: ReaderHandle = match config.archives.lister {
            Lister::Zip => Arc::new(ZipReader::new()),
            Lister::Command => Arc::new(CommandReader::new(&config.archives.command).or_raise(|| ErrorKind::Config)?),
        };
        info!(root = %root.display(), reader = reader.name(), "opened library");
        Ok(Self::new(catalog, root.clone(), Arc::new(archives), reader, Arc::new(assets), Settings::from(config)))
    }

    /// Replace the cover extractor, e.g. to instrument its strategies.
    #[must_use]
    pub fn with_cover_extractor(mut self, covers: CoverExtractor) -> Self {
        self.covers = covers;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &Database {
        &self.catalog
    }

    pub fn archives_root(&self) -> &Path {
        &self.archives_root
    }

    /// Read-only repository for the serving path.
    fn repository(&self) -> Repository {
        self.catalog.repository(false)
    }

    fn archive_path(&self, filename: &str) -> PathBuf {
        self.archives_root.join(filename)
    }

    /// Patterns used when reading catalog filenames. Experimental names are
    /// always understood here; the flag only governs what reconcile adds.
    fn serving_patterns(&self) -> PatternTable {
        PatternTable::default().with_experimental(true)
    }

    /// Files directly inside the archive root. Failing to list the root is
    /// the one hard failure the offline tools share.
    async fn list_root(&self) -> Result<Vec<FileInfo>> {
        let files = self.archives.list(None).await.or_raise(|| ErrorKind::ArchiveRoot(self.archives_root.clone()))?;
        Ok(files.into_iter().filter(FileInfo::is_top_level).collect())
    }

    async fn archive_exists(&self, filename: &str) -> bool {
        self.archives.exists(Path::new(filename)).await.unwrap_or(false)
    }
}
