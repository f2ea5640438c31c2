use directories::ProjectDirs;
use folio_archive::Format;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "folio", "folio")
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub archives: ArchivesConfig,
    pub catalog: CatalogConfig,
    pub assets: AssetsConfig,
    pub limits: Limits,
}

/// How archive listings and entry reads are performed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lister {
    /// Read the ZIP central directory in-process.
    #[default]
    Zip,
    /// Shell out to an external tool (`unzip -l` / `unzip -p`).
    Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivesConfig {
    /// Directory holding the book archives. Must be absolute.
    pub root: PathBuf,
    /// Filename of the attachments archive (precomputed covers), relative to `root`.
    pub attachments: String,
    /// Recognise the numeric-only `f.n.{start}-{end}.zip` family.
    pub include_experimental: bool,
    pub lister: Lister,
    /// Program used when `lister = "command"`.
    pub command: PathBuf,
    /// Formats whose newest catalogued id is compared against the
    /// catalog maximum when auditing.
    pub coverage_formats: Vec<Format>,
}
impl Default for ArchivesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            attachments: "covers.zip".to_string(),
            include_experimental: false,
            lister: Lister::default(),
            command: PathBuf::from("unzip"),
            coverage_formats: vec![Format::Fb2],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite database file.
    pub database: PathBuf,
}
impl Default for CatalogConfig {
    fn default() -> Self {
        let database = project_dirs()
            .map(|dirs| dirs.data_dir().join("catalog.sqlite"))
            .unwrap_or_else(|| PathBuf::from("catalog.sqlite"));
        Self { database }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Root of the asset cache (`covers/`, `files/`).
    pub root: PathBuf,
    /// Also cache resolved book files, not just covers.
    pub cache_book_files: bool,
}
impl Default for AssetsConfig {
    fn default() -> Self {
        let root = project_dirs().map(|dirs| dirs.cache_dir().to_path_buf()).unwrap_or_default();
        Self { root, cache_book_files: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Archive probes allowed in flight at once.
    pub max_concurrent_extractions: usize,
    /// Upper bound for a single listing or entry read.
    pub probe_timeout_secs: u64,
    /// Catalog rows checked per audit, highest `end_id` first.
    pub audit_sample_size: usize,
    /// Catalog rows deleted per statement.
    pub purge_batch_size: usize,
    /// Filenames echoed back in a purge report.
    pub purge_sample_size: usize,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_concurrent_extractions: 2,
            probe_timeout_secs: 10,
            audit_sample_size: 200,
            purge_batch_size: 500,
            purge_sample_size: 20,
        }
    }
}
impl Limits {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
