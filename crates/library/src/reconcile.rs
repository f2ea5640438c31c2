//! Catalog reconciliation.
//!
//! Rebuilds each archive's catalog range from the ids actually inside it
//! and writes only the rows that changed. Dry runs compute the same
//! change set through a repository whose writes are no-ops.

use crate::error::{ErrorKind, Result};
use crate::Library;
use exn::ResultExt;
use folio_archive::{ArchiveFile, ArchiveKind, Format, IdSpan};
use folio_catalog::CatalogEntry;
use serde::Serialize;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

const PROGRESS_EVERY: usize = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Write changes. Without it the run is a dry run.
    pub apply: bool,
    /// Also consider `f.n.*` archives, on top of the configured default.
    pub include_experimental: bool,
    /// Stop after this many archives, in filename order.
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    Unreadable(String),
    /// No entry carried a numeric id.
    Empty,
    /// Observed ids do not fit a catalog row (e.g. beyond `i64`).
    OutOfRange,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub filename: String,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Change {
    Insert { entry: CatalogEntry, truncated: bool },
    Update { entry: CatalogEntry, previous_start: u64, previous_end: u64, truncated: bool },
}
impl Change {
    pub fn entry(&self) -> &CatalogEntry {
        match self {
            Self::Insert { entry, .. } | Self::Update { entry, .. } => entry,
        }
    }
}

/// Two archives of one format claiming some of the same ids. Reported,
/// never fixed: priority decides which one serves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Overlap {
    pub format: Format,
    pub first: String,
    pub second: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChangeSet {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub applied: bool,
    pub examined: usize,
    pub unchanged: usize,
    pub changes: Vec<Change>,
    pub skipped: Vec<Skipped>,
    pub overlaps: Vec<Overlap>,
}
impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn has_findings(&self) -> bool {
        self.has_changes() || !self.skipped.is_empty() || !self.overlaps.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_findings()
    }
}

fn default_priority(kind: &ArchiveKind) -> i32 {
    match kind {
        ArchiveKind::Range { .. } => 0,
        ArchiveKind::Experimental { .. } => 10,
        ArchiveKind::Dated { .. } => 20,
    }
}

/// The range an archive should be catalogued under, and whether its
/// contents fall short of what the name declares.
pub(crate) fn computed_range(archive: &ArchiveFile, span: IdSpan) -> (u64, u64, bool) {
    match archive.declared_range() {
        Some((start, end)) if span.max < end => (start, span.max.max(start), true),
        Some((start, end)) => (start, end, false),
        None => (span.min, span.max, false),
    }
}

/// Consecutive overlaps per format, in `(start, end, filename)` order.
pub(crate) fn find_overlaps(computed: &[(Format, CatalogEntry)]) -> Vec<Overlap> {
    let mut by_format: BTreeMap<Format, Vec<&CatalogEntry>> = BTreeMap::new();
    for (format, entry) in computed {
        by_format.entry(*format).or_default().push(entry);
    }
    let mut overlaps = Vec::new();
    for (format, mut entries) in by_format {
        entries.sort_by(|a, b| (a.start_id, a.end_id, &a.filename).cmp(&(b.start_id, b.end_id, &b.filename)));
        for pair in entries.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if cur.start_id <= prev.end_id {
                overlaps.push(Overlap {
                    format,
                    first: prev.filename.clone(),
                    second: cur.filename.clone(),
                    start: cur.start_id,
                    end: prev.end_id.min(cur.end_id),
                });
            }
        }
    }
    overlaps
}

impl Library {
    /// Recompute catalog ranges from archive contents.
    ///
    /// Unreadable and empty archives are recorded as skipped and the run
    /// carries on. Failing to list the root, or losing the catalog, aborts.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, options: ReconcileOptions) -> Result<ChangeSet> {
        let patterns = self
            .serving_patterns()
            .with_experimental(options.include_experimental || self.settings.include_experimental);
        let mut names: Vec<String> = self
            .list_root()
            .await?
            .iter()
            .filter_map(|file| file.file_name())
            .filter(|name| *name != self.settings.attachments)
            .map(str::to_string)
            .collect();
        names.sort();
        let archives: Vec<ArchiveFile> = names
            .iter()
            .filter_map(|name| patterns.classify(name))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        info!(archives = archives.len(), apply = options.apply, "reconciling");

        let repo = self.catalog.repository(!options.apply);
        let mut changes = Vec::new();
        let mut skipped = Vec::new();
        let mut computed = Vec::new();
        let mut unchanged = 0;

        for (index, archive) in archives.iter().enumerate() {
            if index > 0 && index % PROGRESS_EVERY == 0 {
                info!(done = index, total = archives.len(), "reconcile progress");
            }
            let filename = archive.filename.clone();
            let entries = match self.prober.list(&self.archive_path(&filename)).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(archive = %filename, %err, "skipping unreadable archive");
                    skipped.push(Skipped { filename, reason: SkipReason::Unreadable(err.to_string()) });
                    continue;
                },
            };
            let Some(span) = IdSpan::from_entries(&entries) else {
                skipped.push(Skipped { filename, reason: SkipReason::Empty });
                continue;
            };
            let (start, end, truncated) = computed_range(archive, span);
            if i64::try_from(end).is_err() {
                skipped.push(Skipped { filename, reason: SkipReason::OutOfRange });
                continue;
            }

            let existing = repo.get(&filename).await.or_raise(|| ErrorKind::Persistence)?;
            let change = match existing {
                Some(row) if row.start_id == start && row.end_id == end => {
                    unchanged += 1;
                    computed.push((archive.format, row));
                    continue;
                },
                Some(row) => Change::Update {
                    entry: CatalogEntry::new(filename, start, end, row.priority),
                    previous_start: row.start_id,
                    previous_end: row.end_id,
                    truncated,
                },
                None => Change::Insert {
                    entry: CatalogEntry::new(filename, start, end, default_priority(&archive.kind)),
                    truncated,
                },
            };
            repo.upsert(change.entry()).await.or_raise(|| ErrorKind::Persistence)?;
            computed.push((archive.format, change.entry().clone()));
            changes.push(change);
        }

        let overlaps = find_overlaps(&computed);
        for overlap in &overlaps {
            warn!(first = %overlap.first, second = %overlap.second, start = overlap.start, end = overlap.end, "overlapping archives");
        }
        let report = ChangeSet {
            generated_at: OffsetDateTime::now_utc(),
            applied: options.apply,
            examined: archives.len(),
            unchanged,
            changes,
            skipped,
            overlaps,
        };
        info!(
            changes = report.changes.len(),
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            overlaps = report.overlaps.len(),
            applied = report.applied,
            "reconcile complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use crate::testing::{Fixture, StallingReader};
    use folio_archive::{PatternTable, ZipReader};
    use folio_storage::backend::{LocalBackend, MockBackend};
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    fn span(min: u64, max: u64) -> IdSpan {
        IdSpan { min, max, count: 2 }
    }

    #[rstest]
    #[case::complete("f.fb2.1-1000.zip", span(1, 1000), (1, 1000, false))]
    #[case::truncated("f.fb2.1-1000.zip", span(3, 750), (1, 750, true))]
    #[case::beyond_declared("f.fb2.1-1000.zip", span(1, 1200), (1, 1000, false))]
    #[case::dated("f.epub.20240131.zip", span(40, 90), (40, 90, false))]
    #[case::experimental("f.n.100-200.zip", span(100, 150), (100, 150, true))]
    fn test_computed_range(#[case] name: &str, #[case] span: IdSpan, #[case] expected: (u64, u64, bool)) {
        let archive = PatternTable::default().with_experimental(true).classify(name).unwrap();
        assert_eq!(computed_range(&archive, span), expected);
    }

    #[test]
    fn test_find_overlaps() {
        let computed = vec![
            (Format::Fb2, CatalogEntry::new("c", 40, 60, 0)),
            (Format::Fb2, CatalogEntry::new("a", 1, 50, 0)),
            (Format::Fb2, CatalogEntry::new("b", 51, 70, 0)),
            (Format::Epub, CatalogEntry::new("d", 1, 100, 0)),
        ];
        let overlaps = find_overlaps(&computed);
        assert_eq!(
            overlaps,
            vec![
                Overlap { format: Format::Fb2, first: "a".into(), second: "c".into(), start: 40, end: 50 },
                Overlap { format: Format::Fb2, first: "c".into(), second: "b".into(), start: 51, end: 60 },
            ]
        );
    }

    #[tokio::test]
    async fn test_truncated_archive_is_corrected() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-1000.zip", &[("1.fb2", b"a"), ("750.fb2", b"b")]);
        fx.range("f.fb2.1-1000.zip", 1, 1000).await;
        let library = fx.library();

        let changes = library.reconcile(ReconcileOptions { apply: true, ..Default::default() }).await.unwrap();
        assert_eq!(
            changes.changes,
            vec![Change::Update {
                entry: CatalogEntry::new("f.fb2.1-1000.zip", 1, 750, 0),
                previous_start: 1,
                previous_end: 1000,
                truncated: true,
            }]
        );
        assert_eq!(fx.repo().get("f.fb2.1-1000.zip").await.unwrap().unwrap().end_id, 750);

        let again = library.reconcile(ReconcileOptions { apply: true, ..Default::default() }).await.unwrap();
        assert!(again.is_clean());
        assert_eq!(again.unchanged, 1);
    }

    #[tokio::test]
    async fn test_dry_run_matches_apply() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-100.zip", &[("1.fb2", b"a"), ("100.fb2", b"b")]);
        fx.archive("f.fb2.40-60.zip", &[("40.fb2", b"a"), ("50.fb2", b"b")]);
        fx.archive("f.epub.20240131.zip", &[("7.epub", b"a"), ("12.epub", b"b"), ("cover.jpg", b"c")]);
        fx.archive("f.epub.1-10.zip", &[("readme.txt", b"no ids")]);
        fx.raw_file("f.djvu.1-10.zip", b"garbage");
        fx.archive("covers.zip", &[("1.jpg", b"a")]);
        fx.range("f.fb2.1-100.zip", 1, 200).await;
        let library = fx.library();

        let dry = library.reconcile(ReconcileOptions::default()).await.unwrap();
        assert!(!dry.applied);
        assert_eq!(fx.repo().get("f.fb2.1-100.zip").await.unwrap().unwrap().end_id, 200);
        assert_eq!(fx.repo().list_all().await.unwrap().len(), 1);

        let applied = library.reconcile(ReconcileOptions { apply: true, ..Default::default() }).await.unwrap();
        assert_eq!(dry.changes, applied.changes);
        assert_eq!(dry.skipped, applied.skipped);
        assert_eq!(dry.overlaps, applied.overlaps);
        assert_eq!(applied.examined, 5);
        assert_eq!(applied.skipped.len(), 2);
        assert!(applied.skipped.contains(&Skipped { filename: "f.epub.1-10.zip".into(), reason: SkipReason::Empty }));
        assert_eq!(
            applied.overlaps,
            vec![Overlap {
                format: Format::Fb2,
                first: "f.fb2.1-100.zip".into(),
                second: "f.fb2.40-60.zip".into(),
                start: 40,
                end: 50,
            }]
        );
        let dated = fx.repo().get("f.epub.20240131.zip").await.unwrap().unwrap();
        assert_eq!((dated.start_id, dated.end_id, dated.priority), (7, 12, 20));
    }

    #[tokio::test]
    async fn test_update_keeps_priority() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-10.zip", &[("1.fb2", b"a"), ("8.fb2", b"b")]);
        fx.repo().upsert(&CatalogEntry::new("f.fb2.1-10.zip", 1, 10, 5)).await.unwrap();
        fx.library().reconcile(ReconcileOptions { apply: true, ..Default::default() }).await.unwrap();
        assert_eq!(fx.repo().get("f.fb2.1-10.zip").await.unwrap().unwrap(), CatalogEntry::new("f.fb2.1-10.zip", 1, 8, 5));
    }

    #[tokio::test]
    async fn test_experimental_and_limit() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-10.zip", &[("1.fb2", b"a")]);
        fx.archive("f.fb2.11-20.zip", &[("11.fb2", b"a")]);
        fx.archive("f.n.21-30.zip", &[("21.fb2", b"a"), ("30.fb2", b"b")]);
        let library = fx.library();

        let plain = library.reconcile(ReconcileOptions::default()).await.unwrap();
        assert_eq!(plain.examined, 2);

        let limited = library.reconcile(ReconcileOptions { limit: Some(1), ..Default::default() }).await.unwrap();
        assert_eq!(limited.examined, 1);
        assert_eq!(limited.changes[0].entry().filename, "f.fb2.1-10.zip");

        let experimental = library
            .reconcile(ReconcileOptions { include_experimental: true, apply: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(experimental.examined, 3);
        assert_eq!(fx.repo().get("f.n.21-30.zip").await.unwrap().unwrap().priority, 10);
    }

    #[tokio::test]
    async fn test_unreadable_root_aborts() {
        let fx = Fixture::new().await;
        let archives = Arc::new(MockBackend::default());
        archives.set_unreadable(true);
        let library = fx.library_from(archives, Arc::new(ZipReader::new()), fx.settings());
        let err = library.reconcile(ReconcileOptions { apply: true, ..Default::default() }).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ArchiveRoot(_)));
    }

    #[tokio::test]
    async fn test_stalled_listing_is_skipped() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-10.zip", &[("1.fb2", b"a"), ("10.fb2", b"b")]);
        fx.archive("f.fb2.11-20.zip", &[("11.fb2", b"c"), ("20.fb2", b"d")]);
        fx.archive("f.fb2.21-30.zip", &[("21.fb2", b"e"), ("30.fb2", b"f")]);
        let archives = Arc::new(LocalBackend::open("archives", fx.archives_path()).unwrap());
        let reader = Arc::new(StallingReader::new("11-20", Duration::from_secs(5)));
        let settings = Settings { probe_timeout: Duration::from_millis(200), ..fx.settings() };
        let library = fx.library_from(archives, reader, settings);

        let changes = library.reconcile(ReconcileOptions { apply: true, ..Default::default() }).await.unwrap();
        assert_eq!(changes.examined, 3);
        assert_eq!(changes.skipped.len(), 1);
        assert_eq!(changes.skipped[0].filename, "f.fb2.11-20.zip");
        assert!(matches!(changes.skipped[0].reason, SkipReason::Unreadable(_)));
        let inserted: Vec<_> = changes.changes.iter().map(|change| change.entry().filename.as_str()).collect();
        assert_eq!(inserted, vec!["f.fb2.1-10.zip", "f.fb2.21-30.zip"]);
        assert!(fx.repo().get("f.fb2.11-20.zip").await.unwrap().is_none());
        assert!(fx.repo().get("f.fb2.21-30.zip").await.unwrap().is_some());
    }
}
