//! Read-only archive audit.
//!
//! Compares what the archive root holds against the catalog and reports
//! gaps between range archives, catalog rows that do not match their file,
//! and formats whose archives stop short of the newest book.

use crate::error::{ErrorKind, Result};
use crate::Library;
use exn::ResultExt;
use folio_archive::{ArchiveFile, Family, Format, IdSpan};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MappingIssue {
    FileMissing,
    CannotReadZip { reason: String },
    /// The archive holds fewer ids than its catalog row claims.
    /// `actual_max` is `None` when no entry carried an id at all.
    TruncatedArchive { declared_end: u64, actual_max: Option<u64>, entry_count: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "finding")]
pub enum AuditFinding {
    Gap { format: Format, start: u64, end: u64 },
    MappingIssue { filename: String, issue: MappingIssue },
    UncoveredTail { format: Format, from: u64, to: u64 },
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditReport {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub root: PathBuf,
    /// Archives whose filename matched a pattern.
    pub archives: usize,
    pub formats: BTreeMap<Format, usize>,
    /// Files in the root that match no pattern (attachments excluded).
    pub unrecognized: Vec<String>,
    /// Catalog rows whose file was inspected.
    pub sampled: usize,
    pub findings: Vec<AuditFinding>,
}
impl AuditReport {
    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_findings()
    }
}

/// Gaps between consecutive range archives of each format. Overlapping and
/// nested archives are allowed; only ids no archive claims are reported.
pub(crate) fn find_gaps(archives: &[ArchiveFile]) -> Vec<AuditFinding> {
    let mut by_format: BTreeMap<Format, Vec<(u64, u64)>> = BTreeMap::new();
    for archive in archives.iter().filter(|a| a.family() == Family::Range) {
        if let Some(range) = archive.declared_range() {
            by_format.entry(archive.format).or_default().push(range);
        }
    }
    let mut gaps = Vec::new();
    for (format, mut ranges) in by_format {
        ranges.sort_unstable();
        let mut ranges = ranges.into_iter();
        let Some((_, mut last_end)) = ranges.next() else { continue };
        for (start, end) in ranges {
            if start > last_end.saturating_add(1) {
                gaps.push(AuditFinding::Gap { format, start: last_end + 1, end: start - 1 });
            }
            last_end = last_end.max(end);
        }
    }
    gaps
}

/// Formats in `formats` whose range archives end before `max_book_id`.
pub(crate) fn find_uncovered(archives: &[ArchiveFile], formats: &[Format], max_book_id: u64) -> Vec<AuditFinding> {
    formats
        .iter()
        .filter_map(|&format| {
            let reach = archives
                .iter()
                .filter(|a| a.format == format && a.family() == Family::Range)
                .filter_map(|a| a.declared_range().map(|(_, end)| end))
                .max()
                .unwrap_or(0);
            (reach < max_book_id).then_some(AuditFinding::UncoveredTail { format, from: reach + 1, to: max_book_id })
        })
        .collect()
}

impl Library {
    /// Audit the archive root and catalog. Never writes anything.
    ///
    /// Per-archive problems become findings; only failing to list the root
    /// or to query the catalog aborts the run.
    #[instrument(skip(self))]
    pub async fn audit(&self) -> Result<AuditReport> {
        let files = self.list_root().await?;
        let patterns = self.serving_patterns().with_experimental(self.settings.include_experimental);
        let mut archives = Vec::new();
        let mut unrecognized = Vec::new();
        for file in &files {
            let Some(name) = file.file_name() else { continue };
            match patterns.classify(name) {
                Some(archive) => archives.push(archive),
                None if name == self.settings.attachments => {},
                None => unrecognized.push(name.to_string()),
            }
        }
        unrecognized.sort();
        let mut formats = BTreeMap::new();
        for archive in &archives {
            *formats.entry(archive.format).or_insert(0) += 1;
        }
        debug!(archives = archives.len(), unrecognized = unrecognized.len(), "classified archive root");

        let mut findings = find_gaps(&archives);

        let repo = self.repository();
        let sample = repo.recent_by_end(self.settings.audit_sample_size).await.or_raise(|| ErrorKind::Persistence)?;
        for row in &sample {
            if let Some(issue) = self.verify_mapping(&row.filename, row.end_id).await {
                findings.push(AuditFinding::MappingIssue { filename: row.filename.clone(), issue });
            }
        }

        let max_book_id = repo.max_book_id().await.or_raise(|| ErrorKind::Persistence)?;
        if let Some(max_book_id) = max_book_id {
            findings.extend(find_uncovered(&archives, &self.settings.coverage_formats, max_book_id));
        }

        let report = AuditReport {
            generated_at: OffsetDateTime::now_utc(),
            root: self.archives_root.clone(),
            archives: archives.len(),
            formats,
            unrecognized,
            sampled: sample.len(),
            findings,
        };
        info!(archives = report.archives, sampled = report.sampled, findings = report.findings.len(), "audit complete");
        Ok(report)
    }

    async fn verify_mapping(&self, filename: &str, declared_end: u64) -> Option<MappingIssue> {
        if !self.archive_exists(filename).await {
            return Some(MappingIssue::FileMissing);
        }
        let entries = match self.prober.list(&self.archive_path(filename)).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(archive = filename, %err, "cannot list archive");
                return Some(MappingIssue::CannotReadZip { reason: err.to_string() });
            },
        };
        match IdSpan::from_entries(&entries) {
            Some(span) if span.max >= declared_end => None,
            span => Some(MappingIssue::TruncatedArchive {
                declared_end,
                actual_max: span.map(|s| s.max),
                entry_count: span.map_or(0, |s| s.count),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use crate::testing::{Fixture, StallingReader};
    use folio_archive::{PatternTable, ZipReader};
    use folio_config::Config;
    use folio_storage::backend::{LocalBackend, MockBackend};
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;

    fn classify(names: &[&str]) -> Vec<ArchiveFile> {
        let table = PatternTable::default();
        names.iter().filter_map(|name| table.classify(name)).collect()
    }

    #[rstest]
    #[case::adjacent(&["f.fb2.1-10.zip", "f.fb2.11-20.zip"], vec![])]
    #[case::one_gap(&["f.fb2.1-10.zip", "f.fb2.21-30.zip"], vec![(11, 20)])]
    #[case::unsorted(&["f.fb2.21-30.zip", "f.fb2.1-10.zip"], vec![(11, 20)])]
    #[case::nested_range(&["f.fb2.1-100.zip", "f.fb2.5-10.zip", "f.fb2.101-110.zip"], vec![])]
    #[case::dash_style(&["f.fb2-1-10.zip", "f.fb2.12-20.zip"], vec![(11, 11)])]
    #[case::dated_ignored(&["f.fb2.1-10.zip", "f.fb2.20240101.zip", "f.fb2.11-20.zip"], vec![])]
    fn test_find_gaps(#[case] names: &[&str], #[case] expected: Vec<(u64, u64)>) {
        let gaps: Vec<_> = find_gaps(&classify(names))
            .into_iter()
            .map(|gap| match gap {
                AuditFinding::Gap { start, end, .. } => (start, end),
                other => panic!("unexpected finding {other:?}"),
            })
            .collect();
        assert_eq!(gaps, expected);
    }

    #[test]
    fn test_gaps_are_per_format() {
        let gaps = find_gaps(&classify(&["f.fb2.1-10.zip", "f.epub.11-20.zip", "f.fb2.11-20.zip"]));
        assert!(gaps.is_empty());
    }

    #[rstest]
    #[case(&["f.fb2.1-10.zip"], 10, None)]
    #[case(&["f.fb2.1-10.zip"], 15, Some((11, 15)))]
    #[case(&["f.epub.1-100.zip"], 15, Some((1, 15)))]
    fn test_find_uncovered(#[case] names: &[&str], #[case] max: u64, #[case] expected: Option<(u64, u64)>) {
        let found = find_uncovered(&classify(names), &[Format::Fb2], max);
        let found = found.first().map(|finding| match finding {
            AuditFinding::UncoveredTail { from, to, .. } => (*from, *to),
            other => panic!("unexpected finding {other:?}"),
        });
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_audit_report() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-10.zip", &[("1.fb2", b"a"), ("10.fb2", b"b")]);
        fx.archive("f.fb2.21-30.zip", &[("21.fb2", b"c"), ("30.fb2", b"d")]);
        fx.archive("f.fb2.31-1000.zip", &[("31.fb2", b"e"), ("750.fb2", b"f")]);
        fx.archive("covers.zip", &[("c.jpg", b"g")]);
        fx.raw_file("notes.txt", b"hello");
        fx.raw_file("f.epub.1-5.zip", b"corrupt");
        fx.range("f.fb2.1-10.zip", 1, 10).await;
        fx.range("f.fb2.31-1000.zip", 31, 1000).await;
        fx.range("f.fb2.41-50.zip", 41, 50).await;
        fx.range("f.epub.1-5.zip", 1, 5).await;
        fx.repo().set_book_format(1200, Format::Fb2).await.unwrap();

        let report = fx.library().audit().await.unwrap();
        assert_eq!(report.archives, 4);
        assert_eq!(report.formats.get(&Format::Fb2), Some(&3));
        assert_eq!(report.unrecognized, vec!["notes.txt".to_string()]);
        assert_eq!(report.sampled, 4);
        assert!(report.findings.contains(&AuditFinding::Gap { format: Format::Fb2, start: 11, end: 20 }));
        assert!(report.findings.contains(&AuditFinding::MappingIssue {
            filename: "f.fb2.31-1000.zip".to_string(),
            issue: MappingIssue::TruncatedArchive { declared_end: 1000, actual_max: Some(750), entry_count: 2 },
        }));
        assert!(report.findings.contains(&AuditFinding::MappingIssue {
            filename: "f.fb2.41-50.zip".to_string(),
            issue: MappingIssue::FileMissing,
        }));
        assert!(report.findings.iter().any(|f| matches!(
            f,
            AuditFinding::MappingIssue { filename, issue: MappingIssue::CannotReadZip { .. } } if filename == "f.epub.1-5.zip"
        )));
        assert!(report.findings.contains(&AuditFinding::UncoveredTail { format: Format::Fb2, from: 1001, to: 1200 }));
        assert!(!report.is_clean());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["findings"][0]["finding"], "gap");
    }

    #[tokio::test]
    async fn test_audit_does_not_write() {
        let fx = Fixture::new().await;
        fx.range("f.fb2.1-10.zip", 1, 10).await;
        let before = fx.repo().list_all().await.unwrap();
        let report = fx.library().audit().await.unwrap();
        assert!(report.has_findings());
        assert_eq!(fx.repo().list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_clean_audit() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-10.zip", &[("1.fb2", b"a"), ("10.fb2", b"b")]);
        fx.range("f.fb2.1-10.zip", 1, 10).await;
        fx.repo().set_book_format(10, Format::Fb2).await.unwrap();
        assert!(fx.library().audit().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_configured_coverage_formats() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-10.zip", &[("1.fb2", b"a"), ("10.fb2", b"b")]);
        fx.range("f.fb2.1-10.zip", 1, 10).await;
        fx.repo().set_book_format(10, Format::Fb2).await.unwrap();
        let mut config = Config::default();
        config.archives.coverage_formats = vec![Format::Fb2, Format::Epub];

        let report = fx.library_with(Settings::from(&config)).audit().await.unwrap();
        assert_eq!(report.findings, vec![AuditFinding::UncoveredTail { format: Format::Epub, from: 1, to: 10 }]);
    }

    #[tokio::test]
    async fn test_unreadable_root_aborts() {
        let fx = Fixture::new().await;
        fx.range("f.fb2.1-10.zip", 1, 10).await;
        let archives = Arc::new(MockBackend::default());
        archives.set_unreadable(true);
        let library = fx.library_from(archives, Arc::new(ZipReader::new()), fx.settings());
        let err = library.audit().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ArchiveRoot(_)));
    }

    #[tokio::test]
    async fn test_stalled_listing_is_reported() {
        let fx = Fixture::new().await;
        fx.archive("f.fb2.1-10.zip", &[("1.fb2", b"a"), ("10.fb2", b"b")]);
        fx.archive("f.fb2.21-30.zip", &[("21.fb2", b"c"), ("30.fb2", b"d")]);
        fx.range("f.fb2.1-10.zip", 1, 10).await;
        fx.range("f.fb2.21-30.zip", 21, 30).await;
        let archives = Arc::new(LocalBackend::open("archives", fx.archives_path()).unwrap());
        let reader = Arc::new(StallingReader::new("21-30", Duration::from_secs(5)));
        let settings = Settings { probe_timeout: Duration::from_millis(200), ..fx.settings() };

        let report = fx.library_from(archives, reader, settings).audit().await.unwrap();
        assert_eq!(report.sampled, 2);
        assert!(report.findings.iter().any(|f| matches!(
            f,
            AuditFinding::MappingIssue { filename, issue: MappingIssue::CannotReadZip { .. } } if filename == "f.fb2.21-30.zip"
        )));
        assert!(!report.findings.iter().any(|f| matches!(
            f,
            AuditFinding::MappingIssue { filename, .. } if filename == "f.fb2.1-10.zip"
        )));
        assert!(report.findings.contains(&AuditFinding::Gap { format: Format::Fb2, start: 11, end: 20 }));
    }
}
