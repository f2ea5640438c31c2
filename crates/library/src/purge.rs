//! Orphan purge: drop catalog rows whose archive is gone from the root.

use crate::error::{ErrorKind, Result};
use crate::Library;
use exn::ResultExt;
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::{info, instrument};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurgeOptions {
    /// Delete rows. Without it the run only counts them.
    pub apply: bool,
    /// Case-insensitive regex restricting which catalog filenames qualify.
    pub pattern: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PurgeReport {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub applied: bool,
    /// Orphaned rows found.
    pub matched: usize,
    /// Rows deleted, or that would be deleted on a dry run.
    pub deleted: u64,
    /// The first few orphaned filenames.
    pub sample: Vec<String>,
}
impl PurgeReport {
    pub fn has_findings(&self) -> bool {
        self.matched > 0
    }

    pub fn is_clean(&self) -> bool {
        !self.has_findings()
    }
}

impl Library {
    #[instrument(skip(self))]
    pub async fn purge(&self, options: PurgeOptions) -> Result<PurgeReport> {
        let filter = options
            .pattern
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .or_raise(|| ErrorKind::InvalidPattern(pattern.to_string()))
            })
            .transpose()?;

        let on_disk: HashSet<String> =
            self.list_root().await?.iter().filter_map(|file| file.file_name()).map(str::to_string).collect();
        let repo = self.catalog.repository(!options.apply);
        let orphans: Vec<String> = repo
            .list_all()
            .await
            .or_raise(|| ErrorKind::Persistence)?
            .into_iter()
            .map(|entry| entry.filename)
            .filter(|filename| !on_disk.contains(filename))
            .filter(|filename| filter.as_ref().is_none_or(|re| re.is_match(filename)))
            .collect();

        let deleted = repo.delete_batch(&orphans, self.settings.purge_batch_size).await.or_raise(|| ErrorKind::Persistence)?;
        let report = PurgeReport {
            generated_at: OffsetDateTime::now_utc(),
            applied: options.apply,
            matched: orphans.len(),
            deleted,
            sample: orphans.into_iter().take(self.settings.purge_sample_size).collect(),
        };
        info!(matched = report.matched, deleted = report.deleted, applied = report.applied, "purge complete");
        Ok(report)
    }
}
