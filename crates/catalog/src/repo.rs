//! Repository over the archive range catalog and its per-book lookups.

use crate::CatalogEntry;
use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::RangeRow;
use exn::ResultExt;
use folio_archive::{Format, PatternTable};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::cmp::Ordering;
use tracing::{debug, instrument};

fn to_db_id(id: u64, what: &'static str) -> Result<i64> {
    Ok(i64::try_from(id).or_raise(|| ErrorKind::InvalidData(what))?)
}

/// Format an archive declares through its filename. Names that match no
/// pattern (including hand-inserted rows) count as [`Format::Unknown`].
fn declared_format(filename: &str) -> Format {
    PatternTable::default().with_experimental(true).classify(filename).map_or(Format::Unknown, |a| a.format)
}

/// Candidate order: exact preferred-format match first, then the global
/// format preference, then ascending priority, then filename. Total, so
/// equal inputs always agree on the first candidate.
pub(crate) fn rank_candidates(entries: &mut [CatalogEntry], preferred: Option<Format>) {
    let preferred = preferred.filter(|f| *f != Format::Unknown);
    let key = |entry: &CatalogEntry| {
        let format = declared_format(&entry.filename);
        (Some(format) != preferred, format.preference_rank())
    };
    entries.sort_by(|a, b| {
        key(a)
            .cmp(&key(b))
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Repository for the catalog tables.
///
/// With `dry_run` set, every write is skipped but still reports what it
/// would have done, so dry runs and real runs produce the same reports.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    // =========================================================================
    // Ranges
    // =========================================================================

    /// Every catalog row whose inclusive range contains `book_id`, best
    /// candidate first.
    #[instrument(skip(self))]
    pub async fn find_candidates(&self, book_id: u64, preferred: Option<Format>) -> Result<Vec<CatalogEntry>> {
        let rows: Vec<RangeRow> = sqlx::query_as(include_str!("../queries/find_candidates.sql"))
            .bind(to_db_id(book_id, "book id")?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut entries = rows.into_iter().map(CatalogEntry::try_from).collect::<Result<Vec<_>>>()?;
        rank_candidates(&mut entries, preferred);
        debug!(count = entries.len(), "found candidate archives");
        Ok(entries)
    }

    /// All catalog rows, ordered by filename.
    pub async fn list_all(&self) -> Result<Vec<CatalogEntry>> {
        let rows: Vec<RangeRow> = sqlx::query_as(include_str!("../queries/list_ranges.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CatalogEntry::try_from).collect()
    }

    pub async fn get(&self, filename: &str) -> Result<Option<CatalogEntry>> {
        let row: Option<RangeRow> = sqlx::query_as(include_str!("../queries/get_range.sql"))
            .bind(filename)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CatalogEntry::try_from).transpose()
    }

    /// Up to `limit` rows with the highest `end_id` first.
    pub async fn recent_by_end(&self, limit: usize) -> Result<Vec<CatalogEntry>> {
        let limit = i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit"))?;
        let rows: Vec<RangeRow> = sqlx::query_as(include_str!("../queries/recent_by_end.sql"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CatalogEntry::try_from).collect()
    }

    /// Insert or replace the row for `entry.filename`.
    pub async fn upsert(&self, entry: &CatalogEntry) -> Result<()> {
        let row = RangeRow::try_from(entry)?;
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/upsert_range.sql"))
            .bind(row.filename)
            .bind(row.start_id)
            .bind(row.end_id)
            .bind(row.priority)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Delete rows by filename, `batch_size` filenames per statement.
    ///
    /// Returns the number of rows deleted; in dry-run mode, the number of
    /// rows that currently exist and would have been deleted.
    #[instrument(skip(self, filenames), fields(count = filenames.len()))]
    pub async fn delete_batch(&self, filenames: &[String], batch_size: usize) -> Result<u64> {
        let mut affected = 0;
        for chunk in filenames.chunks(batch_size.max(1)) {
            let mut builder: QueryBuilder<'_, Sqlite> = if self.dry_run {
                QueryBuilder::new("SELECT COUNT(*) FROM archive_ranges WHERE filename IN (")
            } else {
                QueryBuilder::new("DELETE FROM archive_ranges WHERE filename IN (")
            };
            let mut separated = builder.separated(", ");
            for filename in chunk {
                separated.push_bind(filename);
            }
            separated.push_unseparated(")");
            affected += if self.dry_run {
                let count: i64 =
                    builder.build_query_scalar::<i64>().fetch_one(&self.pool).await.or_raise(|| ErrorKind::Database)?;
                u64::try_from(count).or_raise(|| ErrorKind::InvalidData("row count"))?
            } else {
                builder.build().execute(&self.pool).await.or_raise(|| ErrorKind::Database)?.rows_affected()
            };
            debug!(batch = chunk.len(), affected, "deleted catalog batch");
        }
        Ok(affected)
    }

    // =========================================================================
    // Per-book lookups
    // =========================================================================

    /// Authoritative entry name of `book_id` inside its archive, if known.
    pub async fn filename_hint(&self, book_id: u64) -> Result<Option<String>> {
        let hint: Option<String> = sqlx::query_scalar(include_str!("../queries/filename_hint.sql"))
            .bind(to_db_id(book_id, "book id")?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(hint.filter(|h| !h.trim().is_empty()))
    }

    /// Entry name of the precomputed cover in the attachments archive.
    pub async fn cover_pointer(&self, book_id: u64) -> Result<Option<String>> {
        let entry: Option<String> = sqlx::query_scalar(include_str!("../queries/cover_pointer.sql"))
            .bind(to_db_id(book_id, "book id")?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(entry.filter(|e| !e.trim().is_empty()))
    }

    /// Native format recorded for `book_id`.
    pub async fn native_format(&self, book_id: u64) -> Result<Option<Format>> {
        let format: Option<String> = sqlx::query_scalar(include_str!("../queries/native_format.sql"))
            .bind(to_db_id(book_id, "book id")?)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        format.map(|f| f.parse::<Format>().or_raise(|| ErrorKind::InvalidData("book format"))).transpose()
    }

    /// Largest known book id, i.e. the size of the library.
    pub async fn max_book_id(&self) -> Result<Option<u64>> {
        let max: Option<i64> = sqlx::query_scalar(include_str!("../queries/max_book_id.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        max.map(|id| u64::try_from(id).or_raise(|| ErrorKind::InvalidData("book id"))).transpose()
    }

    pub async fn set_filename_hint(&self, book_id: u64, filename: &str) -> Result<()> {
        self.set(include_str!("../queries/set_filename_hint.sql"), book_id, filename).await
    }

    pub async fn set_cover_pointer(&self, book_id: u64, entry_name: &str) -> Result<()> {
        self.set(include_str!("../queries/set_cover_pointer.sql"), book_id, entry_name).await
    }

    pub async fn set_book_format(&self, book_id: u64, format: Format) -> Result<()> {
        self.set(include_str!("../queries/set_book_format.sql"), book_id, format.as_str()).await
    }

    async fn set(&self, query: &'static str, book_id: u64, value: &str) -> Result<()> {
        let book_id = to_db_id(book_id, "book id")?;
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(query).bind(book_id).bind(value).execute(&self.pool).await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
