use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use serde::Serialize;

/// One row of the archive range catalog.
///
/// Lower `priority` is more authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CatalogEntry {
    pub filename: String,
    pub start_id: u64,
    pub end_id: u64,
    pub priority: i32,
}
impl CatalogEntry {
    pub fn new(filename: impl Into<String>, start_id: u64, end_id: u64, priority: i32) -> Self {
        Self { filename: filename.into(), start_id, end_id, priority }
    }

    /// Whether `book_id` falls inside the inclusive range.
    pub fn covers(&self, book_id: u64) -> bool {
        self.start_id <= book_id && book_id <= self.end_id
    }
}

/// Raw database row; SQLite only knows signed integers.
#[derive(sqlx::FromRow)]
pub(crate) struct RangeRow {
    pub(crate) filename: String,
    pub(crate) start_id: i64,
    pub(crate) end_id: i64,
    pub(crate) priority: i32,
}
impl TryFrom<RangeRow> for CatalogEntry {
    type Error = Error;
    fn try_from(row: RangeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            filename: row.filename,
            start_id: u64::try_from(row.start_id).or_raise(|| ErrorKind::InvalidData("start id"))?,
            end_id: u64::try_from(row.end_id).or_raise(|| ErrorKind::InvalidData("end id"))?,
            priority: row.priority,
        })
    }
}
impl TryFrom<&CatalogEntry> for RangeRow {
    type Error = Error;
    fn try_from(entry: &CatalogEntry) -> Result<Self, Self::Error> {
        if entry.start_id > entry.end_id {
            exn::bail!(ErrorKind::Constraint(format!(
                "{}: start {} is after end {}",
                entry.filename, entry.start_id, entry.end_id
            )));
        }
        Ok(Self {
            filename: entry.filename.clone(),
            start_id: i64::try_from(entry.start_id).or_raise(|| ErrorKind::InvalidData("start id"))?,
            end_id: i64::try_from(entry.end_id).or_raise(|| ErrorKind::InvalidData("end id"))?,
            priority: entry.priority,
        })
    }
}
