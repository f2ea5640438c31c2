use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static BOOK_ENTRY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\.([A-Za-z0-9]+)$").unwrap());

/// One document inside an archive, as reported by a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Full entry name, including any folder prefix inside the archive.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}
impl EntryInfo {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self { name: name.into(), size }
    }

    /// The entry name with any folder prefix removed.
    pub fn basename(&self) -> &str {
        basename(&self.name)
    }

    /// The numeric book id of entries named `{id}.{ext}`.
    pub fn book_id(&self) -> Option<u64> {
        book_id(&self.name)
    }
}

pub fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Parses the book id out of an entry named `{id}.{ext}` (folder prefixes
/// are ignored). Anything else yields `None`.
///
/// ```
/// assert_eq!(folio_archive::book_id("lib/12345.fb2"), Some(12345));
/// assert_eq!(folio_archive::book_id("cover.jpg"), None);
/// ```
pub fn book_id(name: &str) -> Option<u64> {
    BOOK_ENTRY.captures(basename(name))?.get(1)?.as_str().parse().ok()
}

/// Observed id coverage of an archive, computed from its listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IdSpan {
    pub min: u64,
    pub max: u64,
    /// Number of entries whose name parsed as a book id.
    pub count: u64,
}
impl IdSpan {
    /// Summarise the ids found in `entries`. Returns `None` if no entry
    /// carries a parseable id.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a EntryInfo>) -> Option<Self> {
        entries.into_iter().filter_map(EntryInfo::book_id).fold(None, |span, id| {
            Some(match span {
                None => IdSpan { min: id, max: id, count: 1 },
                Some(IdSpan { min, max, count }) => IdSpan { min: min.min(id), max: max.max(id), count: count + 1 },
            })
        })
    }
}
