//! Archive filename classification.
//!
//! Filenames are matched against an ordered table of `(pattern, kind)` rows.
//! The first row that matches wins, so adding a naming convention means
//! adding a row rather than another branch.
//!
//! | Family        | Example                     | Declared range   |
//! |---------------|-----------------------------|------------------|
//! | Range (dot)   | `f.fb2.100-200.zip`         | `100..=200`      |
//! | Range (dash)  | `f.fb2-100-200.zip`         | `100..=200`      |
//! | Dated         | `f.epub.20240131.zip`       | none             |
//! | Experimental  | `f.n.100-200.zip` (opt-in)  | `100..=200`      |

use crate::Format;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;
use time::{Date, Month};

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(RANGE_DOT, r"(?i)^f\.(fb2|epub|djvu|pdf|mobi|txt)\.(\d+)-(\d+)\.zip$");
regex!(RANGE_DASH, r"(?i)^f\.(fb2|epub|djvu|pdf|mobi|txt)-(\d+)-(\d+)\.zip$");
regex!(DATED, r"(?i)^f\.(fb2|epub|djvu|pdf|mobi|txt)\.(\d{4})(\d{2})(\d{2})\.zip$");
regex!(EXPERIMENTAL, r"(?i)^f\.n\.(\d+)-(\d+)\.zip$");

/// Naming family an archive belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Range,
    Dated,
    Experimental,
}

/// What an archive's name declares about its contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ArchiveKind {
    /// Covers the inclusive id range `start..=end`.
    Range { start: u64, end: u64 },
    /// A snapshot taken on the given day; contents must be inspected.
    Dated { date: Date },
    /// Numeric-only family (`f.n.*`), only recognised when opted in.
    Experimental { start: u64, end: u64 },
}
impl ArchiveKind {
    pub fn family(&self) -> Family {
        match self {
            Self::Range { .. } => Family::Range,
            Self::Dated { .. } => Family::Dated,
            Self::Experimental { .. } => Family::Experimental,
        }
    }
}

/// An on-disk archive classified from its filename alone.
///
/// Never persisted; recomputed from directory listings on every pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArchiveFile {
    pub filename: String,
    pub format: Format,
    pub kind: ArchiveKind,
}
impl ArchiveFile {
    /// The id range declared by the filename, if any.
    pub fn declared_range(&self) -> Option<(u64, u64)> {
        match self.kind {
            ArchiveKind::Range { start, end } | ArchiveKind::Experimental { start, end } => Some((start, end)),
            ArchiveKind::Dated { .. } => None,
        }
    }

    pub fn family(&self) -> Family {
        self.kind.family()
    }
}

type Build = fn(&Captures<'_>) -> Option<(Format, ArchiveKind)>;

struct Rule {
    pattern: &'static LazyLock<Regex>,
    family: Family,
    build: Build,
}

fn number(captures: &Captures<'_>, index: usize) -> Option<u64> {
    captures.get(index)?.as_str().parse().ok()
}

fn format(captures: &Captures<'_>) -> Option<Format> {
    captures.get(1)?.as_str().parse().ok()
}

fn build_range(captures: &Captures<'_>) -> Option<(Format, ArchiveKind)> {
    let (start, end) = (number(captures, 2)?, number(captures, 3)?);
    (start <= end).then_some((format(captures)?, ArchiveKind::Range { start, end }))
}

fn build_dated(captures: &Captures<'_>) -> Option<(Format, ArchiveKind)> {
    let year = i32::try_from(number(captures, 2)?).ok()?;
    let month = Month::try_from(u8::try_from(number(captures, 3)?).ok()?).ok()?;
    let day = u8::try_from(number(captures, 4)?).ok()?;
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some((format(captures)?, ArchiveKind::Dated { date }))
}

fn build_experimental(captures: &Captures<'_>) -> Option<(Format, ArchiveKind)> {
    let (start, end) = (number(captures, 1)?, number(captures, 2)?);
    (start <= end).then_some((Format::Unknown, ArchiveKind::Experimental { start, end }))
}

static RULES: [Rule; 4] = [
    Rule { pattern: &RANGE_DOT, family: Family::Range, build: build_range },
    Rule { pattern: &RANGE_DASH, family: Family::Range, build: build_range },
    Rule { pattern: &DATED, family: Family::Dated, build: build_dated },
    Rule { pattern: &EXPERIMENTAL, family: Family::Experimental, build: build_experimental },
];

/// Ordered filename classifier.
///
/// # Examples
///
/// ```
/// use folio_archive::{ArchiveKind, Format, PatternTable};
///
/// let table = PatternTable::default();
/// let archive = table.classify("f.fb2.100-200.zip").unwrap();
/// assert_eq!(archive.format, Format::Fb2);
/// assert_eq!(archive.kind, ArchiveKind::Range { start: 100, end: 200 });
/// assert!(table.classify("f.n.1-2.zip").is_none());
/// assert!(PatternTable::default().with_experimental(true).classify("f.n.1-2.zip").is_some());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternTable {
    include_experimental: bool,
}
impl PatternTable {
    #[must_use]
    pub fn with_experimental(mut self, include: bool) -> Self {
        self.include_experimental = include;
        self
    }

    /// Classify a bare filename (no directory components). Returns `None`
    /// when no enabled rule matches, or when a matching name declares an
    /// impossible range or date.
    pub fn classify(&self, filename: &str) -> Option<ArchiveFile> {
        RULES
            .iter()
            .filter(|rule| self.include_experimental || rule.family != Family::Experimental)
            .find_map(|rule| {
                let captures = rule.pattern.captures(filename)?;
                let (format, kind) = (rule.build)(&captures)?;
                Some(ArchiveFile { filename: filename.to_string(), format, kind })
            })
    }
}
