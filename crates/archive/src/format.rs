use crate::Format;
use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::str::FromStr;

/// Extensions tried by the entry locator after the archive and requested
/// formats, in order. Includes document types that never name an archive.
pub const FALLBACK_EXTENSIONS: [&str; 9] = ["fb2", "epub", "djvu", "pdf", "mobi", "txt", "rtf", "html", "htm"];

impl FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "fb2" => Ok(Format::Fb2),
            "epub" => Ok(Format::Epub),
            "djvu" => Ok(Format::Djvu),
            "pdf" => Ok(Format::Pdf),
            "mobi" => Ok(Format::Mobi),
            "txt" => Ok(Format::Txt),
            "unknown" => Ok(Format::Unknown),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Format {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl Format {
    /// Every format an archive name can declare.
    pub const DECLARED: [Format; 6] = [Format::Fb2, Format::Epub, Format::Djvu, Format::Pdf, Format::Mobi, Format::Txt];

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Fb2 => "fb2",
            Format::Epub => "epub",
            Format::Djvu => "djvu",
            Format::Pdf => "pdf",
            Format::Mobi => "mobi",
            Format::Txt => "txt",
            Format::Unknown => "unknown",
        }
    }

    /// File extension for entries of this format, without the leading dot.
    /// [`Unknown`](Format::Unknown) has none.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Format::Unknown => None,
            other => Some(other.as_str()),
        }
    }

    /// Position in the global format preference order (`fb2 > epub > djvu`,
    /// then any other declared format, then unknown). Lower is preferred.
    #[must_use]
    pub fn preference_rank(&self) -> u8 {
        match self {
            Format::Fb2 => 0,
            Format::Epub => 1,
            Format::Djvu => 2,
            Format::Pdf | Format::Mobi | Format::Txt => 3,
            Format::Unknown => 4,
        }
    }

    /// Detect the format of an archive entry from its extension. Anything
    /// unrecognised is [`Unknown`](Format::Unknown).
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<Format>().ok())
            .unwrap_or(Format::Unknown)
    }
}

/// Builds the ordered, de-duplicated list of extensions the entry locator
/// tries: the archive's declared format, the requested format, then
/// [`FALLBACK_EXTENSIONS`]. Empty and unknown formats are skipped.
pub fn candidate_extensions(archive: Option<Format>, preferred: Option<Format>) -> Vec<&'static str> {
    let mut extensions = Vec::with_capacity(FALLBACK_EXTENSIONS.len() + 2);
    let leading = [archive, preferred].into_iter().flatten().filter_map(|f| f.extension());
    for ext in leading.chain(FALLBACK_EXTENSIONS) {
        if !ext.is_empty() && !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }
    extensions
}
