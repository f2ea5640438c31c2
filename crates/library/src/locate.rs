//! Entry lookup inside a listed archive.
//!
//! Works on the listing alone; the chosen entry is read afterwards, so a
//! multi-gigabyte archive is never decompressed as a whole.

use folio_archive::EntryInfo;
use serde::Serialize;
use tracing::{debug, warn};

/// Which rule picked the entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Match {
    /// The catalogued filename hint.
    Hint,
    /// A constructed `{book_id}.{ext}` name.
    Constructed,
    /// The first entry with a candidate extension. Ambiguous for archives
    /// holding more than one book.
    ExtensionScan,
}

/// Case-insensitive: `name` is `target` or ends with `/target`.
fn names_match(name: &str, target: &str) -> bool {
    let (name, target) = (name.to_lowercase(), target.to_lowercase());
    name == target || name.ends_with(&format!("/{target}"))
}

fn has_extension(name: &str, ext: &str) -> bool {
    name.to_lowercase().ends_with(&format!(".{}", ext.to_lowercase()))
}

/// Pick the entry for `book_id` from an archive listing.
///
/// 1. the filename hint, if any (falls through when it matches nothing)
/// 2. `{book_id}.{ext}` for each extension, in order
/// 3. the first entry ending in `.{ext}` for each extension, in order
pub fn locate<'a>(
    entries: &'a [EntryInfo],
    book_id: u64,
    hint: Option<&str>,
    extensions: &[&str],
) -> Option<(&'a EntryInfo, Match)> {
    if let Some(hint) = hint {
        if let Some(entry) = entries.iter().find(|e| names_match(&e.name, hint)) {
            return Some((entry, Match::Hint));
        }
        debug!(book_id, hint, "filename hint matched no entry");
    }
    for ext in extensions {
        let candidate = format!("{book_id}.{ext}");
        if let Some(entry) = entries.iter().find(|e| names_match(&e.name, &candidate)) {
            return Some((entry, Match::Constructed));
        }
    }
    for ext in extensions {
        if let Some(entry) = entries.iter().find(|e| has_extension(&e.name, ext)) {
            warn!(book_id, entry = %entry.name, "picked entry by extension alone");
            return Some((entry, Match::ExtensionScan));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn listing(names: &[&str]) -> Vec<EntryInfo> {
        names.iter().map(|name| EntryInfo::new(*name, 10)).collect()
    }

    const EXTENSIONS: [&str; 3] = ["fb2", "epub", "txt"];

    #[rstest]
    #[case::hint_exact(&["5.fb2", "Author - Title.FB2"], Some("author - title.fb2"), "Author - Title.FB2", Match::Hint)]
    #[case::hint_in_folder(&["5.fb2", "books/x.fb2"], Some("x.fb2"), "books/x.fb2", Match::Hint)]
    #[case::hint_misses_falls_through(&["5.fb2"], Some("missing.fb2"), "5.fb2", Match::Constructed)]
    #[case::constructed_in_folder(&["4.fb2", "sub/5.epub"], None, "sub/5.epub", Match::Constructed)]
    #[case::extension_order(&["5.txt", "5.epub"], None, "5.epub", Match::Constructed)]
    #[case::suffix_is_not_substring(&["15.fb2", "only.epub"], None, "15.fb2", Match::ExtensionScan)]
    #[case::extension_scan(&["readme.md", "book.TXT"], None, "book.TXT", Match::ExtensionScan)]
    fn test_locate(
        #[case] names: &[&str],
        #[case] hint: Option<&str>,
        #[case] expected: &str,
        #[case] rule: Match,
    ) {
        let entries = listing(names);
        let (entry, matched) = locate(&entries, 5, hint, &EXTENSIONS).unwrap();
        assert_eq!(entry.name, expected);
        assert_eq!(matched, rule);
    }

    #[test]
    fn test_exhausted() {
        let entries = listing(&["cover.jpg", "readme.md"]);
        assert!(locate(&entries, 5, Some("5.fb2"), &EXTENSIONS).is_none());
        assert!(locate(&[], 5, None, &EXTENSIONS).is_none());
    }
}
