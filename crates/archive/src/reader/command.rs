//! External `unzip` reader.

use crate::error::{ErrorKind, Result};
use crate::{ArchiveReader, EntryInfo};
use async_trait::async_trait;
use exn::ResultExt;
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::instrument;

// `unzip -l` rows: "  <length>  <date> <time>   <name>"
static LISTING_ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+\S+\s+\S+\s+(.+)$").unwrap());

/// Shells out to an `unzip`-compatible tool for listings and reads.
///
/// Kept for hosts where the archives use features the in-process reader
/// does not support. Child processes are killed if the calling future is
/// dropped.
#[derive(Clone, Debug)]
pub struct CommandReader {
    program: PathBuf,
}
impl CommandReader {
    /// Locate `program` on `PATH` (or accept it as-is if it is already a path).
    pub fn new(program: impl AsRef<Path>) -> Result<Self> {
        let program = program.as_ref();
        let resolved =
            which::which(program).or_raise(|| ErrorKind::Tool(format!("{} not found", program.display())))?;
        Ok(Self { program: resolved })
    }

    async fn run(&self, args: &[&OsStr], archive: &Path) -> Result<Output> {
        if !tokio::fs::try_exists(archive).await.unwrap_or(false) {
            exn::bail!(ErrorKind::NotFound(archive.to_path_buf()));
        }
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .or_raise(|| ErrorKind::Tool(self.program.display().to_string()))?;
        Ok(output)
    }

    /// `unzip` matches member names as wildcards. Wrapping each wildcard
    /// character in a one-character class makes it match only itself.
    pub(crate) fn escape_member(name: &str) -> String {
        let mut escaped = String::with_capacity(name.len());
        for c in name.chars() {
            match c {
                '*' | '?' | '[' => {
                    escaped.push('[');
                    escaped.push(c);
                    escaped.push(']');
                },
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Parse the table printed by `unzip -l`. Header, separator and
    /// summary lines do not match the row pattern and are skipped.
    pub(crate) fn parse_listing(stdout: &str) -> Vec<EntryInfo> {
        stdout
            .lines()
            .filter_map(|line| {
                let captures = LISTING_ROW.captures(line)?;
                let size = captures.get(1)?.as_str().parse().ok()?;
                let name = captures.get(2)?.as_str().trim_end();
                (!name.ends_with('/')).then(|| EntryInfo::new(name, size))
            })
            .collect()
    }
}

#[async_trait]
impl ArchiveReader for CommandReader {
    fn name(&self) -> &str {
        "command"
    }

    #[instrument(skip(self), fields(archive = %archive.display()))]
    async fn list(&self, archive: &Path) -> Result<Vec<EntryInfo>> {
        let output = self.run(&[OsStr::new("-l"), archive.as_os_str()], archive).await?;
        if !output.status.success() {
            exn::bail!(ErrorKind::Unreadable(archive.to_path_buf()));
        }
        Ok(Self::parse_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    #[instrument(skip(self), fields(archive = %archive.display()))]
    async fn read_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>> {
        let member = Self::escape_member(entry);
        let output = self.run(&[OsStr::new("-p"), archive.as_os_str(), OsStr::new(&member)], archive).await?;
        match output.status.code() {
            Some(0) => Ok(output.stdout),
            // 11: "no matching files were found"
            Some(11) => exn::bail!(ErrorKind::EntryNotFound(entry.to_string())),
            _ => exn::bail!(ErrorKind::Unreadable(archive.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LISTING: &str = "Archive:  f.fb2.1-10.zip
  Length      Date    Time    Name
---------  ---------- -----   ----
     1234  2021-03-04 10:11   1.fb2
        0  2021-03-04 10:11   sub/
       99  2021-03-04 10:11   sub/my book 10.fb2
---------                     -------
     1333                     3 files
";

    #[test]
    fn test_parse_listing() {
        let entries = CommandReader::parse_listing(LISTING);
        assert_eq!(entries, vec![EntryInfo::new("1.fb2", 1234), EntryInfo::new("sub/my book 10.fb2", 99)]);
    }

    #[rstest]
    #[case("12.fb2", "12.fb2")]
    #[case("Author - Title [2001].fb2", "Author - Title [[]2001].fb2")]
    #[case("what?.fb2", "what[?].fb2")]
    #[case("*.fb2", "[*].fb2")]
    fn test_escape_member(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(CommandReader::escape_member(name), expected);
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(CommandReader::parse_listing("").is_empty());
    }

    #[test]
    fn test_missing_tool() {
        let err = CommandReader::new("definitely-not-an-unzip-binary").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Tool(_)));
    }
}
