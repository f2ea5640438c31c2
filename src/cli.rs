use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "folio", version, about = "Archive-backed book resolution and catalog maintenance")]
pub struct Cli {
    /// Configuration file (TOML or YAML). Defaults to the platform config directory.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print reports as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Report gaps, catalog mismatches and uncovered ids. Read-only.
    Audit,

    /// Recompute catalog ranges from archive contents.
    Reconcile {
        /// Write the changes; otherwise only report them.
        #[arg(long)]
        apply: bool,

        /// Include numeric-only `f.n.*` archives.
        #[arg(long)]
        experimental: bool,

        /// Examine at most this many archives.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Drop catalog rows whose archive no longer exists.
    Purge {
        #[arg(long)]
        apply: bool,

        /// Only consider catalog filenames matching this regex (case-insensitive).
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Fetch a book's file.
    Resolve {
        book_id: u64,

        /// Preferred format (fb2, epub, djvu, pdf, mobi, txt).
        #[arg(short, long)]
        format: Option<String>,

        /// Write the file here instead of printing a summary.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch or extract a book's cover.
    Cover {
        book_id: u64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reconcile() {
        let cli = Cli::try_parse_from(["folio", "--json", "reconcile", "--apply", "--limit", "5"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Reconcile { apply: true, experimental: false, limit: Some(5) }));
    }

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from(["folio", "resolve", "42", "--format", "epub"]).unwrap();
        assert!(matches!(cli.command, Command::Resolve { book_id: 42, format: Some(ref f), output: None } if f == "epub"));
    }
}
