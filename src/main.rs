mod cli;

use crate::cli::{Cli, Command};
use clap::Parser;
use folio_archive::Format;
use folio_library::error::Error;
use folio_library::{Library, PurgeOptions, ReconcileOptions};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Ran cleanly, nothing to report.
const EXIT_CLEAN: u8 = 0;
/// Ran cleanly, with findings or changes.
const EXIT_FINDINGS: u8 = 1;
const EXIT_FAILURE: u8 = 2;
/// Book or cover not found.
const EXIT_NOT_FOUND: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match folio_config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err:?}");
            return ExitCode::from(EXIT_FAILURE);
        },
    };
    let library = match Library::open(&config).await {
        Ok(library) => library,
        Err(err) => return ExitCode::from(failure(&err)),
    };
    let code = match run(&library, cli.command, cli.json).await {
        Ok(code) => code,
        Err(err) => failure(&err),
    };
    library.catalog().close().await;
    ExitCode::from(code)
}

fn failure(err: &Error) -> u8 {
    if err.is_not_found() {
        debug!("{err}");
        eprintln!("{err}");
        EXIT_NOT_FOUND
    } else {
        error!("{err:?}");
        EXIT_FAILURE
    }
}

fn findings(found: bool) -> u8 {
    if found { EXIT_FINDINGS } else { EXIT_CLEAN }
}

async fn run(library: &Library, command: Command, json: bool) -> Result<u8, Error> {
    match command {
        Command::Audit => {
            let report = library.audit().await?;
            print(json, &report, || {
                println!("{} archives under {}, {} catalog rows sampled", report.archives, report.root.display(), report.sampled);
                for name in &report.unrecognized {
                    println!("unrecognized: {name}");
                }
                for finding in &report.findings {
                    println!("{finding:?}");
                }
            });
            Ok(findings(report.has_findings()))
        },
        Command::Reconcile { apply, experimental, limit } => {
            let options = ReconcileOptions { apply, include_experimental: experimental, limit };
            let changes = library.reconcile(options).await?;
            print(json, &changes, || {
                let verb = if changes.applied { "applied" } else { "pending" };
                println!(
                    "{} archives examined, {} unchanged, {} changes {verb}",
                    changes.examined,
                    changes.unchanged,
                    changes.changes.len()
                );
                for change in &changes.changes {
                    println!("{change:?}");
                }
                for skipped in &changes.skipped {
                    println!("skipped {}: {:?}", skipped.filename, skipped.reason);
                }
                for overlap in &changes.overlaps {
                    println!("overlap {} / {}: {}-{}", overlap.first, overlap.second, overlap.start, overlap.end);
                }
            });
            Ok(findings(changes.has_findings()))
        },
        Command::Purge { apply, pattern } => {
            let report = library.purge(PurgeOptions { apply, pattern }).await?;
            print(json, &report, || {
                let verb = if report.applied { "deleted" } else { "would delete" };
                println!("{} orphaned rows, {verb} {}", report.matched, report.deleted);
                for name in &report.sample {
                    println!("  {name}");
                }
            });
            Ok(findings(report.has_findings()))
        },
        Command::Resolve { book_id, format, output } => {
            let desired = match format.map(|f| f.parse::<Format>()).transpose() {
                Ok(desired) => desired,
                Err(err) => {
                    error!("{err}");
                    return Ok(EXIT_FAILURE);
                },
            };
            let book = library.resolve(book_id, desired).await?;
            if let Some(output) = output
                && !write_output(&output, &book.data).await
            {
                return Ok(EXIT_FAILURE);
            }
            let summary = Summary { book_id, format: book.format.as_str(), size: book.data.len(), origin: &book.origin };
            print(json, &summary, || println!("book {book_id}: {} bytes of {} from {:?}", summary.size, summary.format, book.origin));
            Ok(EXIT_CLEAN)
        },
        Command::Cover { book_id, output } => {
            let cover = library.cover(book_id).await?;
            if let Some(output) = output
                && !write_output(&output, &cover.data).await
            {
                return Ok(EXIT_FAILURE);
            }
            let summary = Summary { book_id, format: cover.format.extension(), size: cover.data.len(), origin: &cover.origin };
            print(json, &summary, || println!("cover {book_id}: {} bytes of {} from {:?}", summary.size, summary.format, cover.origin));
            Ok(EXIT_CLEAN)
        },
    }
}

#[derive(Serialize)]
struct Summary<'a, O: Serialize> {
    book_id: u64,
    format: &'a str,
    size: usize,
    origin: &'a O,
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) {
    if !json {
        return text();
    }
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{out}"),
        Err(err) => error!(%err, "could not serialize report"),
    }
}

async fn write_output(path: &Path, data: &[u8]) -> bool {
    match tokio::fs::write(path, data).await {
        Ok(()) => true,
        Err(err) => {
            error!(path = %path.display(), %err, "could not write output");
            false
        },
    }
}
