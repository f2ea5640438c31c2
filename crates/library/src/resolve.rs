use crate::assets::AssetKind;
use crate::error::{ErrorKind, Result};
use crate::locate::locate;
use crate::{Library, Match};
use folio_archive::{Format, candidate_extensions};
use folio_catalog::CatalogEntry;
use serde::Serialize;
use tracing::{Span, debug, field, instrument, warn};

/// Where resolved bytes came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum BookOrigin {
    Cache { path: String },
    Archive { archive: String, entry: String, matched: Match },
}

/// A book's file, ready to stream out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedBook {
    pub book_id: u64,
    /// Format implied by the entry extension; [`Format::Unknown`] for
    /// extensions outside the declared set (`rtf`, `html`).
    pub format: Format,
    /// Extension the bytes were stored under.
    pub extension: String,
    pub origin: BookOrigin,
    pub data: Vec<u8>,
}

fn extension_of(name: &str) -> String {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()).unwrap_or_default()
}

impl Library {
    /// Resolve `book_id` to the bytes of its file.
    ///
    /// With no `desired` format, the book's catalogued native format is
    /// preferred. Each candidate archive that is missing, unreadable or
    /// lacks the entry is skipped; only when all of them fail is
    /// [`ErrorKind::BookFileNotFound`] returned. A catalog failure is
    /// reported the same way, since there is nothing to try.
    #[instrument(skip(self), fields(archive = field::Empty, entry = field::Empty))]
    pub async fn resolve(&self, book_id: u64, desired: Option<Format>) -> Result<ResolvedBook> {
        let repo = self.repository();
        let preferred = match desired {
            Some(format) => Some(format),
            None => repo.native_format(book_id).await.unwrap_or_else(|err| {
                warn!(%err, "native format lookup failed");
                None
            }),
        };

        if self.settings.cache_book_files
            && let Some(book) = self.resolve_cached(book_id, desired).await
        {
            return Ok(book);
        }

        let candidates = match repo.find_candidates(book_id, preferred).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(%err, "catalog unavailable, cannot resolve");
                exn::bail!(ErrorKind::BookFileNotFound(book_id));
            },
        };
        let hint = repo.filename_hint(book_id).await.unwrap_or_else(|err| {
            warn!(%err, "filename hint lookup failed");
            None
        });

        for candidate in &candidates {
            if let Some(book) = self.try_candidate(book_id, candidate, preferred, hint.as_deref()).await {
                if self.settings.cache_book_files
                    && let Err(err) = self.assets.put(AssetKind::File, book_id, &book.extension, &book.data).await
                {
                    warn!(%err, "could not cache book file");
                }
                return Ok(book);
            }
        }
        debug!(candidates = candidates.len(), "no candidate yielded the book");
        exn::bail!(ErrorKind::BookFileNotFound(book_id))
    }

    async fn resolve_cached(&self, book_id: u64, desired: Option<Format>) -> Option<ResolvedBook> {
        let extensions = candidate_extensions(None, desired);
        let extensions: Vec<&str> = match desired.and_then(|f| f.extension()) {
            Some(ext) => vec![ext],
            None => extensions,
        };
        match self.assets.get(AssetKind::File, book_id, &extensions).await {
            Ok(Some(hit)) => Some(ResolvedBook {
                book_id,
                format: hit.extension.parse().unwrap_or_default(),
                origin: BookOrigin::Cache { path: hit.path.display().to_string() },
                extension: hit.extension,
                data: hit.data,
            }),
            Ok(None) => None,
            Err(err) => {
                warn!(%err, "book file cache unavailable");
                None
            },
        }
    }

    async fn try_candidate(
        &self,
        book_id: u64,
        candidate: &CatalogEntry,
        preferred: Option<Format>,
        hint: Option<&str>,
    ) -> Option<ResolvedBook> {
        let filename = candidate.filename.as_str();
        if !self.archive_exists(filename).await {
            let failure = ErrorKind::CatalogInconsistency(format!("{filename} is catalogued but not on disk"));
            debug!(%failure, "skipping candidate");
            return None;
        }
        let path = self.archive_path(filename);
        let entries = match self.prober.list(&path).await {
            Ok(entries) => entries,
            Err(err) => {
                let failure = ErrorKind::ArchiveUnreadable(filename.to_string());
                warn!(%failure, %err, "skipping candidate");
                return None;
            },
        };
        let declared = self.serving_patterns().classify(filename).map(|archive| archive.format);
        let extensions = candidate_extensions(declared, preferred);
        let Some((entry, matched)) = locate(&entries, book_id, hint, &extensions) else {
            debug!(archive = filename, "no matching entry");
            return None;
        };
        let data = match self.prober.read(&path, &entry.name).await {
            Ok(data) => data,
            Err(err) => {
                let failure = ErrorKind::ArchiveUnreadable(format!("{filename}: {}", entry.name));
                warn!(%failure, %err, "skipping candidate");
                return None;
            },
        };
        Span::current().record("archive", filename).record("entry", entry.name.as_str());
        Some(ResolvedBook {
            book_id,
            format: Format::from_path(&entry.name),
            extension: extension_of(&entry.name),
            origin: BookOrigin::Archive { archive: filename.to_string(), entry: entry.name.clone(), matched },
            data,
        })
    }
}
