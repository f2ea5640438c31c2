use crate::error::{ErrorKind, Result};
use crate::resolve::BookOrigin;
use crate::Library;
use folio_extract::{CoverStrategies, DocumentKind, ImageFormat, Strategy};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Where a cover's bytes came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum CoverOrigin {
    Cache,
    /// The precomputed pointer into the attachments archive.
    Attachment { entry: String },
    /// Pulled out of the book's own file.
    Extracted { archive: Option<String>, entry: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cover {
    pub book_id: u64,
    pub format: ImageFormat,
    pub origin: CoverOrigin,
    pub data: Vec<u8>,
}

/// Runs the per-format cover heuristics on a resolved book file.
#[derive(Clone, Debug, Default)]
pub struct CoverExtractor {
    strategies: Arc<CoverStrategies>,
}
impl CoverExtractor {
    pub fn new(strategies: CoverStrategies) -> Self {
        Self { strategies: Arc::new(strategies) }
    }

    /// Replace the heuristic used for `kind`.
    #[must_use]
    pub fn with_strategy(self, kind: DocumentKind, strategy: Strategy) -> Self {
        Self::new(CoverStrategies::clone(&self.strategies).with_strategy(kind, strategy))
    }

    /// Heuristics parse whole documents, so they run off the async threads.
    async fn extract(&self, kind: Option<DocumentKind>, document: Vec<u8>) -> Option<Vec<u8>> {
        let strategies = Arc::clone(&self.strategies);
        match tokio::task::spawn_blocking(move || strategies.extract(kind, &document)).await {
            Ok(cover) => cover,
            Err(err) => {
                warn!(%err, "cover extraction task failed");
                None
            },
        }
    }
}

impl Library {
    /// Find the cover for `book_id`: asset cache, then the attachments
    /// archive, then the book file itself. Anything found outside the
    /// cache is written back to it.
    #[instrument(skip(self))]
    pub async fn cover(&self, book_id: u64) -> Result<Cover> {
        match self.assets.get_cover(book_id).await {
            Ok(Some(hit)) => {
                let format = ImageFormat::from_magic_bytes(&hit.data);
                return Ok(Cover { book_id, format, origin: CoverOrigin::Cache, data: hit.data });
            },
            Ok(None) => {},
            Err(err) => warn!(%err, "cover cache unavailable"),
        }

        let found = match self.attachment_cover(book_id).await {
            Some(found) => Some(found),
            None => self.extracted_cover(book_id).await,
        };
        let Some((origin, data)) = found else {
            debug!("no cover available");
            exn::bail!(ErrorKind::CoverNotFound(book_id));
        };

        let format = match self.assets.put_cover(book_id, &data).await {
            Ok(format) => format,
            Err(err) => {
                warn!(%err, "could not cache cover");
                ImageFormat::from_magic_bytes(&data)
            },
        };
        Ok(Cover { book_id, format, origin, data })
    }

    async fn attachment_cover(&self, book_id: u64) -> Option<(CoverOrigin, Vec<u8>)> {
        let entry = match self.repository().cover_pointer(book_id).await {
            Ok(entry) => entry?,
            Err(err) => {
                warn!(%err, "cover pointer lookup failed");
                return None;
            },
        };
        let archive = self.archive_path(&self.settings.attachments);
        match self.prober.read(&archive, &entry).await {
            Ok(data) if !data.is_empty() => Some((CoverOrigin::Attachment { entry }, data)),
            Ok(_) => {
                debug!(entry = %entry, "attachment entry is empty");
                None
            },
            Err(err) => {
                warn!(%err, entry = %entry, "attachment entry unreadable");
                None
            },
        }
    }

    async fn extracted_cover(&self, book_id: u64) -> Option<(CoverOrigin, Vec<u8>)> {
        let book = match self.resolve(book_id, None).await {
            Ok(book) => book,
            Err(err) => {
                debug!(%err, "book file unavailable for cover extraction");
                return None;
            },
        };
        let kind = DocumentKind::from_format(book.format);
        let data = self.covers.extract(kind, book.data).await?;
        let origin = match book.origin {
            BookOrigin::Archive { archive, entry, .. } => {
                CoverOrigin::Extracted { archive: Some(archive), entry: Some(entry) }
            },
            BookOrigin::Cache { .. } => CoverOrigin::Extracted { archive: None, entry: None },
        };
        Some((origin, data))
    }
}
