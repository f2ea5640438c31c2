use crate::{epub, fb2};
use folio_archive::Format;
use serde::Serialize;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Pure cover heuristic: document bytes in, image bytes out.
pub type Strategy = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Document families with a cover heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Fb2,
    Epub,
}
impl DocumentKind {
    pub fn from_format(format: Format) -> Option<Self> {
        match format {
            Format::Fb2 => Some(Self::Fb2),
            Format::Epub => Some(Self::Epub),
            _ => None,
        }
    }

    /// Guess the kind from content when the entry name is unhelpful.
    pub fn sniff(document: &[u8]) -> Option<Self> {
        if document.starts_with(b"PK\x03\x04") {
            return Some(Self::Epub);
        }
        let head = &document[..document.len().min(1024)];
        head.windows(b"<FictionBook".len()).any(|w| w == b"<FictionBook").then_some(Self::Fb2)
    }
}

/// Ordered table of `(kind, strategy)` rows.
///
/// # Examples
///
/// ```
/// use folio_extract::{CoverStrategies, DocumentKind};
/// use std::sync::Arc;
///
/// let strategies = CoverStrategies::default()
///     .with_strategy(DocumentKind::Fb2, Arc::new(|_: &[u8]| Some(b"\xFF\xD8\xFF".to_vec())));
/// assert!(strategies.extract(Some(DocumentKind::Fb2), b"<FictionBook/>").is_some());
/// ```
#[derive(Clone)]
pub struct CoverStrategies {
    rows: Vec<(DocumentKind, Strategy)>,
}
impl Default for CoverStrategies {
    fn default() -> Self {
        let fb2: Strategy = Arc::new(fb2::cover);
        let epub: Strategy = Arc::new(epub::cover);
        Self { rows: vec![(DocumentKind::Fb2, fb2), (DocumentKind::Epub, epub)] }
    }
}
impl Debug for CoverStrategies {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_list().entries(self.rows.iter().map(|(kind, _)| kind)).finish()
    }
}
impl CoverStrategies {
    /// Replace the strategy for `kind`, or append one if none exists.
    #[must_use]
    pub fn with_strategy(mut self, kind: DocumentKind, strategy: Strategy) -> Self {
        match self.rows.iter_mut().find(|(k, _)| *k == kind) {
            Some(row) => row.1 = strategy,
            None => self.rows.push((kind, strategy)),
        }
        self
    }

    /// Run the strategy for `kind`. With no kind, sniff the document, and
    /// failing that try every strategy in table order.
    #[instrument(skip(self, document), fields(size = document.len()))]
    pub fn extract(&self, kind: Option<DocumentKind>, document: &[u8]) -> Option<Vec<u8>> {
        let kind = kind.or_else(|| DocumentKind::sniff(document));
        let cover = self
            .rows
            .iter()
            .filter(|(k, _)| kind.is_none_or(|kind| kind == *k))
            .find_map(|(_, strategy)| strategy(document));
        debug!(?kind, found = cover.is_some(), "ran cover strategies");
        cover
    }
}
