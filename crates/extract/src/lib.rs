//! Cover extraction from book documents.
//!
//! Each supported document family has a pure `(bytes) -> Option<bytes>`
//! heuristic, collected in a [`CoverStrategies`] table so callers can swap
//! or instrument individual strategies. [`ImageFormat`] identifies what came
//! out by its magic bytes.

mod epub;
pub mod error;
mod fb2;
mod image;
mod strategy;

pub use crate::image::{ImageFormat, SNIFF_LEN};
pub use crate::strategy::{CoverStrategies, DocumentKind, Strategy};

/// Cover of an FB2 document (embedded base64 binaries).
pub fn fb2_cover(document: &[u8]) -> Option<Vec<u8>> {
    fb2::cover(document)
}

/// Cover of an EPUB document (package manifest, guide, or largest image).
pub fn epub_cover(document: &[u8]) -> Option<Vec<u8>> {
    epub::cover(document)
}
