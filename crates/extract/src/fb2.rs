//! FictionBook cover scan.
//!
//! FB2 embeds images as base64 text inside `<binary id=".." content-type="..">`
//! elements. There is no reliable pointer to "the" cover, so candidates are
//! tried in tiers:
//!
//! 1. a binary whose `id` contains `cover` (any case)
//! 2. a binary whose `content-type` is `image/*`
//! 3. a binary whose `id` mentions `jpg`, `jpeg`, `png` or `cover`

use crate::error::{ErrorKind, Result};
use base64::Engine;
use base64::alphabet::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

// Plenty of FB2 files in the wild drop the trailing `=` padding.
const LENIENT: GeneralPurpose =
    GeneralPurpose::new(&STANDARD, GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent));

#[derive(Debug, Default)]
struct Binary {
    id: String,
    content_type: String,
    payload: Vec<u8>,
}

fn attributes(element: &BytesStart<'_>) -> Binary {
    let mut binary = Binary::default();
    for attr in element.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        match attr.key.local_name().as_ref() {
            b"id" => binary.id = value,
            b"content-type" => binary.content_type = value,
            _ => {},
        }
    }
    binary
}

/// Collect every `<binary>` element. A parse error stops the scan but keeps
/// what was found before it, since binaries sit at the end of the document.
fn binaries(document: &[u8]) -> Vec<Binary> {
    let mut reader = Reader::from_reader(document);
    let mut buf = Vec::new();
    let mut found = Vec::new();
    let mut current: Option<Binary> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"binary" => current = Some(attributes(e)),
            Ok(Event::Text(ref t)) => {
                if let Some(binary) = current.as_mut() {
                    binary.payload.extend_from_slice(t);
                }
            },
            Ok(Event::CData(ref t)) => {
                if let Some(binary) = current.as_mut() {
                    binary.payload.extend_from_slice(t);
                }
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"binary" => found.extend(current.take()),
            Ok(Event::Eof) => break,
            Err(err) => {
                debug!(position = reader.buffer_position(), %err, "stopped FB2 scan");
                break;
            },
            _ => {},
        }
        buf.clear();
    }
    found
}

fn decode(binary: &Binary) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = binary.payload.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
    let data = LENIENT.decode(&cleaned).map_err(|e| ErrorKind::Decode(format!("{}: {e}", binary.id)))?;
    if data.is_empty() {
        exn::bail!(ErrorKind::Decode(format!("{}: empty payload", binary.id)));
    }
    Ok(data)
}

fn id_mentions_cover(binary: &Binary) -> bool {
    binary.id.to_lowercase().contains("cover")
}

fn is_image_type(binary: &Binary) -> bool {
    binary.content_type.trim().to_lowercase().starts_with("image/")
}

fn id_looks_like_image(binary: &Binary) -> bool {
    let id = binary.id.to_lowercase();
    ["jpg", "jpeg", "png", "cover"].iter().any(|needle| id.contains(needle))
}

/// Extract the most likely cover image from an FB2 document.
pub fn cover(document: &[u8]) -> Option<Vec<u8>> {
    let binaries = binaries(document);
    let tiers: [fn(&Binary) -> bool; 3] = [id_mentions_cover, is_image_type, id_looks_like_image];
    tiers.iter().find_map(|tier| {
        binaries.iter().filter(|b| tier(b)).find_map(|binary| match decode(binary) {
            Ok(data) => Some(data),
            Err(err) => {
                debug!(%err, "skipping FB2 binary");
                None
            },
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "/9j/4AAQSkZJRg==";
    const PNG: &str = "iVBORw0KGgo=";

    fn document(binaries: &[(&str, &str, &str)]) -> Vec<u8> {
        let mut doc = String::from(
            r#"<?xml version="1.0" encoding="utf-8"?><FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0"><body><p>Text</p></body>"#,
        );
        for (id, content_type, payload) in binaries {
            doc.push_str(&format!(r#"<binary id="{id}" content-type="{content_type}">{payload}</binary>"#));
        }
        doc.push_str("</FictionBook>");
        doc.into_bytes()
    }

    #[test]
    fn test_cover_id_wins() {
        let doc = document(&[("img1.png", "image/png", PNG), ("Cover.jpg", "image/jpeg", PIXEL)]);
        assert_eq!(cover(&doc).unwrap()[..3], [0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_falls_back_to_image_content_type() {
        let doc = document(&[("note", "text/plain", "aGVsbG8="), ("pic1", "image/png", PNG)]);
        assert_eq!(cover(&doc).unwrap()[..4], *b"\x89PNG");
    }

    #[test]
    fn test_falls_back_to_id_extension() {
        let doc = document(&[("pic.jpeg", "application/octet-stream", PIXEL)]);
        assert_eq!(cover(&doc).unwrap()[..3], [0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_whitespace_and_missing_padding() {
        let doc = document(&[("cover", "image/jpeg", "\n  /9j/4AAQ\n  SkZJRg\n")]);
        assert_eq!(cover(&doc).unwrap()[..3], [0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_undecodable_cover_tries_next() {
        let doc = document(&[("cover", "image/jpeg", "!!not base64!!"), ("pic", "image/png", PNG)]);
        assert_eq!(cover(&doc).unwrap()[..4], *b"\x89PNG");
    }

    #[test]
    fn test_no_binaries() {
        assert_eq!(cover(&document(&[])), None);
        assert_eq!(cover(&document(&[("font", "font/ttf", "AAAA")])), None);
        assert_eq!(cover(b"not xml at all"), None);
    }
}
