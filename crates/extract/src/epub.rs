//! EPUB cover lookup.
//!
//! Tried in order, first hit wins:
//! 1. `META-INF/container.xml` points at the OPF package; inside it a
//!    `<meta name="cover" content="ID">` names a manifest item, or a
//!    manifest item carries `properties="cover-image"`
//! 2. a `<guide><reference type="cover" href="..">` in the OPF
//! 3. an entry named like `cover.jpg` or living under `images/cover`
//! 4. the largest image in the archive
//!
//! OPF hrefs are relative to the OPF's own directory.

use crate::ImageFormat;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::sync::LazyLock;
use tracing::debug;
use zip::ZipArchive;

static COVER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|/)cover\.(jpg|jpeg|png|gif|webp)$").unwrap());

const CONTAINER: &str = "META-INF/container.xml";

#[derive(Debug, Default)]
struct Package {
    /// Manifest `id -> href`, hrefs still relative to the OPF.
    manifest: HashMap<String, String>,
    meta_cover: Option<String>,
    cover_image_item: Option<String>,
    guide_cover: Option<String>,
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive.by_name(name).or_raise(|| ErrorKind::MissingEntry(name.to_string()))?;
    let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
    file.read_to_end(&mut data).or_raise(|| ErrorKind::Malformed("EPUB"))?;
    Ok(data)
}

fn find_opf_path<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let container = read_entry(archive, CONTAINER)?;
    let mut reader = Reader::from_reader(container.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).or_raise(|| ErrorKind::Malformed("container.xml"))? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(path) = attribute(e, b"full-path") {
                    return Ok(path);
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    exn::bail!(ErrorKind::MissingEntry("rootfile".to_string()))
}

fn parse_package(opf: &[u8]) -> Result<Package> {
    let mut reader = Reader::from_reader(opf);
    let mut buf = Vec::new();
    let mut package = Package::default();
    loop {
        match reader.read_event_into(&mut buf).or_raise(|| ErrorKind::Malformed("OPF"))? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"meta" if attribute(e, b"name").is_some_and(|n| n.eq_ignore_ascii_case("cover")) => {
                    package.meta_cover = attribute(e, b"content");
                },
                b"item" => {
                    if let (Some(id), Some(href)) = (attribute(e, b"id"), attribute(e, b"href")) {
                        let properties = attribute(e, b"properties").unwrap_or_default();
                        if properties.split_whitespace().any(|p| p == "cover-image") {
                            package.cover_image_item = Some(id.clone());
                        }
                        package.manifest.insert(id, href);
                    }
                },
                b"reference" if attribute(e, b"type").is_some_and(|t| t.eq_ignore_ascii_case("cover")) => {
                    package.guide_cover = attribute(e, b"href");
                },
                _ => {},
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    Ok(package)
}

/// Resolve `href` against the directory holding the OPF, dropping any
/// fragment and normalising `.`/`..` segments.
fn resolve_href(opf_path: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let mut parts: Vec<&str> = match opf_path.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                parts.pop();
            },
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn is_image_name(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| ImageFormat::from_extension(ext).is_image())
}

/// Entries named by the package, in lookup order.
fn package_candidates<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let opf_path = find_opf_path(archive)?;
    let package = parse_package(&read_entry(archive, &opf_path)?)?;
    let from_manifest = |id: &String| package.manifest.get(id).map(|href| resolve_href(&opf_path, href));
    Ok([
        package.meta_cover.as_ref().and_then(from_manifest),
        package.cover_image_item.as_ref().and_then(from_manifest),
        package.guide_cover.as_ref().map(|href| resolve_href(&opf_path, href)),
    ]
    .into_iter()
    .flatten()
    .collect())
}

/// Entry names chosen by filename conventions, then the largest image.
fn fallback_candidates<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Vec<String> {
    let mut named = Vec::new();
    let mut largest: Option<(u64, String)> = None;
    for index in 0..archive.len() {
        let Ok(file) = archive.by_index_raw(index) else { continue };
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        if COVER_NAME.is_match(&name) || name.to_lowercase().contains("images/cover") {
            named.push(name.clone());
        }
        if is_image_name(&name) && largest.as_ref().is_none_or(|(size, _)| file.size() > *size) {
            largest = Some((file.size(), name));
        }
    }
    named.extend(largest.map(|(_, name)| name));
    named
}

/// Extract the cover image from EPUB bytes.
pub fn cover(document: &[u8]) -> Option<Vec<u8>> {
    let mut archive = match ZipArchive::new(Cursor::new(document)) {
        Ok(archive) => archive,
        Err(err) => {
            debug!(%err, "not a readable EPUB");
            return None;
        },
    };
    let mut candidates = package_candidates(&mut archive).unwrap_or_else(|err| {
        debug!(%err, "EPUB package unusable, falling back to entry names");
        Vec::new()
    });
    candidates.extend(fallback_candidates(&mut archive));
    candidates.into_iter().find_map(|name| {
        let data = read_entry(&mut archive, &name).ok()?;
        // Guide references often point at an XHTML cover page; skip those.
        if ImageFormat::from_magic_bytes(&data).is_image() || is_image_name(&name) {
            debug!(entry = %name, "found EPUB cover");
            Some(data)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0cover-bytes";
    const PNG: &[u8] = b"\x89PNG\r\n\x1A\nother-image";

    fn epub(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const CONTAINER_XML: &[u8] = br#"<?xml version="1.0"?>
<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container" version="1.0">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    #[test]
    fn test_meta_cover() {
        let opf = br#"<package xmlns="http://www.idpf.org/2007/opf"><metadata><meta name="cover" content="img-c"/></metadata>
<manifest><item id="img-a" href="images/a.png" media-type="image/png"/><item id="img-c" href="../art/front.jpg" media-type="image/jpeg"/></manifest></package>"#;
        let doc = epub(&[
            (CONTAINER, CONTAINER_XML),
            ("OEBPS/content.opf", opf),
            ("OEBPS/images/a.png", PNG),
            ("art/front.jpg", JPEG),
        ]);
        assert_eq!(cover(&doc).as_deref(), Some(JPEG));
    }

    #[test]
    fn test_guide_reference() {
        let opf = br#"<package><manifest/><guide><reference type="cover" href="img/c.png#frag"/></guide></package>"#;
        let doc = epub(&[(CONTAINER, CONTAINER_XML), ("OEBPS/content.opf", opf), ("OEBPS/img/c.png", PNG)]);
        assert_eq!(cover(&doc).as_deref(), Some(PNG));
    }

    #[test]
    fn test_guide_page_is_skipped_for_named_cover() {
        let opf = br#"<package><guide><reference type="cover" href="cover.xhtml"/></guide></package>"#;
        let doc = epub(&[
            (CONTAINER, CONTAINER_XML),
            ("OEBPS/content.opf", opf),
            ("OEBPS/cover.xhtml", b"<html/>"),
            ("OEBPS/Images/Cover.JPG", JPEG),
        ]);
        assert_eq!(cover(&doc).as_deref(), Some(JPEG));
    }

    #[test]
    fn test_largest_image_without_package() {
        let big = [PNG, &[0u8; 64][..]].concat();
        let doc = epub(&[("a/small.jpg", JPEG), ("b/big.png", &big), ("text.xhtml", &[0u8; 512])]);
        assert_eq!(cover(&doc), Some(big));
    }

    #[test]
    fn test_no_images() {
        let doc = epub(&[("mimetype", b"application/epub+zip"), ("ch1.xhtml", b"<html/>")]);
        assert_eq!(cover(&doc), None);
        assert_eq!(cover(b"definitely not a zip"), None);
    }

    #[rstest]
    #[case("OEBPS/content.opf", "images/c.jpg", "OEBPS/images/c.jpg")]
    #[case("OEBPS/content.opf", "../c.jpg", "c.jpg")]
    #[case("content.opf", "./c.jpg#x", "c.jpg")]
    #[case("a/b/content.opf", "../../img/c.jpg", "img/c.jpg")]
    fn test_resolve_href(#[case] opf: &str, #[case] href: &str, #[case] expected: &str) {
        assert_eq!(resolve_href(opf, href), expected);
    }
}
