//! OCF packaging: `META-INF/container.xml` and the package document.
//!
//! `container.xml` names the package document; the package document is then
//! split into the metadata, manifest and spine sub-models. Every manifest
//! `href` is resolved against the package document's directory here, so the
//! rest of the crate only ever deals in archive-absolute paths.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{EpubError, ParseError};
use crate::manifest::{parse_manifest, Manifest};
use crate::metadata::{parse_metadata, Metadata};
use crate::spine::{parse_spine, Spine};
use crate::xml;

/// Archive path of the OCF container document.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Media type of an OPF package document.
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// A `<rootfile>` declared by `container.xml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rootfile {
    /// Archive-absolute path of the package document.
    pub full_path: String,
    /// Declared media type (usually `application/oebps-package+xml`).
    pub media_type: Option<String>,
}

/// Parse `container.xml` and return every declared rootfile in order.
pub fn parse_rootfiles(content: &[u8]) -> Result<Vec<Rootfile>, ParseError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut rootfiles = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if xml::start_name(&e) == "rootfile" {
                    let attrs = xml::attributes(&e);
                    if let Some(full_path) = xml::attr(&attrs, "full-path") {
                        let full_path = full_path.trim();
                        if !full_path.is_empty() {
                            rootfiles.push(Rootfile {
                                full_path: normalize_path(&percent_decode(full_path)),
                                media_type: xml::attr(&attrs, "media-type").map(str::to_string),
                            });
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml::parse_failure(CONTAINER_PATH, content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rootfiles)
}

/// Parse `container.xml` to find the package document path.
///
/// The first rootfile with the OPF media type wins; failing that, the first
/// rootfile of any type.
pub fn parse_container_xml(content: &[u8]) -> Result<String, EpubError> {
    let rootfiles = parse_rootfiles(content)?;
    rootfiles
        .iter()
        .find(|r| r.media_type.as_deref() == Some(PACKAGE_MEDIA_TYPE))
        .or_else(|| rootfiles.first())
        .map(|r| r.full_path.clone())
        .ok_or_else(|| EpubError::InvalidEpub("No rootfile found in container.xml".into()))
}

/// The parsed package document.
#[derive(Clone, Debug, PartialEq)]
pub struct Package {
    /// Archive path of the package document.
    pub path: String,
    /// Dublin Core metadata, metas, version and guide.
    pub metadata: Metadata,
    /// Resource inventory with archive-absolute hrefs.
    pub manifest: Manifest,
    /// Reading order.
    pub spine: Spine,
}

impl Package {
    /// Directory containing the package document (empty at archive root).
    pub fn base_dir(&self) -> &str {
        parent_dir(&self.path)
    }

    /// Resolve an href written inside the package document.
    pub fn resolve(&self, href: &str) -> String {
        resolve_href(&self.path, href)
    }
}

/// Parse a package document located at `path`.
///
/// Malformed XML is fatal and reported against `path`. A document without a
/// `<package>` root is rejected as an invalid EPUB; missing optional parts
/// simply produce empty sub-models.
pub fn parse_package(path: &str, content: &[u8]) -> Result<Package, EpubError> {
    if !has_package_root(content).map_err(|e| e.in_document(path))? {
        return Err(EpubError::InvalidEpub(format!(
            "{} has no <package> root element",
            path
        )));
    }

    let metadata = parse_metadata(content).map_err(|e| e.in_document(path))?;
    let manifest = parse_manifest(content, path).map_err(|e| e.in_document(path))?;
    let spine = parse_spine(content).map_err(|e| e.in_document(path))?;

    #[cfg(feature = "std")]
    log::debug!(
        "[OPF] {}: version {}, {} manifest items, {} spine items",
        path,
        metadata.version,
        manifest.len(),
        spine.len()
    );

    Ok(Package {
        path: path.to_string(),
        metadata,
        manifest,
        spine,
    })
}

fn has_package_root(content: &[u8]) -> Result<bool, ParseError> {
    let mut reader = Reader::from_reader(content);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(xml::start_name(&e) == "package");
            }
            Ok(Event::Eof) => return Ok(false),
            Err(e) => return Err(xml::parse_failure("", content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }
}

/// Directory part of an archive path, without trailing slash.
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve `href` relative to the document at `base_doc`.
///
/// Fragments are dropped, `%XX` escapes decoded and `.`/`..` segments
/// collapsed. A leading `/` addresses the archive root. Absolute URLs
/// (`scheme://...`, `data:`, `mailto:`) are returned unchanged.
pub fn resolve_href(base_doc: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href).trim();
    if is_external(href) {
        return href.to_string();
    }
    let href = percent_decode(href);
    if href.is_empty() {
        return normalize_path(base_doc);
    }
    if let Some(rooted) = href.strip_prefix('/') {
        return normalize_path(rooted);
    }

    let base_dir = parent_dir(base_doc);
    if base_dir.is_empty() {
        normalize_path(&href)
    } else {
        normalize_path(&format!("{}/{}", base_dir, href))
    }
}

/// Split an href into its path and optional fragment.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (href, None),
    }
}

fn is_external(href: &str) -> bool {
    href.contains("://") || href.starts_with("data:") || href.starts_with("mailto:")
}

/// Collapse `.`/`..` and empty segments.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// Decode `%XX` escapes. Invalid escapes are kept literally.
pub fn percent_decode(input: &str) -> String {
    if !input.contains('%') {
        return input.to_string();
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
