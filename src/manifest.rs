//! Package manifest: the inventory of every resource in the book.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ParseError;
use crate::package::resolve_href;
use crate::xml;

/// Media type of XHTML content documents.
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
/// Media type of EPUB2 NCX documents.
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
/// Media type of SMIL media overlays.
pub const SMIL_MEDIA_TYPE: &str = "application/smil+xml";

/// A single `<item>` in the manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestItem {
    /// Resource identifier
    pub id: String,
    /// Archive-absolute path
    pub href: String,
    /// Href exactly as written in the package document
    pub raw_href: String,
    /// MIME type
    pub media_type: String,
    /// Space-separated `properties`, split (e.g. `cover-image`, `nav`)
    pub properties: Vec<String>,
    /// `fallback` manifest id
    pub fallback: Option<String>,
    /// `media-overlay` manifest id of the SMIL document
    pub media_overlay: Option<String>,
}

impl ManifestItem {
    /// Whether `properties` contains `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    /// Raster or vector image resource.
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// XHTML (or legacy HTML) content document.
    pub fn is_xhtml(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            XHTML_MEDIA_TYPE | "text/html" | "application/html+xml"
        )
    }

    /// Embedded font resource.
    pub fn is_font(&self) -> bool {
        let mt = self.media_type.as_str();
        mt.starts_with("font/")
            || mt.starts_with("application/font")
            || mt.starts_with("application/x-font")
            || mt == "application/vnd.ms-opentype"
    }

    /// File name without directories.
    pub fn file_name(&self) -> &str {
        self.href.rsplit('/').next().unwrap_or(&self.href)
    }
}

/// The manifest, in document order.
///
/// Duplicate ids are kept so they can be reported; lookups return the first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    items: Vec<ManifestItem>,
}

impl Manifest {
    /// Build a manifest from already-resolved items.
    pub fn from_items(items: Vec<ManifestItem>) -> Self {
        Self { items }
    }

    /// All items in document order.
    pub fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    /// Iterate over items.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get manifest item by id
    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| !item.id.is_empty() && item.id == id)
    }

    /// Find item by archive path (fragment ignored).
    pub fn by_href(&self, href: &str) -> Option<&ManifestItem> {
        let path = href.split('#').next().unwrap_or(href);
        self.items.iter().find(|item| item.href == path)
    }

    /// Items carrying `property`.
    pub fn with_property<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = &'a ManifestItem> + 'a {
        self.items.iter().filter(move |item| item.has_property(property))
    }

    /// Items with this exact media type.
    pub fn by_media_type<'a>(
        &'a self,
        media_type: &'a str,
    ) -> impl Iterator<Item = &'a ManifestItem> + 'a {
        self.items
            .iter()
            .filter(move |item| item.media_type.eq_ignore_ascii_case(media_type))
    }

    /// Image resources in document order.
    pub fn images(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter().filter(|item| item.is_image())
    }

    /// EPUB3 `cover-image` item.
    pub fn cover_image(&self) -> Option<&ManifestItem> {
        self.with_property("cover-image").next()
    }

    /// EPUB3 navigation document.
    pub fn nav(&self) -> Option<&ManifestItem> {
        self.with_property("nav").next()
    }

    /// NCX document, preferring the spine's `toc` id.
    pub fn ncx(&self, toc_id: Option<&str>) -> Option<&ManifestItem> {
        toc_id
            .and_then(|id| self.get(id))
            .or_else(|| self.by_media_type(NCX_MEDIA_TYPE).next())
    }

    /// The item followed by its `fallback` chain.
    ///
    /// Stops at a missing id or the first repeated id.
    pub fn fallback_chain(&self, id: &str) -> Vec<&ManifestItem> {
        let mut chain: Vec<&ManifestItem> = Vec::new();
        let mut next = self.get(id);
        while let Some(item) = next {
            if chain.iter().any(|seen| seen.id == item.id) {
                break;
            }
            chain.push(item);
            next = item.fallback.as_deref().and_then(|fb| self.get(fb));
        }
        chain
    }

    /// Whether following `fallback` from `id` revisits an item.
    pub fn has_fallback_cycle(&self, id: &str) -> bool {
        let chain = self.fallback_chain(id);
        chain
            .last()
            .and_then(|last| last.fallback.as_deref())
            .is_some_and(|fb| chain.iter().any(|item| item.id == fb))
    }

    /// Manifest ids that occur more than once.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut dupes: Vec<&str> = Vec::new();
        for (i, item) in self.items.iter().enumerate() {
            if item.id.is_empty() || dupes.contains(&item.id.as_str()) {
                continue;
            }
            if self.items[i + 1..].iter().any(|other| other.id == item.id) {
                dupes.push(&item.id);
            }
        }
        dupes
    }
}

/// Parse the `<manifest>` of the package document at `package_path`.
///
/// Items keep whatever attributes they have; incomplete items are retained
/// with empty fields so validation can report them.
pub fn parse_manifest(content: &[u8], package_path: &str) -> Result<Manifest, ParseError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut in_manifest = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match xml::start_name(&e).as_str() {
                "manifest" => in_manifest = true,
                "item" if in_manifest => items.extend(parse_item(&xml::attributes(&e), package_path)),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_manifest && xml::start_name(&e) == "item" {
                    items.extend(parse_item(&xml::attributes(&e), package_path));
                }
            }
            Ok(Event::End(e)) => {
                if xml::end_name(&e) == "manifest" {
                    in_manifest = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml::parse_failure("", content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(Manifest { items })
}

fn parse_item(attrs: &[(String, String)], package_path: &str) -> Option<ManifestItem> {
    let id = xml::attr(attrs, "id").unwrap_or("").trim().to_string();
    let raw_href = xml::attr(attrs, "href").unwrap_or("").trim().to_string();
    if id.is_empty() && raw_href.is_empty() {
        return None;
    }
    let href = if raw_href.is_empty() {
        String::new()
    } else {
        resolve_href(package_path, &raw_href)
    };
    Some(ManifestItem {
        id,
        href,
        raw_href,
        media_type: xml::attr(attrs, "media-type").unwrap_or("").trim().to_string(),
        properties: xml::attr(attrs, "properties")
            .map(|p| p.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        fallback: xml::attr(attrs, "fallback")
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string),
        media_overlay: xml::attr(attrs, "media-overlay")
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string),
    })
}
