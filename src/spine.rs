//! EPUB spine parser
//!
//! The spine defines the reading order of content documents. It is parsed
//! once with the package document and never mutated afterwards; reading
//! position lives with the caller.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ParseError;
use crate::rendition::ItemRendition;
use crate::xml;

/// `page-progression-direction` on `<spine>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageProgression {
    /// Left to right.
    Ltr,
    /// Right to left (manga, Arabic, Hebrew).
    Rtl,
    /// Reading system default.
    #[default]
    Default,
}

/// A single item in the EPUB spine (chapter reference)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest item this spine entry references
    pub idref: String,
    /// Optional spine-level ID
    pub id: Option<String>,
    /// Whether this item is part of the linear reading order
    pub linear: bool,
    /// Itemref `properties`, split
    pub properties: Vec<String>,
}

impl SpineItem {
    /// Rendition overrides declared on this itemref.
    pub fn rendition(&self) -> ItemRendition {
        ItemRendition::from_properties(&self.properties)
    }
}

/// Spine represents the reading order of an EPUB
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Spine {
    /// Ordered spine entries
    items: Vec<SpineItem>,
    /// Optional TOC item id (EPUB 2.0 NCX reference)
    toc_id: Option<String>,
    /// Declared page progression
    page_progression: PageProgression,
}

impl Spine {
    /// Create spine from a list of chapter IDs
    pub fn from_idrefs<S: Into<String>>(idrefs: impl IntoIterator<Item = S>) -> Self {
        let items = idrefs
            .into_iter()
            .map(|idref| SpineItem {
                idref: idref.into(),
                id: None,
                linear: true,
                properties: Vec::new(),
            })
            .collect();

        Self {
            items,
            ..Self::default()
        }
    }

    /// Get a reference to the ordered spine entries
    pub fn items(&self) -> &[SpineItem] {
        &self.items
    }

    /// NCX manifest id from `<spine toc>`.
    pub fn toc_id(&self) -> Option<&str> {
        self.toc_id.as_deref()
    }

    /// Declared `page-progression-direction`.
    pub fn page_progression(&self) -> PageProgression {
        self.page_progression
    }

    /// Number of spine entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the spine has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&SpineItem> {
        self.items.get(index)
    }

    /// Spine position of the first itemref pointing at `idref`
    pub fn position_of(&self, idref: &str) -> Option<usize> {
        self.items.iter().position(|item| item.idref == idref)
    }

    /// Entries that are part of the linear reading order, with positions
    pub fn linear_items(&self) -> impl Iterator<Item = (usize, &SpineItem)> {
        self.items.iter().enumerate().filter(|(_, item)| item.linear)
    }

    /// All idrefs in reading order
    pub fn chapter_ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.idref.as_str()).collect()
    }
}

/// Parse spine from package document content
pub fn parse_spine(content: &[u8]) -> Result<Spine, ParseError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut spine = Spine::default();
    let mut in_spine = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = xml::start_name(&e);
                if name == "spine" {
                    // `<spine/>` never gets an End event; itemrefs can't follow it anyway.
                    in_spine = true;
                    let attrs = xml::attributes(&e);
                    spine.toc_id = xml::attr(&attrs, "toc")
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string);
                    spine.page_progression =
                        match xml::attr(&attrs, "page-progression-direction").map(str::trim) {
                            Some("ltr") => PageProgression::Ltr,
                            Some("rtl") => PageProgression::Rtl,
                            _ => PageProgression::Default,
                        };
                } else if in_spine && name == "itemref" {
                    if let Some(item) = parse_spine_item(&xml::attributes(&e)) {
                        spine.items.push(item);
                    }
                }
            }
            Ok(Event::End(e)) => {
                if xml::end_name(&e) == "spine" {
                    in_spine = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml::parse_failure("", content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(spine)
}

fn parse_spine_item(attrs: &[(String, String)]) -> Option<SpineItem> {
    let idref = xml::attr(attrs, "idref")?.trim();
    if idref.is_empty() {
        return None;
    }
    Some(SpineItem {
        idref: idref.to_string(),
        id: xml::attr(attrs, "id").map(str::to_string),
        linear: xml::attr(attrs, "linear").map(str::trim) != Some("no"),
        properties: xml::attr(attrs, "properties")
            .map(|p| p.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}
