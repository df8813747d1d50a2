//! Package metadata parser using quick-xml SAX-style parsing
//!
//! Extracts the `<package>` attributes, the Dublin Core `<metadata>` block
//! (EPUB2 `opf:` attributes and EPUB3 `refines` metas alike) and the legacy
//! EPUB2 `<guide>`. Missing elements degrade to empty values; only malformed
//! XML is an error.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ParseError;
use crate::xml;

/// Package specification version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EpubVersion {
    /// EPUB 2.0.x
    V2_0,
    /// EPUB 3.0 / 3.0.1
    V3_0,
    /// EPUB 3.1
    V3_1,
    /// EPUB 3.2
    V3_2,
    /// EPUB 3.3
    #[default]
    V3_3,
}

impl EpubVersion {
    /// Latest version this crate knows about.
    pub const LATEST: EpubVersion = EpubVersion::V3_3;

    /// Parse a `<package version>` value.
    ///
    /// Known values map exactly. Anything else starting with `3` becomes the
    /// latest 3.x, anything starting with `2` becomes 2.0, and everything
    /// else (empty, garbage) becomes [`EpubVersion::LATEST`].
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "3.0" | "3.0.1" => EpubVersion::V3_0,
            "3.1" => EpubVersion::V3_1,
            "3.2" => EpubVersion::V3_2,
            "3.3" => EpubVersion::V3_3,
            v if v.starts_with('3') => EpubVersion::V3_3,
            v if v.starts_with('2') => EpubVersion::V2_0,
            _ => EpubVersion::LATEST,
        }
    }

    /// Whether this is an EPUB 3.x package.
    pub fn is_epub3(self) -> bool {
        self >= EpubVersion::V3_0
    }
}

impl fmt::Display for EpubVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EpubVersion::V2_0 => "2.0",
            EpubVersion::V3_0 => "3.0",
            EpubVersion::V3_1 => "3.1",
            EpubVersion::V3_2 => "3.2",
            EpubVersion::V3_3 => "3.3",
        };
        f.write_str(s)
    }
}

/// A `dc:title`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Title {
    /// Title text, whitespace-normalized.
    pub value: String,
    /// Element `id`, target of EPUB3 refinements.
    pub id: Option<String>,
    /// `main`, `subtitle`, `collection`, ... from `title-type` or `type`.
    pub title_type: Option<String>,
}

/// A `dc:creator` or `dc:contributor`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Creator {
    /// Display name.
    pub name: String,
    /// Sort form (`opf:file-as` or `file-as` refinement).
    pub file_as: Option<String>,
    /// MARC relator code (`opf:role` or `role` refinement), e.g. `aut`.
    pub role: Option<String>,
    /// Element `id`.
    pub id: Option<String>,
}

impl Creator {
    /// Authors carry role `aut` or no role at all.
    pub fn is_author(&self) -> bool {
        match &self.role {
            None => true,
            Some(role) => role.trim().eq_ignore_ascii_case("aut"),
        }
    }
}

/// A `dc:identifier`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identifier {
    /// Identifier text (ISBN, UUID, URN, ...).
    pub value: String,
    /// Element `id`.
    pub id: Option<String>,
    /// `opf:scheme` or `identifier-type` refinement.
    pub scheme: Option<String>,
}

/// A `dc:date`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DateEntry {
    /// Date text as written.
    pub value: String,
    /// EPUB2 `opf:event` (`publication`, `modification`, ...).
    pub event: Option<String>,
}

/// A `<meta>` element in either generation's form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaEntry {
    /// EPUB3 `property`, or EPUB2 `name`.
    pub property: String,
    /// Element text (EPUB3) or `content` attribute (EPUB2).
    pub value: String,
    /// `refines` target id without the leading `#`.
    pub refines: Option<String>,
    /// Element `id`.
    pub id: Option<String>,
    /// `scheme` attribute.
    pub scheme: Option<String>,
}

/// A reference from the EPUB 2.0 `<guide>` element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuideRef {
    /// Reference type (e.g. "cover", "toc", "text")
    pub guide_type: String,
    /// Display title
    pub title: Option<String>,
    /// Href as written, relative to the package document
    pub href: String,
}

/// Metadata extracted from the package document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Detected package version.
    pub version: EpubVersion,
    /// Raw `<package version>` value, if present.
    pub version_attr: Option<String>,
    /// `<package unique-identifier>` (an identifier element id).
    pub unique_identifier: Option<String>,
    /// All identifiers in document order.
    pub identifiers: Vec<Identifier>,
    /// All titles in document order.
    pub titles: Vec<Title>,
    /// Language tags in document order.
    pub languages: Vec<String>,
    /// `dc:creator` entries.
    pub creators: Vec<Creator>,
    /// `dc:contributor` entries.
    pub contributors: Vec<Creator>,
    /// `dc:publisher`
    pub publisher: Option<String>,
    /// `dc:description`
    pub description: Option<String>,
    /// `dc:subject` entries.
    pub subjects: Vec<String>,
    /// `dc:date` entries.
    pub dates: Vec<DateEntry>,
    /// `dc:rights`
    pub rights: Option<String>,
    /// `dcterms:modified` (required for EPUB3).
    pub modified: Option<String>,
    /// Manifest id named by EPUB2 `<meta name="cover" content="...">`.
    pub cover_id: Option<String>,
    /// Every `<meta>` element, refining or not.
    pub metas: Vec<MetaEntry>,
    /// EPUB2 guide references.
    pub guide: Vec<GuideRef>,
}

impl Metadata {
    /// Title tagged `main`, else the first title.
    pub fn primary_title(&self) -> Option<&Title> {
        self.titles
            .iter()
            .find(|t| t.title_type.as_deref() == Some("main"))
            .or_else(|| self.titles.first())
    }

    /// Primary title text, or empty.
    pub fn title(&self) -> &str {
        self.primary_title().map(|t| t.value.as_str()).unwrap_or("")
    }

    /// All creators that count as authors, in document order.
    pub fn authors(&self) -> Vec<&Creator> {
        self.creators.iter().filter(|c| c.is_author()).collect()
    }

    /// First creator that counts as an author.
    pub fn primary_author(&self) -> Option<&Creator> {
        self.creators.iter().find(|c| c.is_author())
    }

    /// Primary author name, or empty.
    pub fn author(&self) -> &str {
        self.primary_author().map(|c| c.name.as_str()).unwrap_or("")
    }

    /// First language tag, or empty.
    pub fn language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("")
    }

    /// The identifier named by `unique-identifier`, else the first one.
    pub fn identifier(&self) -> Option<&str> {
        let unique = self.unique_identifier.as_deref().and_then(|uid| {
            self.identifiers
                .iter()
                .find(|i| i.id.as_deref() == Some(uid))
        });
        unique
            .or_else(|| self.identifiers.first())
            .map(|i| i.value.as_str())
    }

    /// Value of the first non-refining meta with this property/name.
    pub fn meta(&self, property: &str) -> Option<&str> {
        self.metas
            .iter()
            .find(|m| m.refines.is_none() && m.property == property)
            .map(|m| m.value.as_str())
    }

    /// Metas refining the element with `id`.
    pub fn refinements<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a MetaEntry> + 'a {
        self.metas
            .iter()
            .filter(move |m| m.refines.as_deref() == Some(id))
    }

    /// Whether the package declares EPUB 3.x.
    pub fn is_epub3(&self) -> bool {
        self.version.is_epub3()
    }

    fn apply_refinements(&mut self) {
        for meta in &self.metas {
            let Some(target) = meta.refines.as_deref() else {
                continue;
            };
            let value = meta.value.clone();
            match meta.property.as_str() {
                "title-type" => {
                    for title in self.titles.iter_mut().filter(|t| t.id.as_deref() == Some(target)) {
                        title.title_type = Some(value.clone());
                    }
                }
                "file-as" | "role" => {
                    let is_role = meta.property == "role";
                    for creator in self
                        .creators
                        .iter_mut()
                        .chain(self.contributors.iter_mut())
                        .filter(|c| c.id.as_deref() == Some(target))
                    {
                        if is_role {
                            creator.role = Some(value.clone());
                        } else {
                            creator.file_as = Some(value.clone());
                        }
                    }
                }
                "identifier-type" => {
                    for ident in self
                        .identifiers
                        .iter_mut()
                        .filter(|i| i.id.as_deref() == Some(target))
                    {
                        ident.scheme = Some(value.clone());
                    }
                }
                _ => {}
            }
        }
    }
}

/// Dublin Core element kinds collected from `<metadata>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DcKind {
    Title,
    Creator,
    Contributor,
    Identifier,
    Language,
    Publisher,
    Description,
    Subject,
    Date,
    Rights,
    Meta,
}

impl DcKind {
    fn from_local(name: &str) -> Option<Self> {
        Some(match name {
            "title" => DcKind::Title,
            "creator" => DcKind::Creator,
            "contributor" => DcKind::Contributor,
            "identifier" => DcKind::Identifier,
            "language" => DcKind::Language,
            "publisher" => DcKind::Publisher,
            "description" => DcKind::Description,
            "subject" => DcKind::Subject,
            "date" => DcKind::Date,
            "rights" => DcKind::Rights,
            "meta" => DcKind::Meta,
            _ => return None,
        })
    }
}

struct Pending {
    kind: DcKind,
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
}

/// Parse the metadata, package attributes and guide of a package document.
pub fn parse_metadata(content: &[u8]) -> Result<Metadata, ParseError> {
    let mut reader = Reader::from_reader(content);

    let mut buf = Vec::new();
    let mut metadata = Metadata::default();
    let mut in_metadata = false;
    let mut in_guide = false;
    let mut pending: Option<Pending> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = xml::start_name(&e);
                match name.as_str() {
                    "package" => read_package_attrs(&mut metadata, &xml::attributes(&e)),
                    "metadata" => in_metadata = true,
                    "guide" => in_guide = true,
                    "reference" if in_guide => push_guide_ref(&mut metadata, &xml::attributes(&e)),
                    _ if in_metadata && pending.is_none() => {
                        if let Some(kind) = DcKind::from_local(&name) {
                            pending = Some(Pending {
                                kind,
                                name,
                                attrs: xml::attributes(&e),
                                text: String::new(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = xml::start_name(&e);
                match name.as_str() {
                    "package" => read_package_attrs(&mut metadata, &xml::attributes(&e)),
                    "reference" if in_guide => push_guide_ref(&mut metadata, &xml::attributes(&e)),
                    "meta" if in_metadata => {
                        finish_element(&mut metadata, DcKind::Meta, &xml::attributes(&e), "");
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(p) = pending.as_mut() {
                    xml::push_text(&mut p.text, &e);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(p) = pending.as_mut() {
                    p.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(p) = pending.as_mut() {
                    xml::push_reference(&mut p.text, &e);
                }
            }
            Ok(Event::End(e)) => {
                let name = xml::end_name(&e);
                if pending.as_ref().is_some_and(|p| p.name == name) {
                    if let Some(p) = pending.take() {
                        finish_element(&mut metadata, p.kind, &p.attrs, &p.text);
                    }
                    buf.clear();
                    continue;
                }
                match name.as_str() {
                    "metadata" => in_metadata = false,
                    "guide" => in_guide = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml::parse_failure("", content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }

    metadata.apply_refinements();
    Ok(metadata)
}

fn read_package_attrs(metadata: &mut Metadata, attrs: &[(String, String)]) {
    let version = xml::attr(attrs, "version").map(str::to_string);
    metadata.version = EpubVersion::parse(version.as_deref().unwrap_or(""));
    metadata.version_attr = version;
    metadata.unique_identifier = xml::attr(attrs, "unique-identifier").map(str::to_string);
}

fn push_guide_ref(metadata: &mut Metadata, attrs: &[(String, String)]) {
    if let (Some(guide_type), Some(href)) = (xml::attr(attrs, "type"), xml::attr(attrs, "href")) {
        metadata.guide.push(GuideRef {
            guide_type: guide_type.to_string(),
            title: xml::attr(attrs, "title").map(str::to_string),
            href: href.to_string(),
        });
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn finish_element(metadata: &mut Metadata, kind: DcKind, attrs: &[(String, String)], raw: &str) {
    let text = xml::normalize_whitespace(raw);
    let id = non_empty(xml::attr(attrs, "id"));

    match kind {
        DcKind::Meta => {
            let refines = non_empty(xml::attr(attrs, "refines"))
                .map(|r| r.trim_start_matches('#').to_string());
            let (property, value) = match xml::attr(attrs, "property") {
                Some(property) => (property.trim().to_string(), text),
                None => (
                    xml::attr(attrs, "name").unwrap_or("").trim().to_string(),
                    xml::attr(attrs, "content")
                        .map(xml::normalize_whitespace)
                        .unwrap_or(text),
                ),
            };
            if property.is_empty() {
                return;
            }
            if refines.is_none() {
                match property.as_str() {
                    "cover" if !value.is_empty() => metadata.cover_id = Some(value.clone()),
                    "dcterms:modified" if !value.is_empty() => {
                        metadata.modified = Some(value.clone())
                    }
                    _ => {}
                }
            }
            metadata.metas.push(MetaEntry {
                property,
                value,
                refines,
                id,
                scheme: non_empty(xml::attr(attrs, "scheme")),
            });
        }
        _ if text.is_empty() => {}
        DcKind::Title => metadata.titles.push(Title {
            value: text,
            id,
            title_type: non_empty(xml::attr(attrs, "type")),
        }),
        DcKind::Creator | DcKind::Contributor => {
            let creator = Creator {
                name: text,
                file_as: non_empty(xml::attr(attrs, "file-as")),
                role: non_empty(xml::attr(attrs, "role")),
                id,
            };
            if kind == DcKind::Creator {
                metadata.creators.push(creator);
            } else {
                metadata.contributors.push(creator);
            }
        }
        DcKind::Identifier => metadata.identifiers.push(Identifier {
            value: text,
            id,
            scheme: non_empty(xml::attr(attrs, "scheme")),
        }),
        DcKind::Language => metadata.languages.push(text),
        DcKind::Publisher => metadata.publisher = Some(text),
        DcKind::Description => metadata.description = Some(text),
        DcKind::Subject => metadata.subjects.push(text),
        DcKind::Date => metadata.dates.push(DateEntry {
            value: text,
            event: non_empty(xml::attr(attrs, "event")),
        }),
        DcKind::Rights => metadata.rights = Some(text),
    }
}
