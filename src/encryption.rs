//! `META-INF/encryption.xml` classification.
//!
//! Each `<EncryptedData>` names an algorithm URI and the resource it
//! protects. The URI is classified so callers can tell font obfuscation
//! (which a renderer may undo) from real content encryption (DRM). Nothing
//! here decrypts anything.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ParseError;
use crate::package::resolve_href;
use crate::xml;

/// Archive path of the encryption declaration document.
pub const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";
/// Archive path of the rights document used by some DRM schemes.
pub const RIGHTS_PATH: &str = "META-INF/rights.xml";

/// IDPF font obfuscation algorithm.
pub const IDPF_FONT_OBFUSCATION: &str = "http://www.idpf.org/2008/embedding";
/// Adobe font obfuscation algorithm.
pub const ADOBE_FONT_OBFUSCATION: &str = "http://ns.adobe.com/pdf/enc#RC";
/// XML Encryption AES-256-CBC (used by LCP and most DRM schemes).
pub const XMLENC_AES256_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";

/// What an algorithm URI means for a reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncryptionKind {
    /// IDPF font obfuscation (key derived from the unique identifier).
    IdpfFontObfuscation,
    /// Adobe font obfuscation (key derived from the book UUID).
    AdobeFontObfuscation,
    /// Real encryption: Readium LCP or generic XML Encryption.
    Encrypted,
    /// Some other scheme that calls itself obfuscation.
    OtherObfuscation,
    /// Unrecognized algorithm.
    Unknown,
}

impl EncryptionKind {
    /// Font obfuscation a reader can undo without a license.
    pub fn is_font_obfuscation(self) -> bool {
        matches!(
            self,
            EncryptionKind::IdpfFontObfuscation | EncryptionKind::AdobeFontObfuscation
        )
    }
}

/// Classify an `EncryptionMethod/@Algorithm` URI.
pub fn classify_algorithm(uri: &str) -> EncryptionKind {
    let uri = uri.trim();
    if uri == IDPF_FONT_OBFUSCATION {
        return EncryptionKind::IdpfFontObfuscation;
    }
    if uri == ADOBE_FONT_OBFUSCATION {
        return EncryptionKind::AdobeFontObfuscation;
    }
    let lower = uri.to_ascii_lowercase();
    if uri == XMLENC_AES256_CBC || lower.contains("lcp") || lower.contains("readium.org") {
        EncryptionKind::Encrypted
    } else if lower.contains("obfuscation") {
        EncryptionKind::OtherObfuscation
    } else {
        EncryptionKind::Unknown
    }
}

/// One protected resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// Archive path of the protected resource.
    pub path: String,
    /// Algorithm URI as declared.
    pub algorithm: String,
    /// Classification of `algorithm`.
    pub kind: EncryptionKind,
}

/// Everything `encryption.xml` declares, plus whether `rights.xml` exists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Encryption {
    /// Protected resources in document order.
    pub resources: Vec<EncryptionInfo>,
    /// `META-INF/rights.xml` is present.
    pub has_rights_xml: bool,
}

impl Encryption {
    /// No resource is declared protected.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Declaration for an archive path.
    pub fn get(&self, path: &str) -> Option<&EncryptionInfo> {
        self.resources.iter().find(|r| r.path == path)
    }

    /// The resource is an obfuscated font.
    pub fn is_obfuscated_font(&self, path: &str) -> bool {
        self.get(path).is_some_and(|r| r.kind.is_font_obfuscation())
    }

    /// Some resource is encrypted with something other than font obfuscation.
    pub fn has_drm(&self) -> bool {
        self.resources
            .iter()
            .any(|r| r.kind == EncryptionKind::Encrypted)
    }

    /// Resources with a given classification.
    pub fn with_kind(&self, kind: EncryptionKind) -> impl Iterator<Item = &EncryptionInfo> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }
}

/// Parse `META-INF/encryption.xml`.
///
/// `CipherReference/@URI` values are resolved against the archive root.
/// Entries without an algorithm or a reference are skipped.
pub fn parse_encryption_xml(content: &[u8]) -> Result<Encryption, ParseError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut encryption = Encryption::default();
    let mut in_data = false;
    let mut algorithm: Option<String> = None;
    let mut reference: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let attrs = xml::attributes(&e);
                match xml::start_name(&e).as_str() {
                    "EncryptedData" => {
                        in_data = true;
                        algorithm = None;
                        reference = None;
                    }
                    // KeyInfo can carry its own EncryptionMethod; the first one wins.
                    "EncryptionMethod" if in_data && algorithm.is_none() => {
                        algorithm = xml::attr(&attrs, "Algorithm").map(str::to_string);
                    }
                    "CipherReference" if in_data => {
                        reference = xml::attr(&attrs, "URI").map(str::to_string);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if xml::end_name(&e) == "EncryptedData" {
                    in_data = false;
                    if let (Some(algorithm), Some(uri)) = (algorithm.take(), reference.take()) {
                        encryption.resources.push(EncryptionInfo {
                            path: resolve_href("", &uri),
                            kind: classify_algorithm(&algorithm),
                            algorithm,
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml::parse_failure(ENCRYPTION_PATH, content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(encryption)
}
