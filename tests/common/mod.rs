//! Shared fixture builders for integration tests and benches.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A valid 1x1 RGBA PNG.
pub const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Smallest JPEG header `image::guess_format` recognizes.
pub const JPEG_STUB: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

/// Archive fixture written with `zip::ZipWriter`, entries in call order.
pub struct ZipBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    pub fn stored(self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.entry(name, data.as_ref(), CompressionMethod::Stored)
    }

    pub fn deflated(self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.entry(name, data.as_ref(), CompressionMethod::Deflated)
    }

    fn entry(mut self, name: &str, data: &[u8], method: CompressionMethod) -> Self {
        let options = SimpleFileOptions::default().compression_method(method);
        self.writer.start_file(name, options).unwrap();
        self.writer.write_all(data).unwrap();
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.finish().unwrap().into_inner()
    }
}

/// Package-document-level EPUB builder. Paths are relative to `OEBPS/`.
pub struct BookBuilder {
    version: &'static str,
    metadata: String,
    manifest: Vec<String>,
    spine: Vec<String>,
    spine_attrs: String,
    guide: String,
    files: Vec<(String, Vec<u8>)>,
}

impl BookBuilder {
    pub fn epub3() -> Self {
        Self::with_version("3.0")
    }

    pub fn epub2() -> Self {
        Self::with_version("2.0")
    }

    fn with_version(version: &'static str) -> Self {
        Self {
            version,
            metadata: String::new(),
            manifest: Vec::new(),
            spine: Vec::new(),
            spine_attrs: String::new(),
            guide: String::new(),
            files: Vec::new(),
        }
    }

    /// Title, author, language and identifier in one go.
    pub fn basic_metadata(self, title: &str, author: &str) -> Self {
        let modified = if self.version.starts_with('3') {
            r#"<meta property="dcterms:modified">2024-01-01T00:00:00Z</meta>"#
        } else {
            ""
        };
        let xml = format!(
            r#"<dc:identifier id="bookid">urn:uuid:0000</dc:identifier><dc:title>{}</dc:title><dc:creator>{}</dc:creator><dc:language>en</dc:language>{}"#,
            title, author, modified
        );
        self.metadata(&xml)
    }

    pub fn metadata(mut self, xml: &str) -> Self {
        self.metadata.push_str(xml);
        self
    }

    pub fn item(mut self, id: &str, href: &str, media_type: &str, extra: &str) -> Self {
        self.manifest.push(format!(
            r#"<item id="{}" href="{}" media-type="{}" {}/>"#,
            id, href, media_type, extra
        ));
        self
    }

    pub fn itemref(mut self, xml: &str) -> Self {
        self.spine.push(xml.to_string());
        self
    }

    pub fn spine_attrs(mut self, attrs: &str) -> Self {
        self.spine_attrs = attrs.to_string();
        self
    }

    pub fn guide(mut self, xml: &str) -> Self {
        self.guide = format!("<guide>{}</guide>", xml);
        self
    }

    /// XHTML chapter added to manifest, spine and archive.
    pub fn chapter(self, id: &str, href: &str, body: &str) -> Self {
        let xhtml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><html xmlns="http://www.w3.org/1999/xhtml"><head><title>{id}</title></head><body>{body}</body></html>"#
        );
        self.item(id, href, "application/xhtml+xml", "")
            .itemref(&format!(r#"<itemref idref="{}"/>"#, id))
            .file(href, xhtml)
    }

    pub fn file(mut self, href: &str, data: impl AsRef<[u8]>) -> Self {
        self.files
            .push((format!("OEBPS/{}", href), data.as_ref().to_vec()));
        self
    }

    pub fn opf(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" xmlns:opf="http://www.idpf.org/2007/opf" version="{}" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{}</metadata>
  <manifest>{}</manifest>
  <spine {}>{}</spine>
  {}
</package>"#,
            self.version,
            self.metadata,
            self.manifest.join("\n"),
            self.spine_attrs,
            self.spine.join("\n"),
            self.guide
        )
    }

    pub fn build(self) -> Vec<u8> {
        let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;
        let mut zip = ZipBuilder::new()
            .stored("mimetype", "application/epub+zip")
            .deflated("META-INF/container.xml", container)
            .deflated("OEBPS/content.opf", self.opf());
        for (name, data) in &self.files {
            zip = zip.deflated(name, data);
        }
        zip.finish()
    }
}

/// Nav document listing `(href, label)` pairs.
pub fn nav_document(entries: &[(&str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(href, label)| format!(r#"<li><a href="{}">{}</a></li>"#, href, label))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><body><nav epub:type="toc"><ol>{}</ol></nav></body></html>"#,
        items
    )
}

/// SMIL document with one `<par>` per `(fragment, begin, end)`.
pub fn smil_document(text_href: &str, audio: &str, pars: &[(&str, &str, &str)]) -> String {
    let body: String = pars
        .iter()
        .map(|(fragment, begin, end)| {
            format!(
                r#"<par><text src="{}#{}"/><audio src="{}" clipBegin="{}" clipEnd="{}"/></par>"#,
                text_href, fragment, audio, begin, end
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><smil xmlns="http://www.w3.org/ns/SMIL" version="3.0"><body><seq>{}</seq></body></smil>"#,
        body
    )
}

/// Two-chapter EPUB3 with nav, `cover-image` PNG and a two-par overlay.
pub fn two_chapter_book() -> Vec<u8> {
    BookBuilder::epub3()
        .basic_metadata("The Two Chapters", "Ada Writer")
        .item("nav", "nav.xhtml", "application/xhtml+xml", r#"properties="nav""#)
        .file("nav.xhtml", nav_document(&[("ch1.xhtml", "One"), ("ch2.xhtml", "Two")]))
        .item("cover", "img/cover.png", "image/png", r#"properties="cover-image""#)
        .file("img/cover.png", PNG_1X1)
        .item("ov1", "ch1.smil", "application/smil+xml", "")
        .file(
            "ch1.smil",
            smil_document("ch1.xhtml", "audio/ch1.mp3", &[("p1", "0s", "5s"), ("p2", "5s", "10s")]),
        )
        .item("aud", "audio/ch1.mp3", "audio/mpeg", "")
        .file("audio/ch1.mp3", b"ID3\x03\x00")
        .item("ch1", "ch1.xhtml", "application/xhtml+xml", r#"media-overlay="ov1""#)
        .itemref(r#"<itemref idref="ch1"/>"#)
        .file(
            "ch1.xhtml",
            r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><p id="p1">One.</p><p id="p2">Two.</p></body></html>"#,
        )
        .chapter("ch2", "ch2.xhtml", "<h1>Second</h1>")
        .build()
}
