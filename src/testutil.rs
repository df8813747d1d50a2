//! In-memory fixtures for unit tests.

use std::io::{Cursor, Write};

use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipWriter};

/// A valid 1x1 RGBA PNG.
pub(crate) const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Archive fixture assembled with `zip::ZipWriter`, entries in call order.
pub(crate) struct ZipBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    pub(crate) fn stored(self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.entry(name, data.as_ref(), CompressionMethod::Stored)
    }

    pub(crate) fn deflated(self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.entry(name, data.as_ref(), CompressionMethod::Deflated)
    }

    fn entry(mut self, name: &str, data: &[u8], method: CompressionMethod) -> Self {
        let options = SimpleFileOptions::default().compression_method(method);
        self.writer.start_file(name, options).unwrap();
        self.writer.write_all(data).unwrap();
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.writer.finish().unwrap().into_inner()
    }
}

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const NAV_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="toc"><ol>
    <li><a href="ch1.xhtml">One</a></li>
    <li><a href="ch2.xhtml">Two</a></li>
  </ol></nav>
</body>
</html>"#;

const CH1_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><body>
<h1 id="start">Chapter One</h1>
<p id="p1">First sentence.</p>
<p id="p2">Second sentence.</p>
</body></html>"#;

const CH2_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><body>
<h1>Chapter Two</h1>
</body></html>"#;

const CH1_SMIL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<smil xmlns="http://www.w3.org/ns/SMIL" xmlns:epub="http://www.idpf.org/2007/ops" version="3.0">
  <body>
    <seq epub:textref="ch1.xhtml">
      <par id="s1"><text src="ch1.xhtml#p1"/><audio src="audio/ch1.mp3" clipBegin="0s" clipEnd="5s"/></par>
      <par id="s2"><text src="ch1.xhtml#p2"/><audio src="audio/ch1.mp3" clipBegin="5s" clipEnd="10s"/></par>
    </seq>
  </body>
</smil>"#;

/// Two-chapter EPUB3 with a nav document, a `cover-image` PNG and a
/// two-sync-point overlay on the first chapter.
pub(crate) struct EpubFixture {
    mimetype: String,
    compress_mimetype: bool,
    extra_metadata: String,
    extra_spine: String,
    raw_opf: Option<String>,
    files: Vec<(String, String)>,
}

impl EpubFixture {
    pub(crate) fn new() -> Self {
        Self {
            mimetype: crate::zip::EPUB_MIMETYPE.to_string(),
            compress_mimetype: false,
            extra_metadata: String::new(),
            extra_spine: String::new(),
            raw_opf: None,
            files: Vec::new(),
        }
    }

    pub(crate) fn mimetype(mut self, mimetype: &str) -> Self {
        self.mimetype = mimetype.to_string();
        self
    }

    pub(crate) fn compress_mimetype(mut self) -> Self {
        self.compress_mimetype = true;
        self
    }

    pub(crate) fn extra_metadata(mut self, xml: &str) -> Self {
        self.extra_metadata.push_str(xml);
        self
    }

    pub(crate) fn extra_spine(mut self, xml: &str) -> Self {
        self.extra_spine.push_str(xml);
        self
    }

    /// Replace the whole package document.
    pub(crate) fn raw_opf(mut self, opf: &str) -> Self {
        self.raw_opf = Some(opf.to_string());
        self
    }

    pub(crate) fn file(mut self, name: &str, content: &str) -> Self {
        self.files.push((name.to_string(), content.to_string()));
        self
    }

    fn opf(&self) -> String {
        if let Some(raw) = &self.raw_opf {
            return raw.clone();
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">urn:uuid:12345678-1234-1234-1234-123456789abc</dc:identifier>
    <dc:title>Sample Book</dc:title>
    <dc:creator>Jane Doe</dc:creator>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2024-01-01T00:00:00Z</meta>
    {}
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml" media-overlay="ch1-overlay"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch1-overlay" href="ch1.smil" media-type="application/smil+xml"/>
    <item id="cover" href="images/cover.png" media-type="image/png" properties="cover-image"/>
    <item id="audio" href="audio/ch1.mp3" media-type="audio/mpeg"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
    {}
  </spine>
</package>"#,
            self.extra_metadata, self.extra_spine
        )
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let builder = ZipBuilder::new();
        let builder = if self.compress_mimetype {
            builder.deflated("mimetype", &self.mimetype)
        } else {
            builder.stored("mimetype", &self.mimetype)
        };
        let mut builder = builder
            .deflated("META-INF/container.xml", CONTAINER_XML)
            .deflated("OEBPS/content.opf", self.opf())
            .deflated("OEBPS/nav.xhtml", NAV_XHTML)
            .deflated("OEBPS/ch1.xhtml", CH1_XHTML)
            .deflated("OEBPS/ch2.xhtml", CH2_XHTML)
            .deflated("OEBPS/ch1.smil", CH1_SMIL)
            .stored("OEBPS/images/cover.png", PNG_1X1)
            .stored("OEBPS/audio/ch1.mp3", b"ID3\x03\x00\x00\x00\x00\x00\x00");
        for (name, content) in &self.files {
            builder = builder.deflated(name, content);
        }
        builder.finish()
    }
}

pub(crate) fn sample_epub() -> Vec<u8> {
    EpubFixture::new().build()
}
