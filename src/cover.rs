//! Cover image discovery.
//!
//! Strategies run in a fixed order and the first hit wins:
//!
//! 1. manifest item with the `cover-image` property (EPUB3)
//! 2. `<meta name="cover" content="id">` (EPUB2)
//! 3. first image of an XHTML page that looks like a cover page
//! 4. first image of the first spine document
//! 5. any manifest image whose file name or id mentions "cover"
//!
//! A strategy whose resource cannot be read yields nothing and the chain
//! moves on; discovery as a whole never fails.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::manifest::ManifestItem;
use crate::package::{resolve_href, Package};
use crate::xml;

/// Which discovery strategy produced a cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoverStrategy {
    /// Manifest `cover-image` property.
    ManifestProperty,
    /// EPUB2 `<meta name="cover">`.
    MetaCover,
    /// Cover-like XHTML page (guide reference, id or href).
    CoverPage,
    /// First image in the first spine document.
    FirstSpineImage,
    /// Image file name or id containing "cover".
    FilenameHeuristic,
}

/// A discovered cover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverImage {
    /// Archive path of the image.
    pub href: String,
    /// Media type (manifest value, else guessed from the extension).
    pub media_type: String,
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Strategy that found it.
    pub strategy: CoverStrategy,
}

/// Something resources can be read from.
pub trait ResourceSource {
    /// Read an archive entry by archive-absolute path.
    fn read_resource(&self, path: &str) -> Result<Vec<u8>, EpubError>;
}

type StrategyFn = fn(&Package, &dyn ResourceSource) -> Option<CoverImage>;

/// The discovery chain, in priority order.
pub const STRATEGIES: [(CoverStrategy, StrategyFn); 5] = [
    (CoverStrategy::ManifestProperty, from_manifest_property),
    (CoverStrategy::MetaCover, from_meta_cover),
    (CoverStrategy::CoverPage, from_cover_page),
    (CoverStrategy::FirstSpineImage, from_first_spine_document),
    (CoverStrategy::FilenameHeuristic, from_filename),
];

/// Run the strategy chain and return the first cover found.
pub fn find_cover(package: &Package, source: &dyn ResourceSource) -> Option<CoverImage> {
    STRATEGIES.iter().find_map(|(strategy, run)| {
        let found = run(package, source);
        if let Some(cover) = &found {
            log::debug!("[COVER] {:?} found {}", strategy, cover.href);
        }
        found
    })
}

fn from_manifest_property(package: &Package, source: &dyn ResourceSource) -> Option<CoverImage> {
    let item = package.manifest.cover_image()?;
    load_item(item, source, CoverStrategy::ManifestProperty)
}

fn from_meta_cover(package: &Package, source: &dyn ResourceSource) -> Option<CoverImage> {
    let id = package.metadata.cover_id.as_deref()?;
    // Some books point the meta at a file name instead of an id.
    let item = package
        .manifest
        .get(id)
        .or_else(|| package.manifest.by_href(&package.resolve(id)))?;
    if item.is_xhtml() {
        return first_image_in_document(package, source, &item.href, CoverStrategy::MetaCover);
    }
    load_item(item, source, CoverStrategy::MetaCover)
}

fn from_cover_page(package: &Package, source: &dyn ResourceSource) -> Option<CoverImage> {
    let mut pages: Vec<String> = package
        .metadata
        .guide
        .iter()
        .filter(|r| r.guide_type.eq_ignore_ascii_case("cover"))
        .map(|r| package.resolve(&r.href))
        .collect();
    for item in package.manifest.iter().filter(|i| i.is_xhtml()) {
        if mentions_cover(&item.id) || mentions_cover(&item.href) {
            if !pages.contains(&item.href) {
                pages.push(item.href.clone());
            }
        }
    }
    pages
        .iter()
        .find_map(|page| first_image_in_document(package, source, page, CoverStrategy::CoverPage))
}

fn from_first_spine_document(package: &Package, source: &dyn ResourceSource) -> Option<CoverImage> {
    let first = package.spine.items().first()?;
    let item = package.manifest.get(&first.idref)?;
    first_image_in_document(package, source, &item.href, CoverStrategy::FirstSpineImage)
}

fn from_filename(package: &Package, source: &dyn ResourceSource) -> Option<CoverImage> {
    package
        .manifest
        .images()
        .filter(|item| mentions_cover(item.file_name()) || mentions_cover(&item.id))
        .find_map(|item| load_item(item, source, CoverStrategy::FilenameHeuristic))
}

fn mentions_cover(text: &str) -> bool {
    text.to_ascii_lowercase().contains("cover")
}

fn load_item(
    item: &ManifestItem,
    source: &dyn ResourceSource,
    strategy: CoverStrategy,
) -> Option<CoverImage> {
    load_path(&item.href, Some(&item.media_type), source, strategy)
}

fn load_path(
    path: &str,
    media_type: Option<&str>,
    source: &dyn ResourceSource,
    strategy: CoverStrategy,
) -> Option<CoverImage> {
    match source.read_resource(path) {
        Ok(data) if !data.is_empty() => Some(CoverImage {
            href: path.to_string(),
            media_type: media_type
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| guess_media_type(path).to_string()),
            data,
            strategy,
        }),
        Ok(_) => {
            log::warn!("[COVER] {:?}: {} is empty", strategy, path);
            None
        }
        Err(err) => {
            log::warn!("[COVER] {:?}: could not read {}: {}", strategy, path, err);
            None
        }
    }
}

fn first_image_in_document(
    package: &Package,
    source: &dyn ResourceSource,
    doc_path: &str,
    strategy: CoverStrategy,
) -> Option<CoverImage> {
    let content = match source.read_resource(doc_path) {
        Ok(content) => content,
        Err(err) => {
            log::warn!("[COVER] {:?}: could not read {}: {}", strategy, doc_path, err);
            return None;
        }
    };
    let src = first_image_src(&content)?;
    let path = resolve_href(doc_path, &src);
    let media_type = package
        .manifest
        .by_href(&path)
        .map(|item| item.media_type.as_str());
    load_path(&path, media_type, source, strategy)
}

/// `src` of the first `<img>`, or `href` of the first SVG `<image>`.
///
/// Parsing is lenient: tag soup ends the scan rather than failing it.
pub fn first_image_src(content: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().check_end_names = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let key = match xml::start_name(&e).as_str() {
                    "img" => Some("src"),
                    "image" => Some("href"),
                    _ => None,
                };
                if let Some(key) = key {
                    let attrs = xml::attributes(&e);
                    if let Some(src) = xml::attr(&attrs, key).map(str::trim).filter(|s| !s.is_empty()) {
                        return Some(src.to_string());
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Media type from a file extension.
pub fn guess_media_type(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::parse_package;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, Vec<u8>>);

    impl ResourceSource for MapSource {
        fn read_resource(&self, path: &str) -> Result<Vec<u8>, EpubError> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| EpubError::ResourceNotFound {
                    path: path.to_string(),
                })
        }
    }

    fn source(files: &[(&str, &[u8])]) -> MapSource {
        MapSource(
            files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        )
    }

    fn package(manifest: &str, metadata: &str, spine: &str, guide: &str) -> Package {
        let opf = format!(
            r#"<package version="3.0"><metadata>{}</metadata><manifest>{}</manifest><spine>{}</spine>{}</package>"#,
            metadata, manifest, spine, guide
        );
        parse_package("OEBPS/content.opf", opf.as_bytes()).unwrap()
    }

    #[test]
    fn test_manifest_property_beats_filename() {
        let pkg = package(
            r#"<item id="art" href="art.png" media-type="image/png" properties="cover-image"/>
               <item id="c" href="cover.jpg" media-type="image/jpeg"/>"#,
            "",
            "",
            "",
        );
        let src = source(&[("OEBPS/art.png", b"PNG"), ("OEBPS/cover.jpg", b"JPG")]);
        let cover = find_cover(&pkg, &src).unwrap();
        assert_eq!(cover.strategy, CoverStrategy::ManifestProperty);
        assert_eq!(cover.data, b"PNG");
        assert_eq!(cover.media_type, "image/png");
    }

    #[test]
    fn test_unreadable_property_falls_through() {
        let pkg = package(
            r#"<item id="art" href="art.png" media-type="image/png" properties="cover-image"/>
               <item id="c" href="cover.jpg" media-type="image/jpeg"/>"#,
            "",
            "",
            "",
        );
        let src = source(&[("OEBPS/cover.jpg", b"JPG")]);
        let cover = find_cover(&pkg, &src).unwrap();
        assert_eq!(cover.strategy, CoverStrategy::FilenameHeuristic);
        assert_eq!(cover.href, "OEBPS/cover.jpg");
    }

    #[test]
    fn test_meta_cover() {
        let pkg = package(
            r#"<item id="img1" href="images/front.jpg" media-type="image/jpeg"/>"#,
            r#"<meta name="cover" content="img1"/>"#,
            "",
            "",
        );
        let src = source(&[("OEBPS/images/front.jpg", b"JPG")]);
        let cover = find_cover(&pkg, &src).unwrap();
        assert_eq!(cover.strategy, CoverStrategy::MetaCover);
    }

    #[test]
    fn test_cover_page_image() {
        let pkg = package(
            r#"<item id="titlepage" href="Text/cover.xhtml" media-type="application/xhtml+xml"/>
               <item id="i" href="Images/front.png" media-type="image/png"/>"#,
            "",
            "",
            "",
        );
        let page = br#"<html><body><div><svg><image xlink:href="../Images/front.png"/></svg></div></body></html>"#;
        let src = source(&[
            ("OEBPS/Text/cover.xhtml", page),
            ("OEBPS/Images/front.png", b"PNG"),
        ]);
        let cover = find_cover(&pkg, &src).unwrap();
        assert_eq!(cover.strategy, CoverStrategy::CoverPage);
        assert_eq!(cover.href, "OEBPS/Images/front.png");
    }

    #[test]
    fn test_first_spine_image() {
        let pkg = package(
            r#"<item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
               <item id="i" href="pic.gif" media-type="image/gif"/>"#,
            "",
            r#"<itemref idref="ch1"/>"#,
            "",
        );
        let page = br#"<html><body><p>Hi<br></p><img src="pic.gif"/></body></html>"#;
        let src = source(&[("OEBPS/ch1.xhtml", page), ("OEBPS/pic.gif", b"GIF")]);
        let cover = find_cover(&pkg, &src).unwrap();
        assert_eq!(cover.strategy, CoverStrategy::FirstSpineImage);
        assert_eq!(cover.media_type, "image/gif");
    }

    #[test]
    fn test_no_cover_is_none() {
        let pkg = package(
            r#"<item id="i" href="figure1.png" media-type="image/png"/>"#,
            "",
            "",
            "",
        );
        assert!(find_cover(&pkg, &source(&[])).is_none());
    }

    #[test]
    fn test_strategy_order_is_fixed() {
        let order: Vec<CoverStrategy> = STRATEGIES.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            order,
            vec![
                CoverStrategy::ManifestProperty,
                CoverStrategy::MetaCover,
                CoverStrategy::CoverPage,
                CoverStrategy::FirstSpineImage,
                CoverStrategy::FilenameHeuristic,
            ]
        );
    }

    #[test]
    fn test_guess_media_type() {
        assert_eq!(guess_media_type("a/B.JPG"), "image/jpeg");
        assert_eq!(guess_media_type("noext"), "application/octet-stream");
    }
}
