//! An opened EPUB: archive plus parsed package.
//!
//! Construction does all the fatal work (archive index, mimetype,
//! `container.xml`, package document) and either yields a fully usable
//! container or an error. Everything after that degrades instead of failing:
//! navigation, encryption, cover and media overlays fall back to empty
//! values and log why.
//!
//! Cover discovery and overlay parsing are computed on first access and
//! cached for the lifetime of the container; concurrent first access is
//! safe because each cell is a [`OnceLock`].

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::cfi::{generate_chapter_cfi, parse_chapter_cfi};
use crate::cover::{find_cover, CoverImage, ResourceSource};
use crate::encryption::{parse_encryption_xml, Encryption, ENCRYPTION_PATH, RIGHTS_PATH};
use crate::error::{EpubError, ZipError};
use crate::manifest::{Manifest, ManifestItem};
use crate::metadata::Metadata;
use crate::navigation::{parse_nav_xhtml, parse_ncx, NavPoint, Navigation};
use crate::package::{parse_container_xml, parse_package, split_fragment, Package, CONTAINER_PATH};
use crate::rendition::RenditionProperties;
use crate::smil::{parse_clock_value, parse_media_overlay, MediaOverlay};
use crate::spine::Spine;
use crate::validate::{validate_archive, ValidationOptions, ValidationReport};
use crate::zip::{MimetypePlacement, StreamingZip, ZipLimits};

/// Validation strictness while opening a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ValidationMode {
    /// Best-effort behavior for partial/quirky EPUBs.
    #[default]
    Lenient,
    /// Fail early for structural inconsistencies.
    Strict,
}

/// Options for opening a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct OpenOptions {
    /// Optional ZIP safety limits used while reading archive entries.
    ///
    /// When `None`, [`ZipLimits::default`] applies.
    pub zip_limits: Option<ZipLimits>,
    /// What counts as fatal while opening.
    pub validation_mode: ValidationMode,
}

/// Builder for opening containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ContainerBuilder {
    options: OpenOptions,
}

impl ContainerBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set explicit ZIP limits.
    pub fn with_zip_limits(mut self, limits: ZipLimits) -> Self {
        self.options.zip_limits = Some(limits);
        self
    }

    /// Enable strict validation mode.
    pub fn strict(mut self) -> Self {
        self.options.validation_mode = ValidationMode::Strict;
        self
    }

    /// Set explicit validation mode.
    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.options.validation_mode = mode;
        self
    }

    /// Open an EPUB from a file path.
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<EpubContainer<File>, EpubError> {
        EpubContainer::open_with_options(path, self.options)
    }

    /// Open an EPUB from an arbitrary reader.
    pub fn from_reader<R: Read + Seek>(self, reader: R) -> Result<EpubContainer<R>, EpubError> {
        EpubContainer::from_reader_with_options(reader, self.options)
    }

    /// Open an EPUB held in memory.
    pub fn from_bytes(self, bytes: Vec<u8>) -> Result<EpubContainer<Cursor<Vec<u8>>>, EpubError> {
        EpubContainer::from_reader_with_options(Cursor::new(bytes), self.options)
    }
}

/// Chapter descriptor in spine order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterRef {
    /// Spine position index.
    pub index: usize,
    /// Spine `idref`.
    pub idref: String,
    /// Archive path of the chapter document.
    pub href: String,
    /// Manifest media type.
    pub media_type: String,
    /// Part of the linear reading order.
    pub linear: bool,
}

/// The book-metadata record handed to reading front ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookSummary {
    /// Primary title (empty when missing).
    pub title: String,
    /// Primary author (empty when missing).
    pub author: String,
    /// Primary language (empty when missing).
    pub language: String,
    /// Discovered cover, if any.
    pub cover: Option<CoverImage>,
    /// Top-level table of contents.
    pub toc: Vec<NavPoint>,
}

/// An opened EPUB archive with its parsed package.
pub struct EpubContainer<R: Read + Seek> {
    archive: Mutex<StreamingZip<R>>,
    package: Package,
    navigation: Option<Navigation>,
    encryption: Encryption,
    rendition: RenditionProperties,
    mimetype: MimetypePlacement,
    /// Cover discovery result, computed once.
    cover: OnceLock<Option<CoverImage>>,
    /// Overlay per spine position, computed once each.
    overlays: Vec<OnceLock<Option<MediaOverlay>>>,
}

impl EpubContainer<File> {
    /// Open an EPUB from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        Self::open_with_options(path, OpenOptions::default())
    }

    /// Open an EPUB from disk with explicit options.
    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: OpenOptions,
    ) -> Result<Self, EpubError> {
        let file = File::open(path).map_err(|e| EpubError::Io(e.to_string()))?;
        Self::from_reader_with_options(file, options)
    }

    /// Create a builder for opening EPUBs.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }
}

impl<R: Read + Seek> EpubContainer<R> {
    /// Open an EPUB from any `Read + Seek` source.
    pub fn from_reader(reader: R) -> Result<Self, EpubError> {
        Self::from_reader_with_options(reader, OpenOptions::default())
    }

    /// Open an EPUB from any `Read + Seek` source with explicit options.
    pub fn from_reader_with_options(reader: R, options: OpenOptions) -> Result<Self, EpubError> {
        let strict = options.validation_mode == ValidationMode::Strict;
        let mut zip = StreamingZip::new_with_limits(reader, options.zip_limits)?;

        let mimetype = zip.validate_mimetype()?;
        if !mimetype.is_conformant() {
            let problem = match (mimetype.first_entry, mimetype.stored) {
                (false, false) => "mimetype is neither the first entry nor stored",
                (false, true) => "mimetype is not the first archive entry",
                _ => "mimetype entry is compressed",
            };
            if strict {
                return Err(EpubError::InvalidEpub(problem.to_string()));
            }
            log::warn!("[OCF] {}", problem);
        }

        let container = read_required(&mut zip, CONTAINER_PATH)?;
        let package_path = parse_container_xml(&container)?;
        let opf = read_required(&mut zip, &package_path)?;
        let package = parse_package(&package_path, &opf)?;

        for item in package.spine.items() {
            if package.manifest.get(&item.idref).is_none() {
                if strict {
                    return Err(EpubError::ManifestItemMissing {
                        idref: item.idref.clone(),
                    });
                }
                log::warn!("[OPF] spine idref '{}' has no manifest item", item.idref);
            }
        }

        let navigation = load_navigation(&mut zip, &package, strict)?;
        let encryption = load_encryption(&mut zip);
        let rendition = RenditionProperties::from_metadata(&package.metadata);
        let overlays = (0..package.spine.len()).map(|_| OnceLock::new()).collect();

        Ok(Self {
            archive: Mutex::new(zip),
            package,
            navigation,
            encryption,
            rendition,
            mimetype,
            cover: OnceLock::new(),
            overlays,
        })
    }

    fn archive(&self) -> MutexGuard<'_, StreamingZip<R>> {
        // A panic mid-read leaves the index intact; reads seek before use.
        self.archive.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The parsed package document.
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Archive path of the package document.
    pub fn package_path(&self) -> &str {
        &self.package.path
    }

    /// Package metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.package.metadata
    }

    /// Resource inventory.
    pub fn manifest(&self) -> &Manifest {
        &self.package.manifest
    }

    /// Reading order.
    pub fn spine(&self) -> &Spine {
        &self.package.spine
    }

    /// Navigation document (EPUB3 nav, else NCX), when one was readable.
    pub fn navigation(&self) -> Option<&Navigation> {
        self.navigation.as_ref()
    }

    /// Top-level TOC entries, empty without navigation.
    pub fn toc(&self) -> &[NavPoint] {
        self.navigation
            .as_ref()
            .map(|n| n.toc.as_slice())
            .unwrap_or(&[])
    }

    /// Declared encryption and obfuscation.
    pub fn encryption(&self) -> &Encryption {
        &self.encryption
    }

    /// Package-level rendition properties.
    pub fn rendition(&self) -> &RenditionProperties {
        &self.rendition
    }

    /// Where the `mimetype` entry sits in the archive.
    pub fn mimetype_placement(&self) -> MimetypePlacement {
        self.mimetype
    }

    /// Primary title, or empty.
    pub fn title(&self) -> &str {
        self.package.metadata.title()
    }

    /// Primary author, or empty.
    pub fn author(&self) -> &str {
        self.package.metadata.author()
    }

    /// Primary language, or empty.
    pub fn language(&self) -> &str {
        self.package.metadata.language()
    }

    /// Archive entry names in archive order.
    pub fn entries(&self) -> Vec<String> {
        self.archive()
            .entries()
            .map(|entry| entry.filename.clone())
            .collect()
    }

    /// Whether the archive holds `path` (archive-absolute).
    pub fn contains(&self, path: &str) -> bool {
        self.archive().contains(path)
    }

    /// Read a resource by path.
    ///
    /// The path may be archive-absolute or relative to the package document;
    /// a `#fragment` suffix is ignored.
    pub fn read_resource(&self, path: &str) -> Result<Vec<u8>, EpubError> {
        let (path, _) = split_fragment(path);
        let mut zip = self.archive();
        let entry = zip
            .get_entry(path)
            .or_else(|| zip.get_entry(&self.package.resolve(path)))
            .cloned()
            .ok_or_else(|| EpubError::ResourceNotFound {
                path: path.to_string(),
            })?;
        Ok(zip.read_to_vec(&entry)?)
    }

    /// Stream a resource into a writer. Returns the number of bytes written.
    pub fn read_resource_into<W: Write>(&self, path: &str, writer: &mut W) -> Result<usize, EpubError> {
        let (path, _) = split_fragment(path);
        let mut zip = self.archive();
        let entry = zip
            .get_entry(path)
            .or_else(|| zip.get_entry(&self.package.resolve(path)))
            .cloned()
            .ok_or_else(|| EpubError::ResourceNotFound {
                path: path.to_string(),
            })?;
        Ok(zip.read_file_to_writer(&entry, writer)?)
    }

    /// Number of spine entries.
    pub fn chapter_count(&self) -> usize {
        self.package.spine.len()
    }

    /// Chapters in spine order; dangling idrefs are skipped.
    pub fn chapters(&self) -> impl Iterator<Item = ChapterRef> + '_ {
        self.package
            .spine
            .items()
            .iter()
            .enumerate()
            .filter_map(|(index, spine_item)| {
                self.package
                    .manifest
                    .get(&spine_item.idref)
                    .map(|item| chapter_ref(index, spine_item.linear, item))
            })
    }

    /// Chapter descriptor by spine index.
    pub fn chapter(&self, index: usize) -> Result<ChapterRef, EpubError> {
        let spine_item = self
            .package
            .spine
            .get(index)
            .ok_or(EpubError::ChapterOutOfBounds {
                index,
                chapter_count: self.package.spine.len(),
            })?;
        let item = self.package.manifest.get(&spine_item.idref).ok_or_else(|| {
            EpubError::ManifestItemMissing {
                idref: spine_item.idref.clone(),
            }
        })?;
        Ok(chapter_ref(index, spine_item.linear, item))
    }

    /// Chapter descriptor by spine `idref`.
    pub fn chapter_by_id(&self, idref: &str) -> Result<ChapterRef, EpubError> {
        let index = self.package.spine.position_of(idref).ok_or_else(|| {
            EpubError::ManifestItemMissing {
                idref: idref.to_string(),
            }
        })?;
        self.chapter(index)
    }

    /// Raw bytes of the chapter at a spine index.
    pub fn chapter_bytes(&self, index: usize) -> Result<Vec<u8>, EpubError> {
        let chapter = self.chapter(index)?;
        self.read_resource(&chapter.href)
    }

    /// CFI for a spine position and optional character offset.
    pub fn chapter_cfi(&self, index: usize, char_offset: Option<u32>) -> Result<String, EpubError> {
        let chapter = self.chapter(index)?;
        generate_chapter_cfi(&chapter.idref, index, char_offset).ok_or(EpubError::ChapterOutOfBounds {
            index,
            chapter_count: self.chapter_count(),
        })
    }

    /// Resolve a chapter CFI back to its chapter and character offset.
    ///
    /// The spine position in the CFI wins; when it is out of range the id
    /// assertion is used instead.
    pub fn resolve_cfi(&self, cfi: &str) -> Result<(ChapterRef, Option<u32>), EpubError> {
        let location = parse_chapter_cfi(cfi)?;
        let chapter = match self.chapter(location.spine_position) {
            Ok(chapter) => chapter,
            Err(EpubError::ChapterOutOfBounds { .. }) if !location.chapter_id.is_empty() => {
                self.chapter_by_id(&location.chapter_id)?
            }
            Err(err) => return Err(err),
        };
        Ok((chapter, location.char_offset))
    }

    /// Cover image, discovered on first call.
    pub fn cover(&self) -> Option<&CoverImage> {
        self.cover
            .get_or_init(|| find_cover(&self.package, self))
            .as_ref()
    }

    /// Media overlay of the spine item at `index`, parsed on first call.
    ///
    /// `None` when the item has no overlay or the overlay is unusable.
    pub fn media_overlay(&self, index: usize) -> Option<&MediaOverlay> {
        self.overlays
            .get(index)?
            .get_or_init(|| self.load_overlay(index))
            .as_ref()
    }

    /// Spine positions whose items declare a media overlay.
    pub fn overlay_positions(&self) -> Vec<usize> {
        self.package
            .spine
            .items()
            .iter()
            .enumerate()
            .filter(|(_, spine_item)| {
                self.package
                    .manifest
                    .get(&spine_item.idref)
                    .is_some_and(|item| item.media_overlay.is_some())
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn load_overlay(&self, index: usize) -> Option<MediaOverlay> {
        let spine_item = self.package.spine.get(index)?;
        let item = self.package.manifest.get(&spine_item.idref)?;
        let overlay_id = item.media_overlay.as_deref()?;
        let Some(smil) = self.package.manifest.get(overlay_id) else {
            log::warn!(
                "[SMIL] {} names overlay '{}' which is not in the manifest",
                item.id,
                overlay_id
            );
            return None;
        };
        let content = match self.read_resource(&smil.href) {
            Ok(content) => content,
            Err(err) => {
                log::warn!("[SMIL] could not read {}: {}", smil.href, err);
                return None;
            }
        };
        let mut overlay = match parse_media_overlay(&content, &smil.id, &smil.href) {
            Ok(overlay) => overlay,
            Err(err) => {
                log::warn!("[SMIL] {}", err);
                return None;
            }
        };
        let declared = self
            .package
            .metadata
            .refinements(&smil.id)
            .find(|meta| meta.property == "media:duration")
            .map(|meta| parse_clock_value(&meta.value));
        if declared.is_some() {
            overlay.duration = declared;
        }
        Some(overlay)
    }

    /// Title, author, language, cover and top-level TOC in one record.
    pub fn summary(&self) -> BookSummary {
        BookSummary {
            title: self.title().to_string(),
            author: self.author().to_string(),
            language: self.language().to_string(),
            cover: self.cover().cloned(),
            toc: self.toc().to_vec(),
        }
    }

    /// Run the validator over the open archive.
    pub fn validate(&self) -> ValidationReport {
        self.validate_with_options(ValidationOptions::default())
    }

    /// Run the validator over the open archive with explicit options.
    ///
    /// Only `profile` applies; the archive is already open with its limits.
    pub fn validate_with_options(&self, options: ValidationOptions) -> ValidationReport {
        validate_archive(&mut self.archive(), options.profile)
    }
}

impl<R: Read + Seek> fmt::Debug for EpubContainer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpubContainer")
            .field("package_path", &self.package.path)
            .field("version", &self.package.metadata.version)
            .field("chapters", &self.package.spine.len())
            .field("has_navigation", &self.navigation.is_some())
            .field("mimetype", &self.mimetype)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek> ResourceSource for EpubContainer<R> {
    fn read_resource(&self, path: &str) -> Result<Vec<u8>, EpubError> {
        EpubContainer::read_resource(self, path)
    }
}

fn chapter_ref(index: usize, linear: bool, item: &ManifestItem) -> ChapterRef {
    ChapterRef {
        index,
        idref: item.id.clone(),
        href: item.href.clone(),
        media_type: item.media_type.clone(),
        linear,
    }
}

fn read_required<R: Read + Seek>(zip: &mut StreamingZip<R>, path: &str) -> Result<Vec<u8>, EpubError> {
    let entry = zip
        .get_entry(path)
        .cloned()
        .ok_or_else(|| match path {
            CONTAINER_PATH => EpubError::InvalidEpub(format!("{} is missing", CONTAINER_PATH)),
            _ => EpubError::ResourceNotFound {
                path: path.to_string(),
            },
        })?;
    zip.read_to_vec(&entry).map_err(EpubError::Zip)
}

fn load_navigation<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    package: &Package,
    strict: bool,
) -> Result<Option<Navigation>, EpubError> {
    let manifest = &package.manifest;
    let candidates = [
        manifest.nav().map(|item| (item, false)),
        manifest.ncx(package.spine.toc_id()).map(|item| (item, true)),
    ];

    // Lenient mode falls through to the NCX when the nav document is unusable.
    for (item, is_ncx) in candidates.into_iter().flatten() {
        let parsed = read_entry(zip, &item.href).and_then(|bytes| {
            let nav = if is_ncx {
                parse_ncx(&bytes, &item.href)
            } else {
                parse_nav_xhtml(&bytes, &item.href)
            };
            nav.map_err(EpubError::from)
        });
        match parsed {
            Ok(nav) => return Ok(Some(nav)),
            Err(err) if strict => return Err(err),
            Err(err) => log::warn!("[NAV] skipping {}: {}", item.href, err),
        }
    }
    Ok(None)
}

fn load_encryption<R: Read + Seek>(zip: &mut StreamingZip<R>) -> Encryption {
    let has_rights_xml = zip.contains(RIGHTS_PATH);
    let mut encryption = if zip.contains(ENCRYPTION_PATH) {
        let parsed = read_entry(zip, ENCRYPTION_PATH)
            .and_then(|bytes| parse_encryption_xml(&bytes).map_err(EpubError::from));
        match parsed {
            Ok(encryption) => encryption,
            Err(err) => {
                log::warn!("[OCF] ignoring unusable {}: {}", ENCRYPTION_PATH, err);
                Encryption::default()
            }
        }
    } else {
        Encryption::default()
    };
    encryption.has_rights_xml = has_rights_xml;
    encryption
}

fn read_entry<R: Read + Seek>(zip: &mut StreamingZip<R>, path: &str) -> Result<Vec<u8>, EpubError> {
    let entry = zip
        .get_entry(path)
        .cloned()
        .ok_or(EpubError::Zip(ZipError::FileNotFound))?;
    zip.read_to_vec(&entry).map_err(EpubError::Zip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::CoverStrategy;
    use crate::testutil::{sample_epub, EpubFixture, ZipBuilder};
    use core::time::Duration;
    use std::sync::Barrier;
    use std::thread;

    fn open(bytes: Vec<u8>) -> EpubContainer<Cursor<Vec<u8>>> {
        ContainerBuilder::new().from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_open_sample() {
        let book = open(sample_epub());
        assert_eq!(book.title(), "Sample Book");
        assert_eq!(book.author(), "Jane Doe");
        assert_eq!(book.language(), "en");
        assert_eq!(book.package_path(), "OEBPS/content.opf");
        assert_eq!(book.chapter_count(), 2);
        assert!(book.mimetype_placement().is_conformant());
        assert_eq!(book.toc().len(), 2);
        assert_eq!(book.toc()[1].href, "OEBPS/ch2.xhtml");
    }

    #[test]
    fn test_chapters_and_bytes() {
        let book = open(sample_epub());
        let chapters: Vec<ChapterRef> = book.chapters().collect();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].href, "OEBPS/ch1.xhtml");
        assert!(String::from_utf8(book.chapter_bytes(1).unwrap())
            .unwrap()
            .contains("Chapter Two"));
        assert!(matches!(
            book.chapter(5),
            Err(EpubError::ChapterOutOfBounds {
                index: 5,
                chapter_count: 2
            })
        ));
    }

    #[test]
    fn test_read_resource_paths() {
        let book = open(sample_epub());
        let absolute = book.read_resource("OEBPS/ch1.xhtml").unwrap();
        let relative = book.read_resource("ch1.xhtml#start").unwrap();
        assert_eq!(absolute, relative);
        assert_eq!(
            book.read_resource("OEBPS/missing.xhtml").unwrap_err(),
            EpubError::ResourceNotFound {
                path: "OEBPS/missing.xhtml".to_string()
            }
        );
    }

    #[test]
    fn test_cover_is_memoized() {
        let book = open(sample_epub());
        let first = book.cover().unwrap();
        assert_eq!(first.strategy, CoverStrategy::ManifestProperty);
        assert_eq!(first.data, crate::testutil::PNG_1X1);
        let second = book.cover().unwrap();
        assert!(core::ptr::eq(first, second));
    }

    #[test]
    fn test_media_overlay() {
        let book = open(sample_epub());
        assert_eq!(book.overlay_positions(), vec![0]);
        let overlay = book.media_overlay(0).unwrap();
        assert_eq!(overlay.sync_point_count(), 2);
        assert_eq!(overlay.duration, Some(Duration::from_secs(10)));
        assert!(book.media_overlay(1).is_none());
        assert!(book.media_overlay(9).is_none());
    }

    #[test]
    fn test_media_duration_meta_wins() {
        let bytes = EpubFixture::new()
            .extra_metadata(r##"<meta property="media:duration" refines="#ch1-overlay">0:01:00</meta>"##)
            .build();
        let book = open(bytes);
        let overlay = book.media_overlay(0).unwrap();
        assert_eq!(overlay.duration, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_cfi_round_trip_through_container() {
        let book = open(sample_epub());
        let cfi = book.chapter_cfi(1, Some(42)).unwrap();
        let (chapter, offset) = book.resolve_cfi(&cfi).unwrap();
        assert_eq!(chapter.idref, "ch2");
        assert_eq!(offset, Some(42));
        assert!(matches!(
            book.resolve_cfi("epubcfi(/6/x)"),
            Err(EpubError::Cfi(_))
        ));
    }

    #[test]
    fn test_summary() {
        let summary = open(sample_epub()).summary();
        assert_eq!(summary.title, "Sample Book");
        assert!(summary.cover.is_some());
        assert_eq!(summary.toc.len(), 2);
    }

    #[test]
    fn test_missing_container_xml_is_fatal() {
        let bytes = ZipBuilder::new()
            .stored("mimetype", "application/epub+zip")
            .deflated("OEBPS/content.opf", "<package/>")
            .finish();
        assert!(matches!(
            ContainerBuilder::new().from_bytes(bytes),
            Err(EpubError::InvalidEpub(_))
        ));
    }

    #[test]
    fn test_bad_mimetype_is_fatal() {
        let bytes = EpubFixture::new().mimetype("application/zip").build();
        assert!(matches!(
            ContainerBuilder::new().from_bytes(bytes),
            Err(EpubError::Zip(ZipError::InvalidMimetype(_)))
        ));
    }

    #[test]
    fn test_compressed_mimetype_lenient_vs_strict() {
        let bytes = EpubFixture::new().compress_mimetype().build();
        let book = ContainerBuilder::new().from_bytes(bytes.clone()).unwrap();
        assert!(!book.mimetype_placement().stored);
        assert!(matches!(
            ContainerBuilder::new().strict().from_bytes(bytes),
            Err(EpubError::InvalidEpub(_))
        ));
    }

    #[test]
    fn test_dangling_spine_idref_lenient_vs_strict() {
        let bytes = EpubFixture::new().extra_spine(r#"<itemref idref="ghost"/>"#).build();
        let book = ContainerBuilder::new().from_bytes(bytes.clone()).unwrap();
        assert_eq!(book.chapter_count(), 3);
        assert_eq!(book.chapters().count(), 2);
        assert_eq!(
            ContainerBuilder::new().strict().from_bytes(bytes).err(),
            Some(EpubError::ManifestItemMissing {
                idref: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_package_reports_path() {
        let bytes = EpubFixture::new().raw_opf("<package><metadata></package>").build();
        match ContainerBuilder::new().from_bytes(bytes) {
            Err(EpubError::Parse(err)) => assert_eq!(err.path, "OEBPS/content.opf"),
            other => panic!("expected parse error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_encryption_is_loaded() {
        let bytes = EpubFixture::new()
            .file(
                ENCRYPTION_PATH,
                r#"<encryption><EncryptedData>
                    <EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
                    <CipherData><CipherReference URI="OEBPS/font.otf"/></CipherData>
                </EncryptedData></encryption>"#,
            )
            .build();
        let book = open(bytes);
        assert!(book.encryption().is_obfuscated_font("OEBPS/font.otf"));
        assert!(!book.encryption().has_drm());
        assert!(!book.encryption().has_rights_xml);
    }

    #[test]
    fn test_concurrent_first_access_computes_once() {
        let book = open(sample_epub());
        let barrier = Barrier::new(8);
        let seen: Vec<(Option<&CoverImage>, Option<&MediaOverlay>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        (book.cover(), book.media_overlay(0))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let (cover, overlay) = (seen[0].0.unwrap(), seen[0].1.unwrap());
        assert_eq!(cover.strategy, CoverStrategy::ManifestProperty);
        assert_eq!(overlay.sync_point_count(), 2);
        for (other_cover, other_overlay) in &seen {
            assert!(core::ptr::eq(other_cover.unwrap(), cover));
            assert!(core::ptr::eq(other_overlay.unwrap(), overlay));
        }
    }

    #[test]
    fn test_container_is_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<EpubContainer<Cursor<Vec<u8>>>>();
    }
}
