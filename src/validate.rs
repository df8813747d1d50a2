//! Archive validation with structured diagnostics.
//!
//! Validation never fails: every problem, including an unreadable archive,
//! becomes a [`ValidationDiagnostic`]. A report is valid when it holds no
//! error-level diagnostics; warnings and info never fail validation.
//!
//! Two profiles share the archive-level checks (empty archive, macOS
//! resource forks, image integrity):
//!
//! - **EPUB**: OCF and package-document checks.
//! - **Image sequence**: comic-style archives of page images, checked for
//!   page numbering and metadata sidecars (`ComicInfo.xml`, `metadata.opf`).

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::encryption::{parse_encryption_xml, EncryptionKind, ENCRYPTION_PATH, RIGHTS_PATH};
use crate::error::{EpubError, ParseError};
use crate::manifest::SMIL_MEDIA_TYPE;
use crate::metadata::{parse_metadata, EpubVersion};
use crate::navigation::{parse_nav_xhtml, parse_ncx};
use crate::package::{parse_container_xml, parse_package, Package, CONTAINER_PATH};
use crate::smil::parse_media_overlay;
use crate::xml;
use crate::zip::{StreamingZip, ZipLimits};

/// Sidecar naming comic metadata.
pub const COMIC_INFO_PATH: &str = "ComicInfo.xml";
/// Calibre-style OPF sidecar.
pub const METADATA_OPF_PATH: &str = "metadata.opf";

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "avif", "svg",
];

/// Severity level for a validation diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationSeverity {
    /// Violates a required structural expectation.
    Error,
    /// Suspicious or non-ideal structure that may reduce compatibility.
    Warning,
    /// Worth knowing, never a problem on its own.
    Info,
}

/// Structured validation diagnostic entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationDiagnostic {
    /// Stable machine-readable diagnostic code.
    pub code: &'static str,
    /// Severity classification.
    pub severity: ValidationSeverity,
    /// Human-readable description.
    pub message: String,
    /// Archive path this diagnostic is about, if any.
    pub path: Option<String>,
    /// Section of the book (ocf, manifest, spine, navigation, ...).
    pub location: Option<&'static str>,
    /// Remediation hint.
    pub hint: Option<String>,
}

impl ValidationDiagnostic {
    fn new(code: &'static str, severity: ValidationSeverity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            path: None,
            location: None,
            hint: None,
        }
    }

    fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ValidationSeverity::Error, message)
    }

    fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ValidationSeverity::Warning, message)
    }

    fn info(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ValidationSeverity::Info, message)
    }

    fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn in_section(mut self, location: &'static str) -> Self {
        self.location = Some(location);
        self
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Which family of checks applies to an archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ValidationProfile {
    /// EPUB when `mimetype` or `container.xml` is present, else image sequence.
    #[default]
    Auto,
    /// OCF/EPUB archive.
    Epub,
    /// Archive of page images (CBZ-style).
    ImageSequence,
}

/// Validation report with all discovered diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    diagnostics: Vec<ValidationDiagnostic>,
    profile: ValidationProfile,
}

impl ValidationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics in the order they were found.
    pub fn diagnostics(&self) -> &[ValidationDiagnostic] {
        &self.diagnostics
    }

    /// Diagnostics of one severity.
    pub fn with_severity(
        &self,
        severity: ValidationSeverity,
    ) -> impl Iterator<Item = &ValidationDiagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    /// Error-level diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationDiagnostic> {
        self.with_severity(ValidationSeverity::Error)
    }

    /// Warning-level diagnostics.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationDiagnostic> {
        self.with_severity(ValidationSeverity::Warning)
    }

    /// Info-level diagnostics.
    pub fn infos(&self) -> impl Iterator<Item = &ValidationDiagnostic> {
        self.with_severity(ValidationSeverity::Info)
    }

    /// Number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Number of warning diagnostics.
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Number of info diagnostics.
    pub fn info_count(&self) -> usize {
        self.infos().count()
    }

    /// Whether any diagnostic carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }

    /// Profile the checks ran under (never `Auto` once an archive was read).
    pub fn profile(&self) -> ValidationProfile {
        self.profile
    }

    /// Returns `true` when no error-level diagnostics were found.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    fn push(&mut self, diagnostic: ValidationDiagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Options for validation runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Optional ZIP safety limits used while reading archive entries.
    pub zip_limits: Option<ZipLimits>,
    /// Which checks to run.
    pub profile: ValidationProfile,
}

/// Validate an archive from a filesystem path.
///
/// Only opening the file can fail; everything after that is a diagnostic.
pub fn validate_epub_file<P: AsRef<Path>>(path: P) -> Result<ValidationReport, EpubError> {
    validate_epub_file_with_options(path, ValidationOptions::default())
}

/// Validate an archive from a filesystem path with explicit options.
pub fn validate_epub_file_with_options<P: AsRef<Path>>(
    path: P,
    options: ValidationOptions,
) -> Result<ValidationReport, EpubError> {
    let file = File::open(path).map_err(|e| EpubError::Io(e.to_string()))?;
    Ok(validate_epub_reader_with_options(file, options))
}

/// Validate an archive from any `Read + Seek` reader.
pub fn validate_epub_reader<R: Read + Seek>(reader: R) -> ValidationReport {
    validate_epub_reader_with_options(reader, ValidationOptions::default())
}

/// Validate an archive from any `Read + Seek` reader with explicit options.
pub fn validate_epub_reader_with_options<R: Read + Seek>(
    reader: R,
    options: ValidationOptions,
) -> ValidationReport {
    match StreamingZip::new_with_limits(reader, options.zip_limits) {
        Ok(mut zip) => validate_archive(&mut zip, options.profile),
        Err(err) => {
            let mut report = ValidationReport::new();
            report.push(
                ValidationDiagnostic::error(
                    "ARCHIVE_UNREADABLE",
                    format!("Failed to read ZIP archive: {}", err),
                )
                .in_section("archive"),
            );
            report
        }
    }
}

/// Validate an already opened archive.
pub fn validate_archive<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    profile: ValidationProfile,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let files: Vec<String> = zip
        .entries()
        .filter(|e| !e.is_dir())
        .map(|e| e.filename.clone())
        .collect();

    let profile = match profile {
        ValidationProfile::Auto if zip.contains("mimetype") || zip.contains(CONTAINER_PATH) => {
            ValidationProfile::Epub
        }
        ValidationProfile::Auto => ValidationProfile::ImageSequence,
        explicit => explicit,
    };
    report.profile = profile;

    if files.is_empty() {
        report.push(
            ValidationDiagnostic::error("ARCHIVE_EMPTY", "Archive contains no files.")
                .in_section("archive"),
        );
        return report;
    }

    check_resource_forks(&files, &mut report);
    let images: Vec<&str> = files
        .iter()
        .map(String::as_str)
        .filter(|name| !is_resource_fork(name) && is_image_name(name))
        .collect();

    match profile {
        ValidationProfile::ImageSequence => {
            check_images(zip, &images, &mut report);
            if images.is_empty() {
                report.push(
                    ValidationDiagnostic::error("NO_IMAGES", "Archive contains no page images.")
                        .in_section("archive"),
                );
            }
            check_page_sequence(&images, &mut report);
            check_metadata_sidecars(zip, &mut report);
        }
        _ => check_epub(zip, &images, &mut report),
    }

    report
}

fn is_resource_fork(name: &str) -> bool {
    name.starts_with("__MACOSX/") || file_name(name).starts_with("._")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<String> {
    file_name(path)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

fn is_image_name(path: &str) -> bool {
    extension(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn check_resource_forks(files: &[String], report: &mut ValidationReport) {
    let forks = files.iter().filter(|f| is_resource_fork(f)).count();
    if forks > 0 {
        report.push(
            ValidationDiagnostic::info(
                "MACOS_RESOURCE_FORKS",
                format!("Archive contains {} macOS resource-fork entries.", forks),
            )
            .in_section("archive")
            .with_hint("Re-create the archive without `__MACOSX/` and `._*` files."),
        );
    }
}

fn check_images<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    images: &[&str],
    report: &mut ValidationReport,
) {
    for &path in images {
        let bytes = match zip.read_by_name(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                report.push(
                    ValidationDiagnostic::error(
                        "IMAGE_UNREADABLE",
                        format!("Failed to read image '{}': {}", path, err),
                    )
                    .with_path(path)
                    .in_section("images"),
                );
                continue;
            }
        };
        let recognized = if extension(path).as_deref() == Some("svg") {
            looks_like_svg(&bytes)
        } else {
            image::guess_format(&bytes).is_ok()
        };
        if !recognized {
            report.push(
                ValidationDiagnostic::warning(
                    "IMAGE_FORMAT_UNKNOWN",
                    format!("Could not recognize the image format of '{}'.", path),
                )
                .with_path(path)
                .in_section("images"),
            );
        }
    }
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(4096)];
    head.windows(4).any(|w| w.eq_ignore_ascii_case(b"<svg"))
}

/// The number ending a file stem, when it is the stem's only run of digits.
fn page_number(path: &str) -> Option<u64> {
    let name = file_name(path);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    if !stem.ends_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let runs: Vec<&str> = stem
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .collect();
    match runs.as_slice() {
        [run] => run.parse().ok(),
        _ => None,
    }
}

fn check_page_sequence(images: &[&str], report: &mut ValidationReport) {
    let numbers: Option<Vec<(u64, &str)>> = images
        .iter()
        .map(|path| page_number(path).map(|n| (n, *path)))
        .collect();
    // Only meaningful when every page carries exactly one number.
    let Some(numbers) = numbers else {
        return;
    };

    let mut by_number: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
    for (number, path) in numbers {
        by_number.entry(number).or_default().push(path);
    }

    for (number, paths) in &by_number {
        if paths.len() > 1 {
            report.push(
                ValidationDiagnostic::warning(
                    "PAGE_NUMBER_DUPLICATE",
                    format!("Page number {} is used by {}.", number, paths.join(", ")),
                )
                .in_section("pages"),
            );
        }
    }

    let sorted: Vec<u64> = by_number.keys().copied().collect();
    for pair in sorted.windows(2) {
        if pair[1] - pair[0] > 1 {
            report.push(
                ValidationDiagnostic::warning(
                    "PAGE_SEQUENCE_GAP",
                    format!("Pages {} to {} are missing.", pair[0] + 1, pair[1] - 1),
                )
                .in_section("pages"),
            );
        }
    }
}

fn check_metadata_sidecars<R: Read + Seek>(zip: &mut StreamingZip<R>, report: &mut ValidationReport) {
    let mut found = false;

    if zip.contains(COMIC_INFO_PATH) {
        found = true;
        let parsed = zip
            .read_by_name(COMIC_INFO_PATH)
            .map_err(|err| err.to_string())
            .and_then(|bytes| check_well_formed(COMIC_INFO_PATH, &bytes).map_err(|e| e.to_string()));
        if let Err(err) = parsed {
            report.push(metadata_unparsable(COMIC_INFO_PATH, &err));
        }
    }

    if zip.contains(METADATA_OPF_PATH) {
        found = true;
        let parsed = zip
            .read_by_name(METADATA_OPF_PATH)
            .map_err(|err| err.to_string())
            .and_then(|bytes| parse_metadata(&bytes).map(|_| ()).map_err(|e| e.to_string()));
        if let Err(err) = parsed {
            report.push(metadata_unparsable(METADATA_OPF_PATH, &err));
        }
    }

    if !found {
        report.push(
            ValidationDiagnostic::info(
                "METADATA_MISSING",
                "No metadata sidecar (ComicInfo.xml or metadata.opf) found.",
            )
            .in_section("metadata"),
        );
    }
}

fn metadata_unparsable(path: &str, err: &str) -> ValidationDiagnostic {
    ValidationDiagnostic::warning(
        "METADATA_UNPARSABLE",
        format!("Could not parse '{}': {}", path, err),
    )
    .with_path(path)
    .in_section("metadata")
}

/// Read an XML document to the end, reporting the first syntax error.
fn check_well_formed(path: &str, content: &[u8]) -> Result<(), ParseError> {
    let mut reader = Reader::from_reader(content);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => return Ok(()),
            Err(e) => return Err(xml::parse_failure(path, content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }
}

/// `named_images` is only consulted when the package cannot be loaded.
fn check_epub<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    named_images: &[&str],
    report: &mut ValidationReport,
) {
    match zip.validate_mimetype() {
        Ok(placement) => {
            if !placement.first_entry {
                report.push(
                    ValidationDiagnostic::error(
                        "OCF_MIMETYPE_NOT_FIRST",
                        "`mimetype` is not the first archive entry.",
                    )
                    .with_path("mimetype")
                    .in_section("ocf"),
                );
            }
            if !placement.stored {
                report.push(
                    ValidationDiagnostic::error(
                        "OCF_MIMETYPE_COMPRESSED",
                        "`mimetype` must be stored without compression.",
                    )
                    .with_path("mimetype")
                    .in_section("ocf"),
                );
            }
        }
        Err(err) => report.push(
            ValidationDiagnostic::error(
                "OCF_INVALID_MIMETYPE",
                format!("Invalid or missing mimetype entry: {}", err),
            )
            .with_path("mimetype")
            .in_section("ocf")
            .with_hint("Ensure `mimetype` exists and equals `application/epub+zip`."),
        ),
    }

    check_encryption(zip, report);

    let Some(package) = load_package(zip, report) else {
        check_images(zip, named_images, report);
        return;
    };
    // Image resources are whatever the manifest declares as image/*.
    let images: Vec<&str> = package
        .manifest
        .images()
        .filter(|item| !is_external(&item.href) && zip.contains(&item.href))
        .map(|item| item.href.as_str())
        .collect();
    check_images(zip, &images, report);
    check_manifest(zip, &package, report);
    check_spine(&package, report);
    check_navigation(zip, &package, report);
    check_overlays(zip, &package, report);
    check_package_metadata(&package, report);
}

fn load_package<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    report: &mut ValidationReport,
) -> Option<Package> {
    let container = match zip.read_by_name(CONTAINER_PATH) {
        Ok(bytes) => bytes,
        Err(err) => {
            report.push(
                ValidationDiagnostic::error(
                    "OCF_CONTAINER_XML_MISSING",
                    format!("Cannot read required `{}`: {}", CONTAINER_PATH, err),
                )
                .with_path(CONTAINER_PATH)
                .in_section("ocf"),
            );
            return None;
        }
    };

    let package_path = match parse_container_xml(&container) {
        Ok(path) => path,
        Err(err) => {
            report.push(
                ValidationDiagnostic::error(
                    "OPF_ROOTFILE_MISSING",
                    format!("container.xml does not declare a usable rootfile: {}", err),
                )
                .with_path(CONTAINER_PATH)
                .in_section("ocf"),
            );
            return None;
        }
    };

    let opf = match zip.read_by_name(&package_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            report.push(
                ValidationDiagnostic::error(
                    "OPF_FILE_MISSING",
                    format!("Cannot read package document '{}': {}", package_path, err),
                )
                .with_path(package_path)
                .in_section("package"),
            );
            return None;
        }
    };

    match parse_package(&package_path, &opf) {
        Ok(package) => Some(package),
        Err(err) => {
            report.push(
                ValidationDiagnostic::error(
                    "OPF_PARSE_ERROR",
                    format!("Failed to parse package document: {}", err),
                )
                .with_path(package_path)
                .in_section("package"),
            );
            None
        }
    }
}

fn is_external(href: &str) -> bool {
    href.contains("://") || href.starts_with("data:") || href.starts_with("mailto:")
}

fn check_manifest<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    package: &Package,
    report: &mut ValidationReport,
) {
    let manifest = &package.manifest;
    let mut hrefs = BTreeSet::new();

    for item in manifest.iter() {
        if item.id.trim().is_empty() {
            report.push(
                ValidationDiagnostic::error("MANIFEST_ID_EMPTY", "Manifest item has no `id`.")
                    .with_path(&item.href)
                    .in_section("manifest"),
            );
        }
        if item.href.trim().is_empty() {
            report.push(
                ValidationDiagnostic::error(
                    "MANIFEST_HREF_EMPTY",
                    format!("Manifest item '{}' has no `href`.", item.id),
                )
                .in_section("manifest"),
            );
        }
        if item.media_type.trim().is_empty() {
            report.push(
                ValidationDiagnostic::error(
                    "MANIFEST_MEDIA_TYPE_EMPTY",
                    format!("Manifest item '{}' has no `media-type`.", item.id),
                )
                .with_path(&item.href)
                .in_section("manifest"),
            );
        }

        let href_key = item.href.to_ascii_lowercase();
        if !href_key.is_empty() && !hrefs.insert(href_key) {
            report.push(
                ValidationDiagnostic::warning(
                    "MANIFEST_HREF_DUPLICATE",
                    format!("Multiple manifest items reference '{}'.", item.href),
                )
                .with_path(&item.href)
                .in_section("manifest"),
            );
        }

        if !item.href.is_empty() && !is_external(&item.href) && !zip.contains(&item.href) {
            report.push(
                ValidationDiagnostic::error(
                    "MANIFEST_RESOURCE_MISSING",
                    format!(
                        "Manifest item '{}' points to missing resource '{}'.",
                        item.id, item.href
                    ),
                )
                .with_path(&item.href)
                .in_section("manifest"),
            );
        }

        if let Some(fallback) = item.fallback.as_deref() {
            if manifest.get(fallback).is_none() {
                report.push(
                    ValidationDiagnostic::error(
                        "MANIFEST_FALLBACK_TARGET_MISSING",
                        format!(
                            "Manifest item '{}' fallback references missing id '{}'.",
                            item.id, fallback
                        ),
                    )
                    .with_path(&item.href)
                    .in_section("manifest"),
                );
            } else if manifest.has_fallback_cycle(&item.id) {
                report.push(
                    ValidationDiagnostic::error(
                        "MANIFEST_FALLBACK_CYCLE",
                        format!("Fallback chain from '{}' contains a cycle.", item.id),
                    )
                    .with_path(&item.href)
                    .in_section("manifest"),
                );
            }
        }
    }

    for id in manifest.duplicate_ids() {
        report.push(
            ValidationDiagnostic::error(
                "MANIFEST_ID_DUPLICATE",
                format!("Duplicate manifest id '{}'.", id),
            )
            .in_section("manifest"),
        );
    }
}

fn check_spine(package: &Package, report: &mut ValidationReport) {
    let spine = &package.spine;
    if spine.is_empty() {
        report.push(
            ValidationDiagnostic::warning("SPINE_EMPTY", "Spine has no reading-order entries.")
                .in_section("spine"),
        );
    }

    for (index, itemref) in spine.items().iter().enumerate() {
        let Some(item) = package.manifest.get(&itemref.idref) else {
            report.push(
                ValidationDiagnostic::error(
                    "SPINE_IDREF_NOT_IN_MANIFEST",
                    format!(
                        "Spine item at index {} references unknown manifest id '{}'.",
                        index, itemref.idref
                    ),
                )
                .in_section("spine")
                .with_hint("Each `<itemref idref>` must match a manifest `<item id>`."),
            );
            continue;
        };
        let has_content_fallback = package
            .manifest
            .fallback_chain(&item.id)
            .iter()
            .any(|candidate| candidate.is_xhtml() || candidate.media_type == "image/svg+xml");
        if !has_content_fallback {
            report.push(
                ValidationDiagnostic::warning(
                    "SPINE_ITEM_NON_XHTML",
                    format!(
                        "Spine item '{}' has media-type '{}' and no XHTML fallback.",
                        itemref.idref, item.media_type
                    ),
                )
                .with_path(&item.href)
                .in_section("spine"),
            );
        }
    }
}

fn check_navigation<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    package: &Package,
    report: &mut ValidationReport,
) {
    let manifest = &package.manifest;
    let toc_id = package.spine.toc_id();

    if let Some(toc_id) = toc_id {
        if manifest.get(toc_id).is_none() {
            report.push(
                ValidationDiagnostic::error(
                    "NCX_IDREF_NOT_IN_MANIFEST",
                    format!("Spine `toc` references unknown manifest id '{}'.", toc_id),
                )
                .in_section("spine"),
            );
        }
    }

    let (item, is_ncx) = match (manifest.nav(), manifest.ncx(toc_id)) {
        (Some(nav), _) => (nav, false),
        (None, Some(ncx)) => (ncx, true),
        (None, None) => {
            let diagnostic = if package.metadata.is_epub3() {
                ValidationDiagnostic::error(
                    "NAV_MISSING",
                    "EPUB 3 package has no manifest item with the `nav` property.",
                )
            } else {
                ValidationDiagnostic::warning(
                    "NAV_MISSING",
                    "No EPUB 3 nav document and no EPUB 2 NCX found.",
                )
            };
            report.push(diagnostic.in_section("navigation"));
            return;
        }
    };

    let bytes = match zip.read_by_name(&item.href) {
        Ok(bytes) => bytes,
        Err(err) => {
            report.push(
                ValidationDiagnostic::error(
                    "NAV_DOCUMENT_UNREADABLE",
                    format!("Cannot read navigation document: {}", err),
                )
                .with_path(&item.href)
                .in_section("navigation"),
            );
            return;
        }
    };
    let parsed = if is_ncx {
        parse_ncx(&bytes, &item.href)
    } else {
        parse_nav_xhtml(&bytes, &item.href)
    };
    match parsed {
        Ok(nav) if !nav.has_toc() => report.push(
            ValidationDiagnostic::warning("NAV_TOC_EMPTY", "Table of contents has no entries.")
                .with_path(&item.href)
                .in_section("navigation"),
        ),
        Ok(_) => {}
        Err(err) => report.push(
            ValidationDiagnostic::error(
                "NAV_DOCUMENT_PARSE_ERROR",
                format!("Failed to parse navigation document: {}", err),
            )
            .with_path(&item.href)
            .in_section("navigation"),
        ),
    }
}

fn check_overlays<R: Read + Seek>(
    zip: &mut StreamingZip<R>,
    package: &Package,
    report: &mut ValidationReport,
) {
    let mut checked = BTreeSet::new();
    for item in package.manifest.iter() {
        let Some(overlay_id) = item.media_overlay.as_deref() else {
            continue;
        };
        let Some(smil) = package
            .manifest
            .get(overlay_id)
            .filter(|smil| smil.media_type == SMIL_MEDIA_TYPE)
        else {
            report.push(
                ValidationDiagnostic::error(
                    "MEDIA_OVERLAY_TARGET_INVALID",
                    format!(
                        "Manifest item '{}' names media overlay '{}', which is not a SMIL item.",
                        item.id, overlay_id
                    ),
                )
                .with_path(&item.href)
                .in_section("media-overlays"),
            );
            continue;
        };
        if !checked.insert(smil.id.as_str()) {
            continue;
        }
        // Missing files are already reported by the manifest check.
        let Ok(bytes) = zip.read_by_name(&smil.href) else {
            continue;
        };
        if let Err(err) = parse_media_overlay(&bytes, &smil.id, &smil.href) {
            report.push(
                ValidationDiagnostic::warning("MEDIA_OVERLAY_UNPARSABLE", err.to_string())
                    .with_path(&smil.href)
                    .in_section("media-overlays"),
            );
        }
    }
}

fn check_package_metadata(package: &Package, report: &mut ValidationReport) {
    let metadata = &package.metadata;
    let missing = [
        ("METADATA_TITLE_MISSING", "dc:title", metadata.titles.is_empty()),
        (
            "METADATA_IDENTIFIER_MISSING",
            "dc:identifier",
            metadata.identifiers.is_empty(),
        ),
        (
            "METADATA_LANGUAGE_MISSING",
            "dc:language",
            metadata.languages.is_empty(),
        ),
        (
            "METADATA_MODIFIED_MISSING",
            "dcterms:modified",
            metadata.version != EpubVersion::V2_0 && metadata.modified.is_none(),
        ),
    ];
    for (code, element, is_missing) in missing {
        if is_missing {
            report.push(
                ValidationDiagnostic::warning(
                    code,
                    format!("Package metadata has no `{}`.", element),
                )
                .with_path(&package.path)
                .in_section("metadata"),
            );
        }
    }
}

fn check_encryption<R: Read + Seek>(zip: &mut StreamingZip<R>, report: &mut ValidationReport) {
    if zip.contains(RIGHTS_PATH) {
        let parsed = zip
            .read_by_name(RIGHTS_PATH)
            .map_err(|err| err.to_string())
            .and_then(|bytes| check_well_formed(RIGHTS_PATH, &bytes).map_err(|e| e.to_string()));
        if let Err(err) = parsed {
            report.push(
                ValidationDiagnostic::warning(
                    "RIGHTS_XML_UNPARSABLE",
                    format!("Could not parse `{}`: {}", RIGHTS_PATH, err),
                )
                .with_path(RIGHTS_PATH)
                .in_section("ocf"),
            );
        }
    }

    if !zip.contains(ENCRYPTION_PATH) {
        return;
    }
    let parsed = zip
        .read_by_name(ENCRYPTION_PATH)
        .map_err(|err| err.to_string())
        .and_then(|bytes| parse_encryption_xml(&bytes).map_err(|e| e.to_string()));
    let encryption = match parsed {
        Ok(encryption) => encryption,
        Err(err) => {
            report.push(
                ValidationDiagnostic::error(
                    "ENCRYPTION_XML_PARSE_ERROR",
                    format!("Failed to parse `{}`: {}", ENCRYPTION_PATH, err),
                )
                .with_path(ENCRYPTION_PATH)
                .in_section("ocf"),
            );
            return;
        }
    };

    for resource in &encryption.resources {
        if !is_external(&resource.path) && !zip.contains(&resource.path) {
            report.push(
                ValidationDiagnostic::error(
                    "ENCRYPTION_REFERENCE_MISSING",
                    format!(
                        "`encryption.xml` references missing resource '{}'.",
                        resource.path
                    ),
                )
                .with_path(ENCRYPTION_PATH)
                .in_section("ocf"),
            );
        }
        if resource.kind == EncryptionKind::Unknown {
            report.push(
                ValidationDiagnostic::warning(
                    "ENCRYPTION_ALGORITHM_UNKNOWN",
                    format!(
                        "Unrecognized encryption algorithm '{}' for '{}'.",
                        resource.algorithm, resource.path
                    ),
                )
                .with_path(ENCRYPTION_PATH)
                .in_section("ocf"),
            );
        }
    }

    if encryption.has_drm() {
        report.push(
            ValidationDiagnostic::info(
                "CONTENT_ENCRYPTED",
                "Some resources are encrypted and cannot be read without a license.",
            )
            .with_path(ENCRYPTION_PATH)
            .in_section("ocf"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sample_epub, EpubFixture, ZipBuilder, PNG_1X1};
    use std::io::Cursor;

    fn validate(bytes: Vec<u8>) -> ValidationReport {
        validate_epub_reader(Cursor::new(bytes))
    }

    fn codes(report: &ValidationReport) -> Vec<&'static str> {
        report.diagnostics().iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_sample_epub_is_clean() {
        let report = validate(sample_epub());
        assert_eq!(report.profile(), ValidationProfile::Epub);
        assert!(report.diagnostics().is_empty(), "{:?}", codes(&report));
        assert!(report.is_valid());
    }

    #[test]
    fn test_empty_archive_is_invalid() {
        let report = validate(ZipBuilder::new().finish());
        assert!(!report.is_valid());
        assert!(report.has_code("ARCHIVE_EMPTY"));
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn test_garbage_is_reported_not_raised() {
        let report = validate(b"not a zip".to_vec());
        assert!(!report.is_valid());
        assert!(report.has_code("ARCHIVE_UNREADABLE"));
    }

    #[test]
    fn test_images_without_metadata_is_info_only() {
        let bytes = ZipBuilder::new()
            .stored("page01.png", PNG_1X1)
            .stored("page02.png", PNG_1X1)
            .finish();
        let report = validate(bytes);
        assert_eq!(report.profile(), ValidationProfile::ImageSequence);
        assert!(report.is_valid());
        assert_eq!(codes(&report), vec!["METADATA_MISSING"]);
        assert_eq!(report.info_count(), 1);
    }

    #[test]
    fn test_image_sequence_without_images() {
        let bytes = ZipBuilder::new().stored("notes.txt", "hi").finish();
        let report = validate(bytes);
        assert!(!report.is_valid());
        assert!(report.has_code("NO_IMAGES"));
    }

    #[test]
    fn test_page_gaps_and_duplicates() {
        let bytes = ZipBuilder::new()
            .stored("p1.png", PNG_1X1)
            .stored("p2.png", PNG_1X1)
            .stored("dir/p2.png", PNG_1X1)
            .stored("p5.png", PNG_1X1)
            .stored("ComicInfo.xml", "<ComicInfo><Title>T</Title></ComicInfo>")
            .finish();
        let report = validate(bytes);
        assert!(report.is_valid());
        assert_eq!(
            codes(&report),
            vec!["PAGE_NUMBER_DUPLICATE", "PAGE_SEQUENCE_GAP"]
        );
    }

    #[test]
    fn test_page_order_skipped_when_names_are_ambiguous() {
        let bytes = ZipBuilder::new()
            .stored("vol1_p1.png", PNG_1X1)
            .stored("vol1_p9.png", PNG_1X1)
            .stored("metadata.opf", "<metadata><title>T</title></metadata>")
            .finish();
        let report = validate(bytes);
        assert!(report.diagnostics().is_empty(), "{:?}", codes(&report));
    }

    #[test]
    fn test_bad_image_and_bad_sidecar_are_warnings() {
        let bytes = ZipBuilder::new()
            .stored("001.jpg", "this is not a jpeg")
            .stored("ComicInfo.xml", "<ComicInfo><Title>T</ComicInfo>")
            .stored("__MACOSX/._001.jpg", "fork")
            .finish();
        let report = validate(bytes);
        assert!(report.is_valid());
        assert!(report.has_code("IMAGE_FORMAT_UNKNOWN"));
        assert!(report.has_code("METADATA_UNPARSABLE"));
        assert!(report.has_code("MACOS_RESOURCE_FORKS"));
        assert!(!report.has_code("METADATA_MISSING"));
    }

    #[test]
    fn test_svg_detection() {
        assert!(looks_like_svg(b"<?xml version='1.0'?><svg xmlns='x'/>"));
        assert!(!looks_like_svg(b"GIF89a"));
    }

    #[test]
    fn test_page_number() {
        assert_eq!(page_number("Chapter/page_012.jpg"), Some(12));
        assert_eq!(page_number("cover.jpg"), None);
        assert_eq!(page_number("v2_p3.jpg"), None);
        assert_eq!(page_number("12abc.png"), None);
        assert_eq!(page_number("007.png"), Some(7));
    }

    #[test]
    fn test_number_not_ending_the_stem_skips_page_order() {
        let bytes = ZipBuilder::new()
            .stored("1.png", PNG_1X1)
            .stored("12abc.png", PNG_1X1)
            .stored("ComicInfo.xml", "<ComicInfo><Title>T</Title></ComicInfo>")
            .finish();
        let report = validate(bytes);
        assert!(report.diagnostics().is_empty(), "{:?}", codes(&report));
    }

    #[test]
    fn test_epub_images_come_from_the_manifest() {
        let opf = r#"<package version="3.0" unique-identifier="id"><metadata>
            <dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">T</dc:title></metadata>
            <manifest>
              <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
              <item id="plate" href="plates/plate.bin" media-type="image/png"/>
            </manifest>
            <spine><itemref idref="ch1"/></spine></package>"#;
        let bytes = EpubFixture::new()
            .raw_opf(opf)
            .file("OEBPS/plates/plate.bin", "not a png at all")
            .file("OEBPS/stray.jpg", "not a jpeg either")
            .build();
        let report = validate(bytes);
        let unknown: Vec<&str> = report
            .diagnostics()
            .iter()
            .filter(|d| d.code == "IMAGE_FORMAT_UNKNOWN")
            .filter_map(|d| d.path.as_deref())
            .collect();
        assert_eq!(unknown, vec!["OEBPS/plates/plate.bin"]);
    }

    #[test]
    fn test_compressed_mimetype_is_error() {
        let report = validate(EpubFixture::new().compress_mimetype().build());
        assert!(!report.is_valid());
        assert!(report.has_code("OCF_MIMETYPE_COMPRESSED"));
    }

    #[test]
    fn test_missing_container_xml() {
        let bytes = ZipBuilder::new()
            .stored("mimetype", "application/epub+zip")
            .finish();
        let report = validate(bytes);
        assert!(report.has_code("OCF_CONTAINER_XML_MISSING"));
    }

    #[test]
    fn test_spine_and_metadata_problems() {
        let bytes = EpubFixture::new()
            .extra_spine(r#"<itemref idref="ghost"/><itemref idref="audio"/>"#)
            .build();
        let report = validate(bytes);
        assert!(report.has_code("SPINE_IDREF_NOT_IN_MANIFEST"));
        assert!(report.has_code("SPINE_ITEM_NON_XHTML"));
        assert!(!report.is_valid());
    }

    #[test]
    fn test_manifest_problems() {
        let opf = r#"<package version="3.0"><metadata>
            <dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">T</dc:title></metadata>
            <manifest>
              <item id="a" href="a.xhtml" media-type="application/xhtml+xml" fallback="b"/>
              <item id="b" href="b.xhtml" media-type="application/xhtml+xml" fallback="a"/>
              <item id="a" href="gone.xhtml" media-type="application/xhtml+xml"/>
              <item id="c" href="c.xhtml" media-type="application/xhtml+xml" fallback="nope"/>
            </manifest><spine/></package>"#;
        let bytes = EpubFixture::new().raw_opf(opf).build();
        let report = validate(bytes);
        for code in [
            "MANIFEST_FALLBACK_CYCLE",
            "MANIFEST_ID_DUPLICATE",
            "MANIFEST_RESOURCE_MISSING",
            "MANIFEST_FALLBACK_TARGET_MISSING",
            "NAV_MISSING",
            "SPINE_EMPTY",
            "METADATA_IDENTIFIER_MISSING",
            "METADATA_MODIFIED_MISSING",
        ] {
            assert!(report.has_code(code), "missing {}: {:?}", code, codes(&report));
        }
    }

    #[test]
    fn test_encryption_checks() {
        let bytes = EpubFixture::new()
            .file(
                ENCRYPTION_PATH,
                r#"<encryption><EncryptedData>
                    <EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes256-cbc"/>
                    <CipherData><CipherReference URI="OEBPS/ch2.xhtml"/></CipherData>
                </EncryptedData><EncryptedData>
                    <EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
                    <CipherData><CipherReference URI="OEBPS/fonts/missing.otf"/></CipherData>
                </EncryptedData></encryption>"#,
            )
            .build();
        let report = validate(bytes);
        assert!(report.has_code("CONTENT_ENCRYPTED"));
        assert!(report.has_code("ENCRYPTION_REFERENCE_MISSING"));
    }

    #[test]
    fn test_explicit_profile_overrides_detection() {
        let options = ValidationOptions {
            profile: ValidationProfile::ImageSequence,
            ..ValidationOptions::default()
        };
        let report = validate_epub_reader_with_options(Cursor::new(sample_epub()), options);
        assert_eq!(report.profile(), ValidationProfile::ImageSequence);
        assert!(report.has_code("METADATA_MISSING"));
    }
}
