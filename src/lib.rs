//! ocf-engine -- EPUB container and package parsing engine
//!
//! Opens OCF archives, parses the package document into metadata, manifest
//! and spine, resolves Canonical Fragment Identifiers, discovers cover
//! images, parses SMIL media overlays, classifies `encryption.xml`
//! declarations and validates archive structure.
//!
//! # Features
//!
//! - `std` (default) -- streaming ZIP reader, [`EpubContainer`], cover
//!   discovery and the validator
//! - `async` -- `tokio`-based file helpers
//!
//! Without `std`, the document parsers (package, metadata, manifest, spine,
//! rendition, navigation, CFI, SMIL, encryption) remain available over
//! caller-provided bytes and only need `alloc`.
//!
//! # Failure model
//!
//! Opening a container is the only fatal step: an unreadable archive, a bad
//! `mimetype`, or a missing/malformed `container.xml` or package document
//! is an [`EpubError`]. Everything else (navigation, cover, overlays,
//! encryption) degrades to an empty value, and the validator reports
//! problems as diagnostics instead of errors.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

extern crate alloc;

pub mod cfi;
pub mod encryption;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod navigation;
pub mod package;
pub mod rendition;
pub mod smil;
pub mod spine;
mod xml;

#[cfg(feature = "std")]
pub mod container;

#[cfg(feature = "std")]
pub mod cover;

#[cfg(feature = "std")]
pub mod validate;

#[cfg(feature = "async")]
pub mod async_api;

#[cfg(feature = "std")]
pub mod zip;

#[cfg(all(test, feature = "std"))]
mod testutil;

// Re-export key types for convenience
#[cfg(feature = "async")]
pub use async_api::{
    open_epub_file_async, open_epub_file_async_with_options, validate_epub_file_async,
};
pub use cfi::{generate_chapter_cfi, parse_chapter_cfi, Cfi, CfiError, ChapterLocation};
#[cfg(feature = "std")]
pub use container::{
    BookSummary, ChapterRef, ContainerBuilder, EpubContainer, OpenOptions, ValidationMode,
};
#[cfg(feature = "std")]
pub use cover::{CoverImage, CoverStrategy};
pub use encryption::{Encryption, EncryptionInfo, EncryptionKind};
pub use error::{EpubError, ParseError, ZipError, ZipErrorKind};
pub use manifest::{Manifest, ManifestItem};
pub use metadata::{EpubVersion, Metadata};
pub use navigation::{NavPoint, Navigation};
pub use package::Package;
pub use rendition::RenditionProperties;
pub use smil::{MediaOverlay, SmilElement, SmilError, SmilParallel, SmilSequence};
pub use spine::{Spine, SpineItem};
#[cfg(feature = "std")]
pub use validate::{
    validate_epub_file, validate_epub_file_with_options, validate_epub_reader,
    validate_epub_reader_with_options, ValidationDiagnostic, ValidationOptions,
    ValidationProfile, ValidationReport, ValidationSeverity,
};
#[cfg(feature = "std")]
pub use crate::zip::ZipLimits;
