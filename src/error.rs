//! Unified error types for ocf-engine
//!
//! Provides a top-level `EpubError` that wraps module-specific errors,
//! plus `From` impls so `?` works across module boundaries.
//!
//! Only structural failures surface here. Optional metadata, unreadable
//! cover candidates and malformed clip times degrade to defaults instead.

extern crate alloc;

use alloc::string::{String, ToString};
use core::fmt;

use crate::cfi::CfiError;
use crate::smil::SmilError;

/// Top-level error type for ocf-engine operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EpubError {
    /// Archive could not be read (corrupt ZIP, bad mimetype, I/O while inflating)
    Zip(ZipError),
    /// Malformed XML in container.xml, the package document or another required document
    Parse(ParseError),
    /// A referenced path is absent from the archive
    ResourceNotFound {
        /// Archive-absolute path that was looked up.
        path: String,
    },
    /// Malformed Canonical Fragment Identifier
    Cfi(CfiError),
    /// Invalid EPUB structure (missing rootfile, unusable package document, ...)
    InvalidEpub(String),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
    /// Chapter index requested is out of bounds
    ChapterOutOfBounds {
        /// Requested chapter index.
        index: usize,
        /// Total number of chapters available.
        chapter_count: usize,
    },
    /// Spine references a manifest item that does not exist
    ManifestItemMissing {
        /// Missing manifest `id` referenced by spine `idref`.
        idref: String,
    },
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpubError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            EpubError::Parse(err) => write!(f, "Parse error: {}", err),
            EpubError::ResourceNotFound { path } => {
                write!(f, "Resource not found in archive: {}", path)
            }
            EpubError::Cfi(err) => write!(f, "CFI error: {}", err),
            EpubError::InvalidEpub(msg) => write!(f, "Invalid EPUB: {}", msg),
            EpubError::Io(msg) => write!(f, "I/O error: {}", msg),
            EpubError::ChapterOutOfBounds {
                index,
                chapter_count,
            } => write!(
                f,
                "Chapter index {} out of bounds (chapter count: {})",
                index, chapter_count
            ),
            EpubError::ManifestItemMissing { idref } => {
                write!(f, "Spine item '{}' does not exist in manifest", idref)
            }
        }
    }
}

/// XML parse failure with the document it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Archive path of the offending document (empty when parsing detached bytes).
    pub path: String,
    /// Human-readable description of the failure.
    pub message: String,
    /// 1-based line, when derivable from the parser position.
    pub line: Option<usize>,
    /// 1-based column, when derivable from the parser position.
    pub column: Option<usize>,
}

impl ParseError {
    /// Create a parse error without position information.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Attach a line/column pair.
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Replace the document path (used when a detached parser is run for a known entry).
    pub fn in_document(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() {
            write!(f, "{}", self.path)?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, ":{}:{}", line, column)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl From<ParseError> for EpubError {
    fn from(err: ParseError) -> Self {
        EpubError::Parse(err)
    }
}

impl From<CfiError> for EpubError {
    fn from(err: CfiError) -> Self {
        EpubError::Cfi(err)
    }
}

impl From<SmilError> for EpubError {
    fn from(err: SmilError) -> Self {
        match err {
            SmilError::Malformed(parse) => EpubError::Parse(parse),
            SmilError::NotSmil { path } => EpubError::Parse(ParseError::new(
                path,
                "document root is not a <smil> element",
            )),
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// I/O error during ZIP operations
    IoError,
    /// Central directory has more entries than the configured limit
    TooManyEntries,
    /// File exceeds maximum allowed size
    FileTooLarge,
    /// Invalid or missing mimetype file
    InvalidMimetype(String),
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::IoError => write!(f, "I/O error"),
            ZipErrorKind::TooManyEntries => write!(f, "too many central directory entries"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::InvalidMimetype(msg) => write!(f, "invalid mimetype: {}", msg),
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

impl From<ZipError> for EpubError {
    fn from(err: ZipError) -> Self {
        EpubError::Zip(err)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EpubError {}

#[cfg(feature = "std")]
impl std::error::Error for ZipErrorKind {}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}
