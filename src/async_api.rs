//! Optional async helpers for opening and validating EPUBs.
//!
//! This module is available with the `async` feature. Files are read into
//! memory with `tokio::fs`; parsing itself stays synchronous.

extern crate alloc;

use alloc::string::ToString;
use alloc::vec::Vec;
use std::io::Cursor;
use std::path::Path;

use crate::container::{EpubContainer, OpenOptions};
use crate::error::EpubError;
use crate::validate::{validate_epub_reader_with_options, ValidationOptions, ValidationReport};

async fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, EpubError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| EpubError::Io(e.to_string()))
}

/// Read an EPUB file asynchronously and open it as an [`EpubContainer`].
pub async fn open_epub_file_async<P: AsRef<Path>>(
    path: P,
) -> Result<EpubContainer<Cursor<Vec<u8>>>, EpubError> {
    open_epub_file_async_with_options(path, OpenOptions::default()).await
}

/// Read an EPUB file asynchronously and open it with explicit options.
pub async fn open_epub_file_async_with_options<P: AsRef<Path>>(
    path: P,
    options: OpenOptions,
) -> Result<EpubContainer<Cursor<Vec<u8>>>, EpubError> {
    let bytes = read_file(path).await?;
    EpubContainer::from_reader_with_options(Cursor::new(bytes), options)
}

/// Read an archive asynchronously and validate it.
///
/// Only reading the file can fail; validation findings live in the report.
pub async fn validate_epub_file_async<P: AsRef<Path>>(
    path: P,
    options: ValidationOptions,
) -> Result<ValidationReport, EpubError> {
    let bytes = read_file(path).await?;
    Ok(validate_epub_reader_with_options(Cursor::new(bytes), options))
}
