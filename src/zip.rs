//! Streaming ZIP reader for OCF containers
//!
//! Reads the central directory once and inflates individual entries on
//! demand, so opening a book costs one directory scan no matter how large
//! the archive is. Supports stored and DEFLATE entries (via miniz_oxide)
//! with CRC32 verification.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use log;
use miniz_oxide::{DataFormat, MZFlush, MZStatus};
use std::io::{Read, Seek, SeekFrom, Write};

/// Default cap on central directory entries.
const DEFAULT_MAX_ENTRIES: usize = 65_535;

/// Maximum filename length in ZIP entries
const MAX_FILENAME_LEN: usize = 1024;

/// Chunk size used while streaming entry data.
const IO_CHUNK: usize = 8 * 1024;

/// Upper bound on the buffer reserved up front for a whole-entry read.
const MAX_PREALLOC: usize = 256 * 1024;

/// Runtime-configurable ZIP safety limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum compressed or uncompressed file size allowed for reads.
    pub max_file_read_size: usize,
    /// Maximum allowed size for the required `mimetype` entry.
    pub max_mimetype_size: usize,
    /// Maximum number of central directory entries loaded.
    pub max_entries: usize,
    /// Whether ZIP parsing should fail on strict structural issues.
    pub strict: bool,
    /// Maximum bytes scanned from file tail while searching for EOCD.
    pub max_eocd_scan: usize,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_file_read_size: usize::MAX,
            max_mimetype_size: 1024,
            max_entries: DEFAULT_MAX_ENTRIES,
            strict: false,
            max_eocd_scan: MAX_EOCD_SCAN,
        }
    }
}

impl ZipLimits {
    /// Create explicit ZIP limits.
    pub fn new(max_file_read_size: usize, max_mimetype_size: usize) -> Self {
        Self {
            max_file_read_size,
            max_mimetype_size,
            ..Self::default()
        }
    }

    /// Enable or disable strict ZIP parsing behavior.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Cap the number of central directory entries.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set a cap for EOCD tail scan bytes.
    pub fn with_max_eocd_scan(mut self, max_eocd_scan: usize) -> Self {
        self.max_eocd_scan = max_eocd_scan.max(EOCD_MIN_SIZE);
        self
    }
}

/// Local file header signature (little-endian)
const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;

/// Central directory entry signature (little-endian)
const SIG_CD_ENTRY: u32 = 0x02014b50;

/// End of central directory signature (little-endian)
const SIG_EOCD: u32 = 0x06054b50;
/// ZIP64 end of central directory locator signature (little-endian)
const SIG_ZIP64_EOCD_LOCATOR: u32 = 0x07064b50;
/// Minimum EOCD record size in bytes
const EOCD_MIN_SIZE: usize = 22;
/// Maximum EOCD search window (EOCD + max comment length)
const MAX_EOCD_SCAN: usize = EOCD_MIN_SIZE + u16::MAX as usize;

/// Compression methods
pub(crate) const METHOD_STORED: u16 = 0;
pub(crate) const METHOD_DEFLATED: u16 = 8;

/// Exact contents of the OCF `mimetype` entry.
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

// Re-export the crate's public ZIP error alias for module consumers.
pub use crate::error::ZipError;

#[derive(Clone, Copy, Debug)]
struct EocdInfo {
    cd_offset: u64,
    cd_size: u32,
    num_entries: u16,
    uses_zip64: bool,
}

/// Central directory entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdEntry {
    /// Compression method (0=stored, 8=deflated)
    pub method: u16,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// Offset to local file header
    pub local_header_offset: u32,
    /// CRC32 checksum
    pub crc32: u32,
    /// Archive path
    pub filename: String,
}

impl CdEntry {
    /// Directory placeholders carry a trailing slash and no data.
    pub fn is_dir(&self) -> bool {
        self.filename.ends_with('/')
    }
}

/// Where and how the `mimetype` entry was stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MimetypePlacement {
    /// `mimetype` is the first entry in the archive.
    pub first_entry: bool,
    /// `mimetype` is stored without compression.
    pub stored: bool,
}

impl MimetypePlacement {
    /// Both OCF placement rules hold.
    pub fn is_conformant(&self) -> bool {
        self.first_entry && self.stored
    }
}

/// Streaming ZIP file reader
pub struct StreamingZip<F: Read + Seek> {
    /// File handle
    file: F,
    /// Central directory entries in archive order
    entries: Vec<CdEntry>,
    /// Number of entries declared by the EOCD record
    declared_entries: usize,
    /// Resource/safety limits
    limits: ZipLimits,
}

impl<F: Read + Seek> StreamingZip<F> {
    /// Open a ZIP file and parse the central directory
    pub fn new(file: F) -> Result<Self, ZipError> {
        Self::new_with_limits(file, None)
    }

    /// Open a ZIP file with explicit runtime limits.
    pub fn new_with_limits(mut file: F, limits: Option<ZipLimits>) -> Result<Self, ZipError> {
        let limits = limits.unwrap_or_default();
        let eocd = Self::find_eocd(&mut file, limits.max_eocd_scan.min(MAX_EOCD_SCAN))?;
        if eocd.uses_zip64 {
            return Err(ZipError::UnsupportedZip64);
        }
        let declared = eocd.num_entries as usize;
        if limits.strict && declared > limits.max_entries {
            return Err(ZipError::TooManyEntries);
        }

        file.seek(SeekFrom::Start(eocd.cd_offset))
            .map_err(|_| ZipError::IoError)?;
        let cd_end = eocd.cd_offset + eocd.cd_size as u64;

        let mut entries = Vec::with_capacity(declared.min(limits.max_entries));
        for _ in 0..declared.min(limits.max_entries) {
            let pos = file.stream_position().map_err(|_| ZipError::IoError)?;
            if pos >= cd_end {
                if limits.strict {
                    return Err(ZipError::InvalidFormat);
                }
                break;
            }
            match Self::read_cd_entry(&mut file)? {
                Some(entry) => entries.push(entry),
                None if limits.strict => return Err(ZipError::InvalidFormat),
                None => break,
            }
        }

        if declared > entries.len() {
            log::warn!(
                "[ZIP] Archive declares {} entries but only {} were loaded (max: {})",
                declared,
                entries.len(),
                limits.max_entries
            );
        }

        log::debug!(
            "[ZIP] Parsed {} central directory entries (offset {})",
            entries.len(),
            eocd.cd_offset
        );

        Ok(Self {
            file,
            entries,
            declared_entries: declared,
            limits,
        })
    }

    /// Find EOCD and extract central directory info
    fn find_eocd(file: &mut F, max_eocd_scan: usize) -> Result<EocdInfo, ZipError> {
        let file_size = file.seek(SeekFrom::End(0)).map_err(|_| ZipError::IoError)?;

        if file_size < EOCD_MIN_SIZE as u64 {
            return Err(ZipError::InvalidFormat);
        }

        // Scan last (EOCD + max comment) bytes for EOCD signature.
        let scan_range = file_size.min(max_eocd_scan as u64) as usize;
        let mut buffer = alloc::vec![0u8; scan_range];

        file.seek(SeekFrom::Start(file_size - scan_range as u64))
            .map_err(|_| ZipError::IoError)?;
        file.read_exact(&mut buffer).map_err(|_| ZipError::IoError)?;
        let scan_base = file_size - scan_range as u64;

        for i in (0..=scan_range.saturating_sub(EOCD_MIN_SIZE)).rev() {
            if read_u32_le(&buffer, i) != SIG_EOCD {
                continue;
            }
            let num_entries = read_u16_le(&buffer, i + 10);
            let cd_size = read_u32_le(&buffer, i + 12);
            let cd_offset = read_u32_le(&buffer, i + 16) as u64;
            let comment_len = read_u16_le(&buffer, i + 20) as u64;
            let eocd_pos = scan_base + i as u64;
            if eocd_pos + EOCD_MIN_SIZE as u64 + comment_len != file_size {
                continue;
            }

            let cd_end = cd_offset
                .checked_add(cd_size as u64)
                .ok_or(ZipError::InvalidFormat)?;
            if cd_end > eocd_pos {
                return Err(ZipError::InvalidFormat);
            }

            let uses_zip64_sentinel =
                num_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX as u64;
            let uses_zip64_locator = if eocd_pos >= 20 {
                file.seek(SeekFrom::Start(eocd_pos - 20))
                    .map_err(|_| ZipError::IoError)?;
                let mut locator_sig = [0u8; 4];
                file.read_exact(&mut locator_sig)
                    .map_err(|_| ZipError::IoError)?;
                u32::from_le_bytes(locator_sig) == SIG_ZIP64_EOCD_LOCATOR
            } else {
                false
            };

            return Ok(EocdInfo {
                cd_offset,
                cd_size,
                num_entries,
                uses_zip64: uses_zip64_sentinel || uses_zip64_locator,
            });
        }

        Err(ZipError::InvalidFormat)
    }

    /// Read a central directory entry from file
    fn read_cd_entry(file: &mut F) -> Result<Option<CdEntry>, ZipError> {
        let mut sig_buf = [0u8; 4];
        if file.read_exact(&mut sig_buf).is_err() {
            return Ok(None);
        }
        if u32::from_le_bytes(sig_buf) != SIG_CD_ENTRY {
            return Ok(None);
        }

        // Fixed portion after the signature; buf[N] is CD offset N + 4.
        let mut buf = [0u8; 42];
        file.read_exact(&mut buf).map_err(|_| ZipError::IoError)?;

        let method = read_u16_le(&buf, 6);
        let crc32 = read_u32_le(&buf, 12);
        let compressed_size = read_u32_le(&buf, 16);
        let uncompressed_size = read_u32_le(&buf, 20);
        let name_len = read_u16_le(&buf, 24) as usize;
        let extra_len = read_u16_le(&buf, 26) as usize;
        let comment_len = read_u16_le(&buf, 28) as usize;
        let local_header_offset = read_u32_le(&buf, 38);

        let mut filename = String::new();
        if name_len > 0 && name_len <= MAX_FILENAME_LEN {
            let mut name_buf = alloc::vec![0u8; name_len];
            file.read_exact(&mut name_buf)
                .map_err(|_| ZipError::IoError)?;
            filename = String::from_utf8_lossy(&name_buf).to_string();
        } else if name_len > MAX_FILENAME_LEN {
            file.seek(SeekFrom::Current(name_len as i64))
                .map_err(|_| ZipError::IoError)?;
        }

        let skip_bytes = extra_len + comment_len;
        if skip_bytes > 0 {
            file.seek(SeekFrom::Current(skip_bytes as i64))
                .map_err(|_| ZipError::IoError)?;
        }

        Ok(Some(CdEntry {
            method,
            compressed_size,
            uncompressed_size,
            local_header_offset,
            crc32,
            filename,
        }))
    }

    /// Get entry by filename.
    ///
    /// Exact matches win; otherwise the lookup is case-insensitive and
    /// ignores a leading slash on either side.
    pub fn get_entry(&self, name: &str) -> Option<&CdEntry> {
        let trimmed = name.trim_start_matches('/');
        self.entries
            .iter()
            .find(|e| e.filename == name)
            .or_else(|| {
                self.entries.iter().find(|e| {
                    e.filename
                        .trim_start_matches('/')
                        .eq_ignore_ascii_case(trimmed)
                })
            })
    }

    /// Whether an entry with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get_entry(name).is_some()
    }

    /// Read a whole entry into memory by name.
    pub fn read_by_name(&mut self, name: &str) -> Result<Vec<u8>, ZipError> {
        let entry = self.get_entry(name).cloned().ok_or(ZipError::FileNotFound)?;
        self.read_to_vec(&entry)
    }

    /// Read a whole entry into memory.
    pub fn read_to_vec(&mut self, entry: &CdEntry) -> Result<Vec<u8>, ZipError> {
        // The declared size is untrusted; grow past the cap as data arrives.
        let mut out = Vec::with_capacity(
            (entry.uncompressed_size as usize)
                .min(self.limits.max_file_read_size)
                .min(MAX_PREALLOC),
        );
        self.read_file_to_writer(entry, &mut out)?;
        Ok(out)
    }

    /// Stream a file's decompressed bytes into an arbitrary writer.
    pub fn read_file_to_writer<W: Write>(
        &mut self,
        entry: &CdEntry,
        writer: &mut W,
    ) -> Result<usize, ZipError> {
        if entry.uncompressed_size as usize > self.limits.max_file_read_size
            || entry.compressed_size as usize > self.limits.max_file_read_size
        {
            return Err(ZipError::FileTooLarge);
        }

        let data_offset = self.calc_data_offset(entry)?;
        self.file
            .seek(SeekFrom::Start(data_offset))
            .map_err(|_| ZipError::IoError)?;

        let mut input_buf = alloc::vec![0u8; IO_CHUNK];
        match entry.method {
            METHOD_STORED => {
                let mut remaining = entry.compressed_size as usize;
                let mut hasher = crc32fast::Hasher::new();
                let mut written = 0usize;

                while remaining > 0 {
                    let take = remaining.min(input_buf.len());
                    self.file
                        .read_exact(&mut input_buf[..take])
                        .map_err(|_| ZipError::IoError)?;
                    writer
                        .write_all(&input_buf[..take])
                        .map_err(|_| ZipError::IoError)?;
                    hasher.update(&input_buf[..take]);
                    written += take;
                    remaining -= take;
                }

                if entry.crc32 != 0 && hasher.finalize() != entry.crc32 {
                    return Err(ZipError::CrcMismatch);
                }
                Ok(written)
            }
            METHOD_DEFLATED => {
                let mut output_buf = alloc::vec![0u8; IO_CHUNK];
                let mut state = alloc::boxed::Box::new(
                    miniz_oxide::inflate::stream::InflateState::new(DataFormat::Raw),
                );
                let mut compressed_remaining = entry.compressed_size as usize;
                let mut pending_start = 0usize;
                let mut pending_end = 0usize;
                let mut written = 0usize;
                let mut hasher = crc32fast::Hasher::new();

                loop {
                    if pending_start == pending_end && compressed_remaining > 0 {
                        let take = compressed_remaining.min(input_buf.len());
                        self.file
                            .read_exact(&mut input_buf[..take])
                            .map_err(|_| ZipError::IoError)?;
                        pending_start = 0;
                        pending_end = take;
                        compressed_remaining -= take;
                    }

                    // `Finish` would ask for one-shot output; stream until StreamEnd instead.
                    let result = miniz_oxide::inflate::stream::inflate(
                        &mut state,
                        &input_buf[pending_start..pending_end],
                        &mut output_buf,
                        MZFlush::None,
                    );
                    let consumed = result.bytes_consumed;
                    let produced = result.bytes_written;
                    pending_start += consumed;

                    if produced > 0 {
                        writer
                            .write_all(&output_buf[..produced])
                            .map_err(|_| ZipError::IoError)?;
                        hasher.update(&output_buf[..produced]);
                        written += produced;
                        if written > self.limits.max_file_read_size {
                            return Err(ZipError::FileTooLarge);
                        }
                    }

                    match result.status {
                        Ok(MZStatus::StreamEnd) => break,
                        Ok(MZStatus::Ok) => {
                            if consumed == 0 && produced == 0 {
                                return Err(ZipError::DecompressError);
                            }
                        }
                        Ok(MZStatus::NeedDict) | Err(_) => {
                            return Err(ZipError::DecompressError);
                        }
                    }
                }

                if entry.crc32 != 0 && hasher.finalize() != entry.crc32 {
                    return Err(ZipError::CrcMismatch);
                }
                Ok(written)
            }
            _ => Err(ZipError::UnsupportedCompression),
        }
    }

    /// Calculate the offset to the actual file data (past local header)
    fn calc_data_offset(&mut self, entry: &CdEntry) -> Result<u64, ZipError> {
        let offset = entry.local_header_offset as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|_| ZipError::IoError)?;

        let mut header = [0u8; 30];
        self.file
            .read_exact(&mut header)
            .map_err(|_| ZipError::IoError)?;

        if read_u32_le(&header, 0) != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::InvalidFormat);
        }

        let name_len = read_u16_le(&header, 26) as u64;
        let extra_len = read_u16_le(&header, 28) as u64;
        Ok(offset + 30 + name_len + extra_len)
    }

    /// Validate the OCF `mimetype` entry.
    ///
    /// The entry must exist and contain exactly `application/epub+zip`.
    /// Returns where it was found so callers can enforce (or merely report)
    /// the first-entry/stored placement rule.
    pub fn validate_mimetype(&mut self) -> Result<MimetypePlacement, ZipError> {
        let entry = self
            .get_entry("mimetype")
            .ok_or_else(|| {
                ZipError::InvalidMimetype("mimetype file not found in archive".to_string())
            })?
            .clone();

        if entry.uncompressed_size as usize > self.limits.max_mimetype_size {
            return Err(ZipError::InvalidMimetype(
                "mimetype file too large".to_string(),
            ));
        }

        let bytes = self.read_to_vec(&entry)?;
        let content = core::str::from_utf8(&bytes).map_err(|_| {
            ZipError::InvalidMimetype("mimetype file is not valid UTF-8".to_string())
        })?;

        // Trailing newlines from hand-made archives are tolerated.
        if content.trim_end_matches(['\r', '\n']) != EPUB_MIMETYPE {
            return Err(ZipError::InvalidMimetype(alloc::format!(
                "expected '{}', got '{}'",
                EPUB_MIMETYPE,
                content
            )));
        }

        Ok(MimetypePlacement {
            first_entry: self
                .entries
                .first()
                .is_some_and(|first| first.filename == entry.filename),
            stored: entry.method == METHOD_STORED,
        })
    }

    /// Check if this archive carries a valid EPUB mimetype marker.
    pub fn is_valid_epub(&mut self) -> bool {
        self.validate_mimetype().is_ok()
    }

    /// Number of loaded central directory entries.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries the EOCD record claims.
    pub fn declared_entries(&self) -> usize {
        self.declared_entries
    }

    /// Iterate over all entries in archive order.
    pub fn entries(&self) -> impl Iterator<Item = &CdEntry> {
        self.entries.iter()
    }

    /// Get the active limits used by this ZIP reader.
    pub fn limits(&self) -> ZipLimits {
        self.limits
    }
}

/// Read u16 from buffer at offset (little-endian)
fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Read u32 from buffer at offset (little-endian)
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ZipBuilder;
    use std::io::Cursor;

    fn open(bytes: Vec<u8>) -> StreamingZip<Cursor<Vec<u8>>> {
        StreamingZip::new(Cursor::new(bytes)).expect("archive should open")
    }

    fn add_zip_comment(mut zip: Vec<u8>, comment_len: usize) -> Vec<u8> {
        let eocd_pos = zip.len() - EOCD_MIN_SIZE;
        let comment_len = comment_len as u16;
        zip[eocd_pos + 20..eocd_pos + 22].copy_from_slice(&comment_len.to_le_bytes());
        zip.extend_from_slice(&vec![b'A'; comment_len as usize]);
        zip
    }

    #[test]
    fn test_validate_mimetype_success() {
        let data = ZipBuilder::new().stored("mimetype", EPUB_MIMETYPE).finish();
        let placement = open(data).validate_mimetype().unwrap();
        assert!(placement.is_conformant());
    }

    #[test]
    fn test_validate_mimetype_reports_placement() {
        let data = ZipBuilder::new()
            .stored("META-INF/container.xml", "<container/>")
            .deflated("mimetype", EPUB_MIMETYPE)
            .finish();
        let placement = open(data).validate_mimetype().unwrap();
        assert!(!placement.first_entry);
        assert!(!placement.stored);
    }

    #[test]
    fn test_validate_mimetype_wrong_content() {
        let data = ZipBuilder::new().stored("mimetype", "text/plain").finish();
        match open(data).validate_mimetype() {
            Err(ZipError::InvalidMimetype(msg)) => assert!(msg.contains("text/plain")),
            other => panic!("Expected InvalidMimetype, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_mimetype_missing_file() {
        let data = ZipBuilder::new().stored("not_mimetype.txt", "hello").finish();
        let mut zip = open(data);
        match zip.validate_mimetype() {
            Err(ZipError::InvalidMimetype(msg)) => assert!(msg.contains("not found")),
            other => panic!("Expected InvalidMimetype, got {:?}", other),
        }
        assert!(!zip.is_valid_epub());
    }

    #[test]
    fn test_eocd_found_with_long_comment() {
        let data = add_zip_comment(
            ZipBuilder::new().stored("mimetype", EPUB_MIMETYPE).finish(),
            2_000,
        );
        let mut zip = StreamingZip::new(Cursor::new(data)).expect("EOCD should be discoverable");
        assert!(zip.is_valid_epub());
    }

    #[test]
    fn test_eocd_scan_limit_rejects_long_tail() {
        let data = add_zip_comment(
            ZipBuilder::new().stored("mimetype", EPUB_MIMETYPE).finish(),
            2_000,
        );
        let limits = ZipLimits::new(1024 * 1024, 1024).with_max_eocd_scan(128);
        let result = StreamingZip::new_with_limits(Cursor::new(data), Some(limits));
        assert!(matches!(result, Err(ZipError::InvalidFormat)));
    }

    #[test]
    fn test_zip64_sentinel_rejected() {
        let mut data = ZipBuilder::new().stored("mimetype", EPUB_MIMETYPE).finish();
        let eocd_pos = data.len() - EOCD_MIN_SIZE;
        data[eocd_pos + 10..eocd_pos + 12].copy_from_slice(&u16::MAX.to_le_bytes());
        let result = StreamingZip::new(Cursor::new(data));
        assert!(matches!(result, Err(ZipError::UnsupportedZip64)));
    }

    #[test]
    fn test_garbage_is_not_a_zip() {
        let result = StreamingZip::new(Cursor::new(b"definitely not a zip archive".to_vec()));
        assert!(matches!(result, Err(ZipError::InvalidFormat)));
    }

    #[test]
    fn test_strict_rejects_too_many_entries() {
        let data = ZipBuilder::new()
            .stored("a.txt", "a")
            .stored("b.txt", "b")
            .finish();
        let limits = ZipLimits::default().with_max_entries(1).with_strict(true);
        let result = StreamingZip::new_with_limits(Cursor::new(data), Some(limits));
        assert!(matches!(result, Err(ZipError::TooManyEntries)));
    }

    #[test]
    fn test_lenient_truncates_entries_over_limit() {
        let data = ZipBuilder::new()
            .stored("a.txt", "a")
            .stored("b.txt", "b")
            .finish();
        let limits = ZipLimits::default().with_max_entries(1);
        let zip = StreamingZip::new_with_limits(Cursor::new(data), Some(limits)).unwrap();
        assert_eq!(zip.num_entries(), 1);
        assert_eq!(zip.declared_entries(), 2);
    }

    #[test]
    fn test_empty_archive_opens_with_no_entries() {
        let zip = open(ZipBuilder::new().finish());
        assert_eq!(zip.num_entries(), 0);
    }

    #[test]
    fn test_read_stored_and_deflated_entries() {
        let text = "It was a dark and stormy night. ".repeat(500);
        let data = ZipBuilder::new()
            .stored("plain.txt", "hello")
            .deflated("story.txt", &text)
            .finish();
        let mut zip = open(data);
        assert_eq!(zip.read_by_name("plain.txt").unwrap(), b"hello");
        assert_eq!(zip.read_by_name("story.txt").unwrap(), text.as_bytes());
    }

    #[test]
    fn test_large_deflated_entries_stream_through_small_buffers() {
        // Compresses into one input chunk but inflates to many output chunks.
        let repetitive = "<p>All work and no play makes a dull chapter.</p>\n".repeat(4_000);
        // Spans several input chunks as well.
        let mut noisy = String::new();
        let mut seed = 0x2545_f491u32;
        while noisy.len() < 150_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            noisy.push_str(&format!("{:08x} ", seed));
        }
        let data = ZipBuilder::new()
            .deflated("OEBPS/long.xhtml", &repetitive)
            .deflated("OEBPS/noisy.txt", &noisy)
            .finish();
        let mut zip = open(data);
        let long = zip.get_entry("OEBPS/long.xhtml").cloned().unwrap();
        assert!((long.compressed_size as usize) < IO_CHUNK);
        assert!(repetitive.len() > 100_000);
        assert_eq!(zip.read_by_name("OEBPS/long.xhtml").unwrap(), repetitive.as_bytes());
        assert_eq!(zip.read_by_name("OEBPS/noisy.txt").unwrap(), noisy.as_bytes());
    }

    #[test]
    fn test_truncated_deflate_stream_is_an_error() {
        let text = "truncate me please ".repeat(2_000);
        let mut data = ZipBuilder::new().deflated("t.txt", &text).finish();
        let mut zip = open(data.clone());
        let entry = zip.get_entry("t.txt").cloned().unwrap();
        assert!(zip.read_to_vec(&entry).is_ok());

        // Shrink the declared compressed size in the central directory.
        let cd = data
            .windows(4)
            .rposition(|w| w == SIG_CD_ENTRY.to_le_bytes())
            .unwrap();
        let short = entry.compressed_size / 2;
        data[cd + 20..cd + 24].copy_from_slice(&short.to_le_bytes());
        let mut zip = open(data);
        assert!(zip.read_by_name("t.txt").is_err());
    }

    #[test]
    fn test_declared_size_does_not_drive_allocation() {
        let mut data = ZipBuilder::new().stored("small.txt", "tiny").finish();
        let cd = data
            .windows(4)
            .rposition(|w| w == SIG_CD_ENTRY.to_le_bytes())
            .unwrap();
        data[cd + 24..cd + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        let mut zip = open(data);
        let entry = zip.get_entry("small.txt").cloned().unwrap();
        assert_eq!(entry.uncompressed_size, 0xFFFF_FFF0);
        let bytes = zip.read_to_vec(&entry).unwrap();
        assert_eq!(bytes, b"tiny");
        assert!(bytes.capacity() <= MAX_PREALLOC);
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut data = ZipBuilder::new().stored("a.txt", "abcdef").finish();
        let payload = data.windows(6).position(|w| w == b"abcdef").unwrap();
        data[payload] = b'X';
        let mut zip = open(data);
        assert!(matches!(
            zip.read_by_name("a.txt"),
            Err(ZipError::CrcMismatch)
        ));
    }

    #[test]
    fn test_lookup_is_case_insensitive_after_exact() {
        let data = ZipBuilder::new()
            .stored("OEBPS/Cover.JPG", "x")
            .finish();
        let zip = open(data);
        assert!(zip.get_entry("OEBPS/Cover.JPG").is_some());
        assert!(zip.get_entry("oebps/cover.jpg").is_some());
        assert!(zip.get_entry("/OEBPS/Cover.JPG").is_some());
        assert!(zip.get_entry("OEBPS/other.jpg").is_none());
    }

    #[test]
    fn test_zip_limits_enforced_when_configured() {
        let data = ZipBuilder::new().stored("data.txt", "1234567890").finish();
        let limits = ZipLimits::new(8, 8);
        let mut zip = StreamingZip::new_with_limits(Cursor::new(data), Some(limits)).unwrap();
        assert!(matches!(
            zip.read_by_name("data.txt"),
            Err(ZipError::FileTooLarge)
        ));
    }

    #[test]
    fn test_missing_entry_is_file_not_found() {
        let mut zip = open(ZipBuilder::new().stored("a.txt", "a").finish());
        assert_eq!(zip.read_by_name("b.txt"), Err(ZipError::FileNotFound));
    }
}
