//! Small quick-xml helpers shared by the document parsers.
//!
//! Every OCF document this crate reads is namespace-tolerant: real books mix
//! prefixed (`dc:title`, `opf:role`, `epub:textref`) and bare names, so
//! matching is done on local names.

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use quick_xml::events::{BytesEnd, BytesRef, BytesStart, BytesText};
use quick_xml::reader::Reader;

use crate::error::ParseError;

/// Strip a namespace prefix (`dc:title` -> `title`).
pub(crate) fn local(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

/// Local name of a start/empty element.
pub(crate) fn start_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Local name of an end element.
pub(crate) fn end_name(e: &BytesEnd<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Collect `(qualified key, unescaped value)` pairs, skipping malformed attributes.
pub(crate) fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            let value = match quick_xml::escape::unescape(&raw) {
                Ok(unescaped) => unescaped.into_owned(),
                Err(_) => raw.clone(),
            };
            (key, value)
        })
        .collect()
}

/// Look up an attribute by local name.
pub(crate) fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| local(key) == name)
        .map(|(_, value)| value.as_str())
}

/// Append a text node to an accumulator.
pub(crate) fn push_text(out: &mut String, e: &BytesText<'_>) {
    match e.decode() {
        Ok(text) => out.push_str(&text),
        Err(_) => out.push_str(&String::from_utf8_lossy(e)),
    }
}

/// Append a resolved entity/character reference to an accumulator.
pub(crate) fn push_reference(out: &mut String, e: &BytesRef<'_>) {
    let Ok(name) = e.decode() else {
        return;
    };
    let entity = format!("&{};", name);
    match quick_xml::escape::unescape(&entity) {
        Ok(resolved) => out.push_str(&resolved),
        // Unknown named entities (XHTML `&nbsp;` in an OPF) are kept verbatim.
        Err(_) => out.push_str(&entity),
    }
}

/// Collapse runs of whitespace and trim both ends.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Convert a byte offset into a 1-based `(line, column)` pair.
pub(crate) fn line_column(content: &[u8], offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = &content[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let column = match before.iter().rposition(|&b| b == b'\n') {
        Some(newline) => offset - newline,
        None => offset + 1,
    };
    (line, column)
}

/// Build a positioned [`ParseError`] from a quick-xml failure.
pub(crate) fn parse_failure(
    path: &str,
    content: &[u8],
    reader: &Reader<&[u8]>,
    err: &quick_xml::Error,
) -> ParseError {
    let (line, column) = line_column(content, reader.error_position() as usize);
    ParseError::new(path, format!("XML parse error: {}", err)).at(line, column)
}
