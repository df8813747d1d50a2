//! EPUB navigation parsing (TOC, page list, landmarks)
//!
//! Supports both EPUB 3.x XHTML navigation documents (`epub:type="toc"`)
//! and EPUB 2.0 NCX fallback (`toc.ncx`). Hrefs are resolved against the
//! navigation document, so every [`NavPoint::href`] is an archive path.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ocf_engine::navigation::{parse_nav_xhtml, parse_ncx};
//!
//! # fn example() -> Result<(), ocf_engine::error::ParseError> {
//! let nav = parse_nav_xhtml(b"<html>...</html>", "OEBPS/nav.xhtml")?;
//! let nav = parse_ncx(b"<ncx>...</ncx>", "OEBPS/toc.ncx")?;
//! # Ok(())
//! # }
//! ```

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ParseError;
use crate::package::{resolve_href, split_fragment};
use crate::xml;

/// A single navigation point (table of contents entry)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavPoint {
    /// Display label for this navigation point
    pub label: String,
    /// Archive path of the target document
    pub href: String,
    /// Fragment identifier within the target, if any
    pub fragment: Option<String>,
    /// Child navigation points (for hierarchical TOC)
    pub children: Vec<NavPoint>,
}

/// Complete navigation structure for an EPUB
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Table of contents entries
    pub toc: Vec<NavPoint>,
    /// Page list entries (mapping to page numbers)
    pub page_list: Vec<NavPoint>,
    /// Landmark entries (structural navigation: cover, toc, bodymatter, etc.)
    pub landmarks: Vec<NavPoint>,
}

impl Navigation {
    /// Check if the navigation has any TOC entries
    pub fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    /// Get total number of TOC entries (including nested)
    pub fn toc_count(&self) -> usize {
        count_nav_points(&self.toc)
    }

    /// Flatten the TOC into a linear list of (depth, NavPoint) pairs
    pub fn toc_flat(&self) -> Vec<(usize, &NavPoint)> {
        let mut result = Vec::new();
        flatten_nav_points(&self.toc, 0, &mut result);
        result
    }
}

fn count_nav_points(points: &[NavPoint]) -> usize {
    points
        .iter()
        .map(|p| 1 + count_nav_points(&p.children))
        .sum()
}

fn flatten_nav_points<'a>(
    points: &'a [NavPoint],
    depth: usize,
    result: &mut Vec<(usize, &'a NavPoint)>,
) {
    for point in points {
        result.push((depth, point));
        flatten_nav_points(&point.children, depth + 1, result);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NavType {
    Toc,
    PageList,
    Landmarks,
}

impl NavType {
    fn parse(value: &str) -> Option<Self> {
        value.split_whitespace().find_map(|t| match t {
            "toc" => Some(NavType::Toc),
            "page-list" => Some(NavType::PageList),
            "landmarks" => Some(NavType::Landmarks),
            _ => None,
        })
    }
}

/// Nav point under construction
#[derive(Default)]
struct PartialNavPoint {
    href: Option<String>,
    label: String,
    children: Vec<NavPoint>,
}

impl PartialNavPoint {
    fn finish(self, doc_path: &str) -> Option<NavPoint> {
        let label = xml::normalize_whitespace(&self.label);
        let raw = self.href?;
        if label.is_empty() && self.children.is_empty() {
            return None;
        }
        let (_, fragment) = split_fragment(&raw);
        Some(NavPoint {
            label,
            href: resolve_href(doc_path, &raw),
            fragment: fragment.map(str::to_string),
            children: self.children,
        })
    }
}

/// Parse an EPUB 3.x XHTML navigation document located at `doc_path`.
///
/// `<li>` items without a link (section headings using `<span>`) are kept
/// only through their linked children.
pub fn parse_nav_xhtml(content: &[u8], doc_path: &str) -> Result<Navigation, ParseError> {
    let mut reader = Reader::from_reader(content);

    let mut nav = Navigation::default();
    let mut buf = Vec::new();
    let mut current_nav_type: Option<NavType> = None;
    let mut item_stack: Vec<PartialNavPoint> = Vec::new();
    let mut results: Vec<NavPoint> = Vec::new();
    let mut in_anchor = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match xml::start_name(&e).as_str() {
                "nav" => {
                    let attrs = xml::attributes(&e);
                    current_nav_type = xml::attr(&attrs, "type").and_then(NavType::parse);
                    results.clear();
                    item_stack.clear();
                }
                "li" if current_nav_type.is_some() => item_stack.push(PartialNavPoint::default()),
                "a" if current_nav_type.is_some() => {
                    in_anchor = true;
                    let attrs = xml::attributes(&e);
                    if let (Some(item), Some(href)) = (item_stack.last_mut(), xml::attr(&attrs, "href")) {
                        item.href = Some(href.to_string());
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_anchor => {
                if let Some(item) = item_stack.last_mut() {
                    xml::push_text(&mut item.label, &e);
                }
            }
            Ok(Event::GeneralRef(e)) if in_anchor => {
                if let Some(item) = item_stack.last_mut() {
                    xml::push_reference(&mut item.label, &e);
                }
            }
            Ok(Event::End(e)) => match xml::end_name(&e).as_str() {
                "a" => in_anchor = false,
                "li" if current_nav_type.is_some() => {
                    if let Some(partial) = item_stack.pop() {
                        let target = match item_stack.last_mut() {
                            Some(parent) => &mut parent.children,
                            None => &mut results,
                        };
                        if partial.href.is_none() {
                            // Unlinked heading: hoist its children.
                            target.extend(partial.children);
                        } else {
                            target.extend(partial.finish(doc_path));
                        }
                    }
                }
                "nav" => {
                    let completed = core::mem::take(&mut results);
                    match current_nav_type.take() {
                        Some(NavType::Toc) => nav.toc = completed,
                        Some(NavType::PageList) => nav.page_list = completed,
                        Some(NavType::Landmarks) => nav.landmarks = completed,
                        None => {}
                    }
                    item_stack.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml::parse_failure(doc_path, content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(nav)
}

/// Parse an EPUB 2.0 NCX navigation document located at `doc_path`.
pub fn parse_ncx(content: &[u8], doc_path: &str) -> Result<Navigation, ParseError> {
    let mut reader = Reader::from_reader(content);

    let mut nav = Navigation::default();
    let mut buf = Vec::new();
    let mut in_nav_map = false;
    let mut in_page_list = false;
    let mut stack: Vec<PartialNavPoint> = Vec::new();
    let mut page_target: Option<PartialNavPoint> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match xml::start_name(&e).as_str() {
                "navMap" => in_nav_map = true,
                "pageList" => in_page_list = true,
                "navPoint" if in_nav_map => stack.push(PartialNavPoint::default()),
                "pageTarget" if in_page_list => page_target = Some(PartialNavPoint::default()),
                "text" => in_text = true,
                "content" => {
                    let attrs = xml::attributes(&e);
                    let src = xml::attr(&attrs, "src").map(str::to_string);
                    if let Some(target) = page_target.as_mut() {
                        target.href = src;
                    } else if let Some(point) = stack.last_mut() {
                        point.href = src;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                if let Some(current) = page_target.as_mut().or(stack.last_mut()) {
                    xml::push_text(&mut current.label, &e);
                }
            }
            Ok(Event::GeneralRef(e)) if in_text => {
                if let Some(current) = page_target.as_mut().or(stack.last_mut()) {
                    xml::push_reference(&mut current.label, &e);
                }
            }
            Ok(Event::End(e)) => match xml::end_name(&e).as_str() {
                "text" => in_text = false,
                "navPoint" => {
                    if let Some(point) = stack.pop().and_then(|p| p.finish(doc_path)) {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(point),
                            None => nav.toc.push(point),
                        }
                    }
                }
                "pageTarget" => {
                    if let Some(point) = page_target.take().and_then(|p| p.finish(doc_path)) {
                        nav.page_list.push(point);
                    }
                }
                "navMap" => in_nav_map = false,
                "pageList" => in_page_list = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml::parse_failure(doc_path, content, &reader, &e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(nav)
}
