//! SMIL media overlay parser
//!
//! A media overlay is a small tree: `<seq>` nodes own ordered children and
//! `<par>` nodes are the sync points pairing an audio clip with a text
//! fragment. Clip times accept the SMIL clock grammar (`hh:mm:ss.fff`,
//! `mm:ss.fff`) and timecounts with `h`/`min`/`s`/`ms` units; unparsable
//! times read as zero. Audio `src` and text references are resolved to
//! archive paths against the SMIL document.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ParseError;
use crate::package::{resolve_href, split_fragment};
use crate::xml;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// SMIL document could not be turned into an overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmilError {
    /// Not well-formed XML.
    Malformed(ParseError),
    /// Well-formed, but the root element is not `<smil>`.
    NotSmil {
        /// Archive path of the document.
        path: String,
    },
}

impl fmt::Display for SmilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmilError::Malformed(err) => write!(f, "could not parse SMIL: {}", err),
            SmilError::NotSmil { path } => write!(f, "{}: root element is not <smil>", path),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SmilError {}

/// Parse a SMIL clock value or timecount. Empty or invalid input is zero.
///
/// ```
/// use core::time::Duration;
/// use ocf_engine::smil::parse_clock_value;
///
/// assert_eq!(parse_clock_value("0.5h"), Duration::from_secs(1800));
/// assert_eq!(parse_clock_value("00:01:02.5"), Duration::from_millis(62_500));
/// assert_eq!(parse_clock_value("soon"), Duration::ZERO);
/// ```
pub fn parse_clock_value(value: &str) -> Duration {
    try_parse_clock_value(value).unwrap_or(Duration::ZERO)
}

/// Like [`parse_clock_value`], but reports unparsable input as `None`.
pub fn try_parse_clock_value(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let nanos = if value.contains(':') {
        let parts: Vec<&str> = value.split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [h, m, s] => (parse_whole(h)?, parse_whole(m)?, *s),
            [m, s] => (0, parse_whole(m)?, *s),
            _ => return None,
        };
        (hours * 3600 + minutes * 60) * NANOS_PER_SEC + parse_decimal(seconds)?
    } else {
        let (number, unit_num, unit_den) = if let Some(n) = value.strip_suffix("ms") {
            (n, 1, 1000)
        } else if let Some(n) = value.strip_suffix("min") {
            (n, 60, 1)
        } else if let Some(n) = value.strip_suffix('h') {
            (n, 3600, 1)
        } else if let Some(n) = value.strip_suffix('s') {
            (n, 1, 1)
        } else {
            (value, 1, 1)
        };
        parse_decimal(number.trim())? * unit_num / unit_den
    };

    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

fn parse_whole(s: &str) -> Option<u128> {
    let s = s.trim();
    if s.is_empty() || s.len() > 12 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Decimal number as nanos (value * 1e9). Digits past nanosecond precision are dropped.
fn parse_decimal(s: &str) -> Option<u128> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole = if whole.is_empty() { 0 } else { parse_whole(whole)? };
    let mut frac_nanos = 0u128;
    for (i, digit) in frac.bytes().take(9).enumerate() {
        frac_nanos += u128::from(digit - b'0') * 10u128.pow(8 - i as u32);
    }
    Some(whole * NANOS_PER_SEC + frac_nanos)
}

/// Audio half of a sync point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    /// Archive path of the audio file.
    pub src: String,
    /// Clip start.
    pub clip_begin: Duration,
    /// Clip end (equals `clip_begin` when `clipEnd` was absent).
    pub clip_end: Duration,
    /// `clipEnd` was missing: the clip plays to the end of the audio file.
    pub open_ended: bool,
}

impl AudioClip {
    /// Length of the clip as declared.
    pub fn duration(&self) -> Duration {
        self.clip_end.saturating_sub(self.clip_begin)
    }

    /// Whether `time` falls in `[clip_begin, clip_end)`.
    pub fn contains(&self, time: Duration) -> bool {
        self.clip_begin <= time && time < self.clip_end
    }

    /// The `clipEnd` attribute was absent.
    pub fn is_open_ended(&self) -> bool {
        self.open_ended
    }
}

/// Text half of a sync point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextReference {
    /// Archive path of the content document.
    pub src: String,
    /// Fragment id of the synchronized element.
    pub fragment: Option<String>,
}

impl TextReference {
    fn resolve(doc_path: &str, href: &str) -> Option<Self> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        let (_, fragment) = split_fragment(href);
        Some(Self {
            src: resolve_href(doc_path, href),
            fragment: fragment.map(str::to_string),
        })
    }
}

/// A `<par>` sync point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmilParallel {
    /// Element id.
    pub id: Option<String>,
    /// Text reference (`<text src>` child, else `epub:textref`).
    pub text: Option<TextReference>,
    /// Audio clip, absent when `<audio>` is missing or has no `src`.
    pub audio: Option<AudioClip>,
}

/// A `<seq>` (or the `<body>`) with ordered children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmilSequence {
    /// Element id.
    pub id: Option<String>,
    /// `epub:textref` of the structure this sequence covers.
    pub text: Option<TextReference>,
    /// Children in document order.
    pub children: Vec<SmilElement>,
}

/// Node of the overlay tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SmilElement {
    /// Sync point.
    Parallel(SmilParallel),
    /// Nested sequence.
    Sequence(SmilSequence),
}

impl SmilSequence {
    fn collect_parallels<'a>(&'a self, out: &mut Vec<&'a SmilParallel>) {
        for child in &self.children {
            match child {
                SmilElement::Parallel(par) => out.push(par),
                SmilElement::Sequence(seq) => seq.collect_parallels(out),
            }
        }
    }
}

/// A parsed media overlay document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaOverlay {
    /// Manifest id of the SMIL document.
    pub id: String,
    /// Archive path of the SMIL document.
    pub href: String,
    /// `media:duration` from the package, else the sum of clip lengths.
    pub duration: Option<Duration>,
    /// The `<body>` sequence.
    pub body: SmilSequence,
}

impl MediaOverlay {
    /// Every sync point, depth-first in document order.
    pub fn flattened_parallels(&self) -> Vec<&SmilParallel> {
        let mut out = Vec::new();
        self.body.collect_parallels(&mut out);
        out
    }

    /// Number of sync points.
    pub fn sync_point_count(&self) -> usize {
        self.flattened_parallels().len()
    }

    /// First sync point whose audio interval contains `time`.
    pub fn find_at_time(&self, time: Duration) -> Option<&SmilParallel> {
        self.flattened_parallels()
            .into_iter()
            .find(|par| par.audio.as_ref().is_some_and(|a| a.contains(time)))
    }

    /// All sync points whose text fragment equals `id`.
    pub fn find_by_text_id(&self, id: &str) -> Vec<&SmilParallel> {
        self.flattened_parallels()
            .into_iter()
            .filter(|par| {
                par.text
                    .as_ref()
                    .and_then(|t| t.fragment.as_deref())
                    .is_some_and(|f| f == id)
            })
            .collect()
    }

    /// Distinct audio files, in first-seen order.
    pub fn audio_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = Vec::new();
        for par in self.flattened_parallels() {
            if let Some(audio) = &par.audio {
                if !sources.contains(&audio.src.as_str()) {
                    sources.push(&audio.src);
                }
            }
        }
        sources
    }

    /// Sum of all clip lengths.
    pub fn clip_duration(&self) -> Duration {
        self.flattened_parallels()
            .iter()
            .filter_map(|par| par.audio.as_ref())
            .map(AudioClip::duration)
            .sum()
    }
}

/// Parse the SMIL document at `href` (manifest id `id`).
///
/// `duration` is set to the sum of clip lengths; callers holding a package
/// `media:duration` should prefer that.
pub fn parse_media_overlay(content: &[u8], id: &str, href: &str) -> Result<MediaOverlay, SmilError> {
    let body = parse_smil_body(content, href)?;
    let mut overlay = MediaOverlay {
        id: id.to_string(),
        href: href.to_string(),
        duration: None,
        body,
    };
    let total = overlay.clip_duration();
    overlay.duration = Some(total);
    Ok(overlay)
}

struct ParBuilder {
    par: SmilParallel,
    has_text_child: bool,
}

fn parse_smil_body(content: &[u8], doc_path: &str) -> Result<SmilSequence, SmilError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut seen_root = false;
    // stack[0] is the body; nested <seq> frames follow.
    let mut stack: Vec<SmilSequence> = alloc::vec![SmilSequence::default()];
    let mut current_par: Option<ParBuilder> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SmilError::Malformed(xml::parse_failure(doc_path, content, &reader, &e)))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = xml::start_name(e);
                if !seen_root {
                    if name != "smil" {
                        return Err(SmilError::NotSmil {
                            path: doc_path.to_string(),
                        });
                    }
                    seen_root = true;
                }
                let attrs = xml::attributes(e);
                match name.as_str() {
                    "body" => {
                        if let Some(root) = stack.first_mut() {
                            apply_seq_attrs(root, &attrs, doc_path);
                        }
                    }
                    "seq" => {
                        let mut seq = SmilSequence::default();
                        apply_seq_attrs(&mut seq, &attrs, doc_path);
                        if is_empty {
                            push_child(&mut stack, SmilElement::Sequence(seq));
                        } else {
                            stack.push(seq);
                        }
                    }
                    "par" => {
                        let par = SmilParallel {
                            id: xml::attr(&attrs, "id").map(str::to_string),
                            text: xml::attr(&attrs, "textref")
                                .and_then(|r| TextReference::resolve(doc_path, r)),
                            audio: None,
                        };
                        if is_empty {
                            push_child(&mut stack, SmilElement::Parallel(par));
                        } else {
                            current_par = Some(ParBuilder {
                                par,
                                has_text_child: false,
                            });
                        }
                    }
                    "text" => {
                        if let Some(builder) = current_par.as_mut() {
                            if !builder.has_text_child {
                                if let Some(text) = xml::attr(&attrs, "src")
                                    .and_then(|src| TextReference::resolve(doc_path, src))
                                {
                                    builder.par.text = Some(text);
                                    builder.has_text_child = true;
                                }
                            }
                        }
                    }
                    "audio" => {
                        if let Some(builder) = current_par.as_mut() {
                            if builder.par.audio.is_none() {
                                builder.par.audio = audio_clip(e, doc_path);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match xml::end_name(e).as_str() {
                "par" => {
                    if let Some(builder) = current_par.take() {
                        push_child(&mut stack, SmilElement::Parallel(builder.par));
                    }
                }
                "seq" if stack.len() > 1 => {
                    if let Some(seq) = stack.pop() {
                        push_child(&mut stack, SmilElement::Sequence(seq));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(SmilError::NotSmil {
            path: doc_path.to_string(),
        });
    }

    // Unclosed <seq> frames fold back into their parents.
    while stack.len() > 1 {
        if let Some(seq) = stack.pop() {
            push_child(&mut stack, SmilElement::Sequence(seq));
        }
    }
    Ok(stack.pop().unwrap_or_default())
}

fn push_child(stack: &mut [SmilSequence], child: SmilElement) {
    if let Some(top) = stack.last_mut() {
        top.children.push(child);
    }
}

fn apply_seq_attrs(seq: &mut SmilSequence, attrs: &[(String, String)], doc_path: &str) {
    seq.id = xml::attr(attrs, "id").map(str::to_string);
    seq.text = xml::attr(attrs, "textref").and_then(|r| TextReference::resolve(doc_path, r));
}

fn audio_clip(e: &BytesStart<'_>, doc_path: &str) -> Option<AudioClip> {
    let attrs = xml::attributes(e);
    let src = xml::attr(&attrs, "src").map(str::trim).filter(|s| !s.is_empty())?;
    let begin = xml::attr(&attrs, "clipBegin").or_else(|| xml::attr(&attrs, "clip-begin"));
    let end = xml::attr(&attrs, "clipEnd").or_else(|| xml::attr(&attrs, "clip-end"));
    let clip_begin = begin.map(parse_clock_value).unwrap_or_default();
    Some(AudioClip {
        src: resolve_href(doc_path, src),
        clip_begin,
        clip_end: end.map(parse_clock_value).unwrap_or(clip_begin),
        open_ended: end.is_none(),
    })
}
