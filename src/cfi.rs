//! EPUB Canonical Fragment Identifiers
//!
//! Grammar handled by the parser:
//! ```text
//! cfi       = "epubcfi(" path ["," path "," path] ")"
//! path      = step* [offset]
//! step      = "/" number [assertion] | "!" [assertion]
//! assertion = "[" text "]"            ; ^ escapes [ ] ^ , ( ) ;
//! offset    = ":" number [assertion] | "~" float ["@" float ":" float] | "@" float ":" float
//! ```
//!
//! On top of the full grammar sit the chapter helpers used for reading
//! positions: [`generate_chapter_cfi`] addresses spine item `n` as the
//! even step `2(n+1)` under the package's `/6` spine step, and
//! [`parse_chapter_cfi`] recovers `(position, id, offset)` from it.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

/// Characters that must be `^`-escaped inside assertions.
const ESCAPED: [char; 7] = ['[', ']', '^', ',', '(', ')', ';'];

/// Step index of the spine element inside the package document.
const SPINE_STEP: u64 = 6;

/// Why a CFI string was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CfiErrorKind {
    /// Input was empty or whitespace
    Empty,
    /// Missing `epubcfi(` prefix
    MissingPrefix,
    /// Missing closing `)`
    MissingClosingParen,
    /// Expected `/` or `!` at byte offset
    ExpectedStep(usize),
    /// Expected a number at byte offset
    ExpectedNumber(usize),
    /// `[` without matching `]`, starting at byte offset
    UnclosedBracket(usize),
    /// Stray character at byte offset
    UnexpectedChar(char, usize),
    /// Range without both start and end paths
    InvalidRange,
    /// Well-formed, but not a `/6/N[id]!` chapter location
    NotChapterLocation,
}

impl fmt::Display for CfiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfiErrorKind::Empty => write!(f, "empty CFI string"),
            CfiErrorKind::MissingPrefix => write!(f, "CFI must start with 'epubcfi('"),
            CfiErrorKind::MissingClosingParen => write!(f, "CFI must end with ')'"),
            CfiErrorKind::ExpectedStep(pos) => write!(f, "expected '/' or '!' at position {}", pos),
            CfiErrorKind::ExpectedNumber(pos) => write!(f, "expected number at position {}", pos),
            CfiErrorKind::UnclosedBracket(pos) => write!(f, "unclosed bracket at position {}", pos),
            CfiErrorKind::UnexpectedChar(ch, pos) => {
                write!(f, "unexpected character '{}' at position {}", ch, pos)
            }
            CfiErrorKind::InvalidRange => write!(f, "invalid range"),
            CfiErrorKind::NotChapterLocation => {
                write!(f, "not a spine chapter location (/6/N[id]!...)")
            }
        }
    }
}

/// Malformed CFI, carrying the original input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfiError {
    /// The string that failed to parse.
    pub input: String,
    /// What went wrong.
    pub kind: CfiErrorKind,
}

impl CfiError {
    fn new(input: &str, kind: CfiErrorKind) -> Self {
        Self {
            input: input.to_string(),
            kind,
        }
    }
}

impl fmt::Display for CfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {:?}", self.kind, self.input)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CfiError {}

/// `[prefix,suffix;key=value]` text-location assertion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextAssertion {
    /// Text before the location.
    pub prefix: Option<String>,
    /// Text after the location.
    pub suffix: Option<String>,
    /// `;key=value` parameters.
    pub parameters: Vec<(String, String)>,
}

/// Step kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// `/N`: child node index (even = element, odd = text).
    Child(u64),
    /// `!`: follow the reference into another document.
    Indirection,
}

/// One path step with an optional assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CfiStep {
    /// What the step does.
    pub kind: StepKind,
    /// `[id]` assertion.
    pub id: Option<String>,
    /// `[prefix,suffix]` assertion.
    pub text: Option<TextAssertion>,
}

impl CfiStep {
    /// `/index`
    pub fn child(index: u64) -> Self {
        Self {
            kind: StepKind::Child(index),
            id: None,
            text: None,
        }
    }

    /// `/index[id]`
    pub fn child_with_id(index: u64, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::child(index)
        }
    }

    /// `!`
    pub fn indirection() -> Self {
        Self {
            kind: StepKind::Indirection,
            id: None,
            text: None,
        }
    }
}

/// Terminal offset of a path.
#[derive(Clone, Debug, PartialEq)]
pub enum CfiOffset {
    /// `:N` character offset with optional text assertion.
    Character {
        /// UTF-16 code unit offset into the text node.
        offset: u32,
        /// Optional `[prefix,suffix]` assertion.
        assertion: Option<TextAssertion>,
    },
    /// `~s` seconds into audio/video, optionally with `@x:y`.
    Temporal {
        /// Seconds.
        seconds: f64,
        /// Optional spatial position.
        spatial: Option<(f64, f64)>,
    },
    /// `@x:y` spatial position (percent of the element box).
    Spatial {
        /// Horizontal.
        x: f64,
        /// Vertical.
        y: f64,
    },
}

/// A sequence of steps with an optional terminal offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CfiPath {
    /// Steps in order.
    pub steps: Vec<CfiStep>,
    /// Terminal offset.
    pub offset: Option<CfiOffset>,
}

impl CfiPath {
    /// Character offset, if the path ends in one.
    pub fn character_offset(&self) -> Option<u32> {
        match self.offset {
            Some(CfiOffset::Character { offset, .. }) => Some(offset),
            _ => None,
        }
    }
}

/// A parsed CFI: a location or a range.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cfi {
    /// The (common parent) path.
    pub path: CfiPath,
    /// `(start, end)` relative paths for ranges.
    pub range: Option<(CfiPath, CfiPath)>,
}

impl Cfi {
    /// Whether this CFI denotes a range.
    pub fn is_range(&self) -> bool {
        self.range.is_some()
    }
}

impl FromStr for Cfi {
    type Err = CfiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("epubcfi(")?;
        write_path(f, &self.path)?;
        if let Some((start, end)) = &self.range {
            f.write_str(",")?;
            write_path(f, start)?;
            f.write_str(",")?;
            write_path(f, end)?;
        }
        f.write_str(")")
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &CfiPath) -> fmt::Result {
    for step in &path.steps {
        match step.kind {
            StepKind::Child(index) => write!(f, "/{}", index)?,
            StepKind::Indirection => f.write_str("!")?,
        }
        if let Some(id) = &step.id {
            write!(f, "[{}]", escape(id))?;
        } else if let Some(text) = &step.text {
            write_text_assertion(f, text)?;
        }
    }
    match &path.offset {
        Some(CfiOffset::Character { offset, assertion }) => {
            write!(f, ":{}", offset)?;
            if let Some(text) = assertion {
                write_text_assertion(f, text)?;
            }
        }
        Some(CfiOffset::Temporal { seconds, spatial }) => {
            write!(f, "~{}", seconds)?;
            if let Some((x, y)) = spatial {
                write!(f, "@{}:{}", x, y)?;
            }
        }
        Some(CfiOffset::Spatial { x, y }) => write!(f, "@{}:{}", x, y)?,
        None => {}
    }
    Ok(())
}

fn write_text_assertion(f: &mut fmt::Formatter<'_>, text: &TextAssertion) -> fmt::Result {
    write!(
        f,
        "[{},{}",
        escape(text.prefix.as_deref().unwrap_or("")),
        escape(text.suffix.as_deref().unwrap_or(""))
    )?;
    for (key, value) in &text.parameters {
        write!(f, ";{}={}", escape(key), escape(value))?;
    }
    f.write_str("]")
}

/// `^`-escape the CFI special characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ESCAPED.contains(&ch) {
            out.push('^');
        }
        out.push(ch);
    }
    out
}

/// Undo [`escape`]. A trailing lone `^` is dropped.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '^' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Split raw (still escaped) text on unescaped `sep`.
fn split_unescaped(raw: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '^' {
            escaped = true;
        } else if ch == sep {
            parts.push(&raw[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&raw[start..]);
    parts
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), CfiErrorKind> {
        if self.skip_if(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> CfiErrorKind {
        match self.peek() {
            Some(ch) => CfiErrorKind::UnexpectedChar(ch, self.pos),
            None => CfiErrorKind::MissingClosingParen,
        }
    }

    fn parse_number<T: FromStr>(&mut self) -> Result<T, CfiErrorKind> {
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.pos += 1;
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| CfiErrorKind::ExpectedNumber(start))
    }

    fn parse_float(&mut self) -> Result<f64, CfiErrorKind> {
        let start = self.pos;
        self.skip_if('-');
        while self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '.')
        {
            self.pos += 1;
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| CfiErrorKind::ExpectedNumber(start))
    }

    /// Raw text between `[` and the matching unescaped `]`, brackets consumed.
    fn parse_bracket(&mut self) -> Result<Option<&'a str>, CfiErrorKind> {
        let open = self.pos;
        if !self.skip_if('[') {
            return Ok(None);
        }
        let start = self.pos;
        let mut escaped = false;
        while let Some(ch) = self.advance() {
            if escaped {
                escaped = false;
            } else if ch == '^' {
                escaped = true;
            } else if ch == '[' {
                return Err(CfiErrorKind::UnexpectedChar('[', self.pos - 1));
            } else if ch == ']' {
                return Ok(Some(&self.input[start..self.pos - 1]));
            }
        }
        Err(CfiErrorKind::UnclosedBracket(open))
    }

    fn parse_assertion(&mut self) -> Result<(Option<String>, Option<TextAssertion>), CfiErrorKind> {
        let Some(raw) = self.parse_bracket()? else {
            return Ok((None, None));
        };
        let mut params = split_unescaped(raw, ';').into_iter();
        let head = params.next().unwrap_or("");
        let parameters: Vec<(String, String)> = params
            .filter_map(|p| {
                let (key, value) = p.split_once('=')?;
                Some((unescape(key.trim()), unescape(value.trim())))
            })
            .collect();

        let pieces = split_unescaped(head, ',');
        if pieces.len() == 1 && parameters.is_empty() {
            return Ok((Some(unescape(head)), None));
        }
        let non_empty = |s: &str| Some(unescape(s)).filter(|s| !s.is_empty());
        Ok((
            None,
            Some(TextAssertion {
                prefix: pieces.first().and_then(|s| non_empty(s)),
                suffix: pieces.get(1).and_then(|s| non_empty(s)),
                parameters,
            }),
        ))
    }

    fn parse_step(&mut self) -> Result<CfiStep, CfiErrorKind> {
        let kind = if self.skip_if('/') {
            StepKind::Child(self.parse_number::<u64>()?)
        } else if self.skip_if('!') {
            StepKind::Indirection
        } else {
            return Err(CfiErrorKind::ExpectedStep(self.pos));
        };
        let (id, text) = self.parse_assertion()?;
        Ok(CfiStep { kind, id, text })
    }

    fn parse_path(&mut self) -> Result<CfiPath, CfiErrorKind> {
        let mut path = CfiPath::default();
        while matches!(self.peek(), Some('/') | Some('!')) {
            path.steps.push(self.parse_step()?);
        }

        if self.skip_if(':') {
            let offset = self.parse_number::<u32>()?;
            let (_, assertion) = self.parse_assertion()?;
            path.offset = Some(CfiOffset::Character { offset, assertion });
        } else if self.skip_if('~') {
            let seconds = self.parse_float()?;
            let spatial = if self.skip_if('@') {
                Some(self.parse_point()?)
            } else {
                None
            };
            path.offset = Some(CfiOffset::Temporal { seconds, spatial });
        } else if self.skip_if('@') {
            let (x, y) = self.parse_point()?;
            path.offset = Some(CfiOffset::Spatial { x, y });
        }
        Ok(path)
    }

    fn parse_point(&mut self) -> Result<(f64, f64), CfiErrorKind> {
        let x = self.parse_float()?;
        self.expect(':')?;
        let y = self.parse_float()?;
        Ok((x, y))
    }

    fn parse_cfi(&mut self) -> Result<Cfi, CfiErrorKind> {
        if !self.input.starts_with("epubcfi(") {
            return Err(CfiErrorKind::MissingPrefix);
        }
        self.pos = "epubcfi(".len();

        let path = self.parse_path()?;
        if path.steps.is_empty() {
            return Err(CfiErrorKind::ExpectedStep(self.pos));
        }

        let range = if self.skip_if(',') {
            let start = self.parse_path()?;
            if !self.skip_if(',') {
                return Err(CfiErrorKind::InvalidRange);
            }
            let end = self.parse_path()?;
            Some((start, end))
        } else {
            None
        };

        if !self.skip_if(')') {
            return Err(self.unexpected());
        }
        if self.pos != self.input.len() {
            return Err(self.unexpected());
        }
        Ok(Cfi { path, range })
    }
}

/// Parse a CFI string.
pub fn parse(input: &str) -> Result<Cfi, CfiError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CfiError::new(input, CfiErrorKind::Empty));
    }
    Parser::new(trimmed)
        .parse_cfi()
        .map_err(|kind| CfiError::new(input, kind))
}

/// A reading position inside one spine item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterLocation {
    /// Zero-based spine position.
    pub spine_position: usize,
    /// Manifest id of the spine item.
    pub chapter_id: String,
    /// Character offset in the chapter, if recorded.
    pub char_offset: Option<u32>,
}

/// Build a CFI for a spine item, optionally pointing at a character offset.
///
/// Position `n` maps to step `2(n+1)`; the in-document path is the first
/// text node of the first body child (`/4/2/1`) when an offset is given,
/// and the body (`/4`) otherwise. `None` when the step does not fit a `u64`.
pub fn generate_chapter_cfi(
    chapter_id: &str,
    spine_position: usize,
    char_offset: Option<u32>,
) -> Option<String> {
    let step = u64::try_from(spine_position)
        .ok()?
        .checked_add(1)?
        .checked_mul(2)?;
    let cfi = match char_offset {
        Some(offset) => format!(
            "epubcfi(/{}/{}[{}]!/4/2/1:{})",
            SPINE_STEP,
            step,
            escape(chapter_id),
            offset
        ),
        None => format!(
            "epubcfi(/{}/{}[{}]!/4)",
            SPINE_STEP,
            step,
            escape(chapter_id)
        ),
    };
    Some(cfi)
}

/// Recover the chapter location from a CFI made by [`generate_chapter_cfi`]
/// (or any CFI whose path starts `/6/N[id]!`).
pub fn parse_chapter_cfi(input: &str) -> Result<ChapterLocation, CfiError> {
    let cfi = parse(input)?;
    chapter_location(&cfi).ok_or_else(|| CfiError::new(input, CfiErrorKind::NotChapterLocation))
}

/// Interpret the first two steps of a parsed CFI as a spine location.
pub fn chapter_location(cfi: &Cfi) -> Option<ChapterLocation> {
    let steps = &cfi.path.steps;
    if steps.first()?.kind != StepKind::Child(SPINE_STEP) {
        return None;
    }
    let item = steps.get(1)?;
    let StepKind::Child(index) = item.kind else {
        return None;
    };
    if index < 2 || index % 2 != 0 {
        return None;
    }
    let chapter_id = item.id.clone().filter(|id| !id.is_empty())?;
    let char_offset = match &cfi.range {
        Some((start, _)) => start.character_offset(),
        None => cfi.path.character_offset(),
    };
    Some(ChapterLocation {
        spine_position: usize::try_from(index / 2 - 1).ok()?,
        chapter_id,
        char_offset,
    })
}
