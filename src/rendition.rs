//! EPUB3 rendition properties (fixed layout, orientation, spreads).
//!
//! Package-wide values come from `rendition:*` metas; individual spine
//! items can override them through `rendition:*-*` itemref properties.

extern crate alloc;

use alloc::string::String;

use crate::metadata::Metadata;

/// `rendition:layout`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Layout {
    /// Reflowable content (the default).
    #[default]
    Reflowable,
    /// Fixed layout.
    PrePaginated,
}

/// `rendition:orientation`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    /// No preference.
    #[default]
    Auto,
    /// Landscape only.
    Landscape,
    /// Portrait only.
    Portrait,
}

/// `rendition:spread`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Spread {
    /// Reading system decides.
    #[default]
    Auto,
    /// Never render two pages side by side.
    None,
    /// Spread in landscape orientation.
    Landscape,
    /// Spread in portrait orientation (deprecated in 3.3).
    Portrait,
    /// Spread in both orientations.
    Both,
}

/// Per-item `page-spread-*` placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSpread {
    /// Left page of a spread.
    Left,
    /// Right page of a spread.
    Right,
    /// Centered across the spread.
    Center,
}

impl Layout {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "reflowable" => Some(Layout::Reflowable),
            "pre-paginated" => Some(Layout::PrePaginated),
            _ => None,
        }
    }
}

impl Orientation {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "auto" => Some(Orientation::Auto),
            "landscape" => Some(Orientation::Landscape),
            "portrait" => Some(Orientation::Portrait),
            _ => None,
        }
    }
}

impl Spread {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "auto" => Some(Spread::Auto),
            "none" => Some(Spread::None),
            "landscape" => Some(Spread::Landscape),
            "portrait" => Some(Spread::Portrait),
            "both" => Some(Spread::Both),
            _ => None,
        }
    }
}

/// Fixed viewport size from a `width=W, height=H` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportDimensions {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
}

impl ViewportDimensions {
    /// Parse `width=1200, height=1600`. Separators may be commas,
    /// semicolons or whitespace; both keys are required.
    pub fn parse(value: &str) -> Option<Self> {
        let mut width = None;
        let mut height = None;
        for pair in value.split([',', ';']) {
            let Some((key, val)) = pair.split_once('=') else {
                continue;
            };
            let number = val.trim().trim_end_matches("px").parse::<u32>().ok();
            match key.trim() {
                "width" => width = number,
                "height" => height = number,
                _ => {}
            }
        }
        Some(Self {
            width: width?,
            height: height?,
        })
    }
}

/// Package-level rendition settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenditionProperties {
    /// Layout mode.
    pub layout: Layout,
    /// Orientation lock.
    pub orientation: Orientation,
    /// Spread behavior.
    pub spread: Spread,
    /// Fixed viewport, if declared.
    pub viewport: Option<ViewportDimensions>,
}

impl RenditionProperties {
    /// Read `rendition:*` metas. Unknown values keep the defaults.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mut props = Self::default();
        if let Some(layout) = metadata.meta("rendition:layout").and_then(Layout::parse) {
            props.layout = layout;
        }
        if let Some(orientation) = metadata
            .meta("rendition:orientation")
            .and_then(Orientation::parse)
        {
            props.orientation = orientation;
        }
        if let Some(spread) = metadata.meta("rendition:spread").and_then(Spread::parse) {
            props.spread = spread;
        }
        props.viewport = metadata
            .meta("rendition:viewport")
            .and_then(ViewportDimensions::parse);
        props
    }

    /// Whether the package is fixed-layout.
    pub fn is_fixed_layout(&self) -> bool {
        self.layout == Layout::PrePaginated
    }

    /// Effective settings for one spine item.
    pub fn with_override(&self, item: &ItemRendition) -> Self {
        Self {
            layout: item.layout.unwrap_or(self.layout),
            orientation: item.orientation.unwrap_or(self.orientation),
            spread: item.spread.unwrap_or(self.spread),
            viewport: self.viewport,
        }
    }
}

/// Rendition overrides carried by one spine itemref.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ItemRendition {
    /// `rendition:layout-*`
    pub layout: Option<Layout>,
    /// `rendition:orientation-*`
    pub orientation: Option<Orientation>,
    /// `rendition:spread-*`
    pub spread: Option<Spread>,
    /// `page-spread-*` / `rendition:page-spread-*`
    pub page_spread: Option<PageSpread>,
}

impl ItemRendition {
    /// Collect overrides from itemref `properties` tokens.
    pub fn from_properties<S: AsRef<str>>(properties: &[S]) -> Self {
        let mut out = Self::default();
        for prop in properties {
            let prop = prop.as_ref();
            if let Some(v) = prop.strip_prefix("rendition:layout-") {
                out.layout = Layout::parse(v).or(out.layout);
            } else if let Some(v) = prop.strip_prefix("rendition:orientation-") {
                out.orientation = Orientation::parse(v).or(out.orientation);
            } else if let Some(v) = prop.strip_prefix("rendition:spread-") {
                out.spread = Spread::parse(v).or(out.spread);
            } else {
                let side = prop.strip_prefix("rendition:").unwrap_or(prop);
                out.page_spread = match side {
                    "page-spread-left" => Some(PageSpread::Left),
                    "page-spread-right" => Some(PageSpread::Right),
                    "page-spread-center" => Some(PageSpread::Center),
                    _ => out.page_spread,
                };
            }
        }
        out
    }

    /// Whether the itemref overrides nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Render a viewport back to its `width=W, height=H` form.
pub fn format_viewport(viewport: &ViewportDimensions) -> String {
    alloc::format!("width={}, height={}", viewport.width, viewport.height)
}
