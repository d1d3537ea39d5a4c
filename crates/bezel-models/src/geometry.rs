//! Videowall geometry: source dimensions, bezel widths and per-panel plans.
//!
//! All coordinates are integer pixels. Source rectangles live in the
//! original frame; bezel crops live in the final, rotated panel frame.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of panels in the videowall row.
pub const PANEL_COUNT: usize = 4;

/// Default bezel on the top (left, once portrait) edge of a panel.
pub const DEFAULT_TOP_BEZEL_PX: u32 = 16;
/// Default bezel on the bottom (right, once portrait) edge of a panel.
pub const DEFAULT_BOTTOM_BEZEL_PX: u32 = 21;

/// Pixel dimensions of the source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Wide when width >= height, tall otherwise.
    pub fn orientation(&self) -> Orientation {
        if self.width >= self.height {
            Orientation::Wide
        } else {
            Orientation::Tall
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the four panels are laid out in the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Panels are vertical strips side by side.
    Wide,
    /// Panels are horizontal bands stacked top to bottom; each needs a 90° CCW turn.
    Tall,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Wide => "wide",
            Orientation::Tall => "tall",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bezel widths in pixels.
///
/// "Top" is the edge that ends up on the left of a portrait panel and
/// "bottom" the one on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct BezelConfig {
    #[serde(default)]
    pub top_bezel_px: u32,
    #[serde(default)]
    pub bottom_bezel_px: u32,
}

impl Default for BezelConfig {
    fn default() -> Self {
        Self {
            top_bezel_px: DEFAULT_TOP_BEZEL_PX,
            bottom_bezel_px: DEFAULT_BOTTOM_BEZEL_PX,
        }
    }
}

impl BezelConfig {
    pub fn new(top_bezel_px: u32, bottom_bezel_px: u32) -> Self {
        Self {
            top_bezel_px,
            bottom_bezel_px,
        }
    }

    /// Combined pixels removed from each panel's width.
    pub fn total(&self) -> u64 {
        u64::from(self.top_bezel_px) + u64::from(self.bottom_bezel_px)
    }
}

/// A rectangle in source-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    /// True when the two rectangles share at least one pixel.
    pub fn overlaps(&self, other: &Rect) -> bool {
        u64::from(self.x) < other.right()
            && u64::from(other.x) < self.right()
            && u64::from(self.y) < other.bottom()
            && u64::from(other.y) < self.bottom()
    }

    /// True when the rectangle lies entirely within `dims`.
    pub fn fits_within(&self, dims: Dimensions) -> bool {
        self.right() <= u64::from(dims.width) && self.bottom() <= u64::from(dims.height)
    }
}

/// Bezel crop, in the panel's final (rotated) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub struct BezelCrop {
    pub left_px: u32,
    pub right_px: u32,
}

/// Plan for one panel, in left-to-right output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PanelPlan {
    /// Position in the output row (0..4)
    pub index: usize,
    /// Region of the source frame that belongs to this panel
    pub source_rect: Rect,
    /// Rotate the region 90° counter-clockwise before the bezel crop
    pub rotate_90_ccw: bool,
    /// Bezel removed after the (optional) rotation
    pub crop_after_rotate: BezelCrop,
}

impl PanelPlan {
    /// Panel size after the optional rotation, before the bezel crop.
    pub fn oriented_size(&self) -> Dimensions {
        if self.rotate_90_ccw {
            Dimensions::new(self.source_rect.height, self.source_rect.width)
        } else {
            Dimensions::new(self.source_rect.width, self.source_rect.height)
        }
    }

    /// Width left once the bezels are cropped away.
    pub fn cropped_width(&self) -> u32 {
        self.oriented_size()
            .width
            .saturating_sub(self.crop_after_rotate.left_px)
            .saturating_sub(self.crop_after_rotate.right_px)
    }
}

/// Size of the reassembled output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct OutputSpec {
    pub width: u32,
    pub height: u32,
}

impl OutputSpec {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Complete geometry plan for one source video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutPlan {
    pub orientation: Orientation,
    pub source: Dimensions,
    pub bezels: BezelConfig,
    /// Panel width after rotation; the bezels are subtracted from this
    pub panel_width: u32,
    /// Panel height after rotation; also the output height
    pub panel_height: u32,
    pub panels: [PanelPlan; PANEL_COUNT],
    pub output: OutputSpec,
}

/// Frame axis, used in geometry errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Width,
    Height,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Width => write!(f, "width"),
            Axis::Height => write!(f, "height"),
        }
    }
}

/// Reasons a source frame cannot be split into panels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("source {axis} {value}px is not divisible by {panels} panels")]
    NotDivisible { axis: Axis, value: u32, panels: usize },

    #[error("bezels {top}px + {bottom}px leave nothing of a {panel_width}px panel")]
    BezelTooWide {
        top: u32,
        bottom: u32,
        panel_width: u32,
    },

    #[error("source frame has no pixels")]
    EmptyFrame,
}
