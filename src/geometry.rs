//! Tile geometry.
//!
//! A tile's width is one of a fixed set of container widths; its height is
//! derived from the width and an aspect-ratio code such as `3-2`. All
//! functions here are pure and testable without any I/O.
//!
//! ## Ratio table
//!
//! The height is computed in two steps: the width is divided into a base
//! unit, then the base is scaled by a per-ratio multiplier.
//!
//! | Code | Base      | Multiplier | 210px wide |
//! |------|-----------|------------|------------|
//! | 3-2  | width / 3 | ×2         | 140        |
//! | 3-1  | width / 3 | ×1         | 70         |
//! | 3-3  | width / 3 | ×3         | 210        |
//! | 2-3  | width     | ×3         | 630        |
//! | 1-3  | width     | ×3         | 630        |
//! | 4-3  | width / 4 | ×3         | 157        |
//! | 3-4  | width / 3 | ×4         | 280        |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("unknown aspect ratio code '{0}' (expected one of 3-2, 3-1, 3-3, 2-3, 1-3, 4-3, 3-4)")]
    UnknownRatio(String),
    #[error("unsupported container width {0}px")]
    UnsupportedWidth(u32),
}

/// Container widths a course may choose from, in pixels.
pub const CONTAINER_WIDTHS: [u32; 12] = [128, 192, 210, 256, 320, 384, 448, 512, 576, 640, 704, 768];

/// Widest container; also the upper bound for displayed images.
pub const MAX_CONTAINER_WIDTH: u32 = 768;

/// One of the fixed tile widths in [`CONTAINER_WIDTHS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ContainerWidth(u32);

impl ContainerWidth {
    pub fn new(px: u32) -> Result<Self, GeometryError> {
        if CONTAINER_WIDTHS.contains(&px) {
            Ok(Self(px))
        } else {
            Err(GeometryError::UnsupportedWidth(px))
        }
    }

    pub fn px(self) -> u32 {
        self.0
    }
}

impl Default for ContainerWidth {
    fn default() -> Self {
        Self(210)
    }
}

impl TryFrom<u32> for ContainerWidth {
    type Error = GeometryError;

    fn try_from(px: u32) -> Result<Self, Self::Error> {
        Self::new(px)
    }
}

impl From<ContainerWidth> for u32 {
    fn from(w: ContainerWidth) -> u32 {
        w.0
    }
}

/// Aspect-ratio code controlling tile height relative to width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AspectRatio {
    #[default]
    ThreeTwo,
    ThreeOne,
    ThreeThree,
    TwoThree,
    OneThree,
    FourThree,
    ThreeFour,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 7] = [
        AspectRatio::ThreeTwo,
        AspectRatio::ThreeOne,
        AspectRatio::ThreeThree,
        AspectRatio::TwoThree,
        AspectRatio::OneThree,
        AspectRatio::FourThree,
        AspectRatio::ThreeFour,
    ];

    pub fn code(self) -> &'static str {
        match self {
            AspectRatio::ThreeTwo => "3-2",
            AspectRatio::ThreeOne => "3-1",
            AspectRatio::ThreeThree => "3-3",
            AspectRatio::TwoThree => "2-3",
            AspectRatio::OneThree => "1-3",
            AspectRatio::FourThree => "4-3",
            AspectRatio::ThreeFour => "3-4",
        }
    }

    /// Divisor applied to the width to get the base unit.
    fn base_divisor(self) -> u32 {
        match self {
            AspectRatio::ThreeTwo
            | AspectRatio::ThreeOne
            | AspectRatio::ThreeThree
            | AspectRatio::ThreeFour => 3,
            AspectRatio::TwoThree | AspectRatio::OneThree => 1,
            AspectRatio::FourThree => 4,
        }
    }

    /// Multiplier applied to the base unit to get the height.
    fn multiplier(self) -> u32 {
        match self {
            AspectRatio::ThreeOne => 1,
            AspectRatio::ThreeTwo => 2,
            AspectRatio::ThreeThree
            | AspectRatio::TwoThree
            | AspectRatio::OneThree
            | AspectRatio::FourThree => 3,
            AspectRatio::ThreeFour => 4,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AspectRatio {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::ALL
            .into_iter()
            .find(|r| r.code() == s.trim())
            .ok_or_else(|| GeometryError::UnknownRatio(s.to_string()))
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = GeometryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(r: AspectRatio) -> String {
        r.code().to_string()
    }
}

/// Compute the tile height for a container width and ratio code.
///
/// The multiplication happens before the division so the fixed widths land
/// on whole pixels where the table allows it (210 at 3-2 is exactly 140).
/// The result is never zero.
///
/// ```
/// # use tilegrid::geometry::{compute_height, AspectRatio};
/// assert_eq!(compute_height(210, AspectRatio::ThreeTwo), 140);
/// assert_eq!(compute_height(210, AspectRatio::OneThree), 630);
/// ```
pub fn compute_height(width: u32, ratio: AspectRatio) -> u32 {
    let height = u64::from(width) * u64::from(ratio.multiplier()) / u64::from(ratio.base_divisor());
    u32::try_from(height).unwrap_or(u32::MAX).max(1)
}

/// Width and height of a tile container.
pub fn container_dimensions(width: ContainerWidth, ratio: AspectRatio) -> (u32, u32) {
    (width.px(), compute_height(width.px(), ratio))
}

/// Dimensions of the image inside a tile: the container minus its border
/// on both sides, never below one pixel.
pub fn displayed_image_dimensions(
    width: ContainerWidth,
    ratio: AspectRatio,
    border_width: u32,
) -> (u32, u32) {
    let (w, h) = container_dimensions(width, ratio);
    let inset = border_width.saturating_mul(2);
    (w.saturating_sub(inset).max(1), h.saturating_sub(inset).max(1))
}
