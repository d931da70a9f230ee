//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the slot manager (which decides when a displayed image
//! must be derived) and the [`backend`](super::backend) (which does the
//! actual pixel work), so tests can swap in a recording mock.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`ResizeMethod`]: Scale-to-fit or fill-and-crop.
//! - [`SourceFormat`]: Upload formats accepted as originals.
//! - [`ResizeParams`]: Full specification for deriving a displayed image.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// How an original is fitted into the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeMethod {
    /// Shrink to fit inside the tile, preserving the aspect ratio.
    #[default]
    Scale,
    /// Fill the tile exactly, cropping the overflow around the center.
    Crop,
}

impl fmt::Display for ResizeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeMethod::Scale => f.write_str("scale"),
            ResizeMethod::Crop => f.write_str("crop"),
        }
    }
}

/// Upload formats with decoders compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Gif,
    Jpeg,
    Png,
}

impl SourceFormat {
    /// Displayed images keep JPEG for photographs and use PNG otherwise
    /// (animated GIFs are flattened to their first frame).
    pub fn output_format(self) -> SourceFormat {
        match self {
            SourceFormat::Jpeg => SourceFormat::Jpeg,
            SourceFormat::Gif | SourceFormat::Png => SourceFormat::Png,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Gif => f.write_str("gif"),
            SourceFormat::Jpeg => f.write_str("jpeg"),
            SourceFormat::Png => f.write_str("png"),
        }
    }
}

/// Parameters for deriving a displayed image from an original.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams<'a> {
    pub source: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub method: ResizeMethod,
    pub output: SourceFormat,
    pub quality: Quality,
}
