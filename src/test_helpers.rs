//! Shared test utilities.
//!
//! Synthetic images encoded in memory with the `image` crate, so tests can
//! exercise real decoding without fixture files.
//!
//! ```ignore
//! use crate::test_helpers::png_bytes;
//!
//! let bytes = png_bytes(200, 150);
//! let info = RustBackend::new().identify(&bytes).unwrap();
//! assert_eq!((info.width, info.height), (200, 150));
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// A horizontal/vertical gradient so resized output is not uniform.
fn gradient(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(gradient(width, height), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(gradient(width, height), ImageFormat::Jpeg)
}

pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    let rgba = DynamicImage::ImageRgba8(gradient(width, height).to_rgba8());
    encode(rgba, ImageFormat::Gif)
}
