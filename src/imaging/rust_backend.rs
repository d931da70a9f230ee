//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `image::guess_format` (magic bytes) |
//! | Decode (GIF, JPEG, PNG) | `image::load_from_memory_with_format` |
//! | Scale | `image::DynamicImage::resize` with `Lanczos3` |
//! | Crop | `image::DynamicImage::resize_to_fill` (center crop) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with quality |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |

use super::backend::{BackendError, ImageBackend, ImageInfo, sniff_format};
use super::params::{ResizeMethod, ResizeParams, SourceFormat};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn image_format(format: SourceFormat) -> ImageFormat {
    match format {
        SourceFormat::Gif => ImageFormat::Gif,
        SourceFormat::Jpeg => ImageFormat::Jpeg,
        SourceFormat::Png => ImageFormat::Png,
    }
}

/// Decode an accepted upload from memory.
fn load_image(bytes: &[u8]) -> Result<(SourceFormat, DynamicImage), BackendError> {
    let format = sniff_format(bytes)
        .ok_or_else(|| BackendError::Unsupported("not a GIF, JPEG or PNG image".into()))?;
    let img = image::load_from_memory_with_format(bytes, image_format(format))
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode {format}: {e}")))?;
    Ok((format, img))
}

/// Encode a derived image.
fn encode_image(img: &DynamicImage, format: SourceFormat, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    match format {
        SourceFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality as u8);
            rgb.write_with_encoder(encoder)
                .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")))?;
        }
        SourceFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new(&mut buf);
            img.write_with_encoder(encoder)
                .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {e}")))?;
        }
        SourceFormat::Gif => {
            return Err(BackendError::ProcessingFailed(
                "GIF is not a displayed-image output format".into(),
            ));
        }
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<ImageInfo, BackendError> {
        let (format, img) = load_image(bytes)?;
        Ok(ImageInfo {
            format,
            width: img.width(),
            height: img.height(),
        })
    }

    fn resize(&self, params: &ResizeParams) -> Result<Vec<u8>, BackendError> {
        let (_, img) = load_image(params.source)?;
        let resized = match params.method {
            ResizeMethod::Scale => img.resize(params.width, params.height, FilterType::Lanczos3),
            // Fill-resize then center-crop to exact dimensions
            ResizeMethod::Crop => {
                img.resize_to_fill(params.width, params.height, FilterType::Lanczos3)
            }
        };
        encode_image(&resized, params.output, params.quality.value())
    }
}
