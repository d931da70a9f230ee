//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the slot manager
//! needs: identify an upload (format + dimensions) and derive a resized
//! displayed image. Both work on in-memory bytes since originals and
//! derivatives live in a blob store, not on a local path.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::params::{ResizeParams, SourceFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unsupported image format: {0}")]
    Unsupported(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: SourceFormat,
    pub width: u32,
    pub height: u32,
}

/// Detect the upload format from magic bytes.
///
/// Only GIF, JPEG and PNG are accepted; anything else (including formats
/// the `image` crate could recognise but has no decoder compiled in for)
/// yields `None`.
pub fn sniff_format(bytes: &[u8]) -> Option<SourceFormat> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Gif => Some(SourceFormat::Gif),
        image::ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
        image::ImageFormat::Png => Some(SourceFormat::Png),
        _ => None,
    }
}

/// Trait for image processing backends.
///
/// Implementations must be shareable across the worker pool that runs
/// derivations.
pub trait ImageBackend: Send + Sync {
    /// Identify an upload: format and pixel dimensions.
    fn identify(&self, bytes: &[u8]) -> Result<ImageInfo, BackendError>;

    /// Derive a displayed image, returning the encoded bytes.
    fn resize(&self, params: &ResizeParams) -> Result<Vec<u8>, BackendError>;
}
