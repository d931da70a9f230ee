//! Pure calculation functions for displayed-image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ResizeMethod;

/// Calculate dimensions that fit inside a bounding box.
///
/// The source aspect ratio is preserved and the result never exceeds the
/// box on either axis. At least one side touches the box, so small sources
/// are scaled up to the tile.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `bounds` - Bounding box dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Fitted dimensions, each at least 1px
pub fn calculate_fit_dimensions(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;
    if src_w == 0 || src_h == 0 {
        return (max_w.max(1), max_h.max(1));
    }

    let src_aspect = src_w as f64 / src_h as f64;
    let box_aspect = max_w as f64 / max_h as f64;

    if src_aspect > box_aspect {
        // Source is wider: width matches, height shrinks
        let w = max_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w.max(1), h.clamp(1, max_h.max(1)))
    } else {
        // Source is taller: height matches, width shrinks
        let h = max_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.clamp(1, max_w.max(1)), h.max(1))
    }
}

/// Final dimensions of a displayed image for a resize method.
///
/// Cropping always lands exactly on the tile; scaling fits inside it.
pub fn output_dimensions(
    source: (u32, u32),
    target: (u32, u32),
    method: ResizeMethod,
) -> (u32, u32) {
    match method {
        ResizeMethod::Crop => (target.0.max(1), target.1.max(1)),
        ResizeMethod::Scale => calculate_fit_dimensions(source, target),
    }
}
