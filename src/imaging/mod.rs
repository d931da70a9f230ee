//! Image processing in pure Rust via the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Sniff** | `image::guess_format` |
//! | **Identify** | decode + `width()`/`height()` |
//! | **Scale** | Lanczos3 `resize` |
//! | **Crop** | `resize_to_fill` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, ImageInfo, sniff_format};
pub use calculations::{calculate_fit_dimensions, output_dimensions};
pub use params::{Quality, ResizeMethod, ResizeParams, SourceFormat};
pub use rust_backend::RustBackend;
