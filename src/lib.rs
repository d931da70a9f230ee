//! # Tile Grid
//!
//! A course format that shows each course section as a fixed-size tile with
//! a title, an optional image and a state (active, inactive or locked).
//!
//! # Architecture: Policy, Slots, Render
//!
//! A render call takes the course's section descriptors and produces one
//! tile descriptor per visible section:
//!
//! ```text
//! sections  →  visibility  →  tile geometry + title  →  image slot  →  TileDescriptor
//!              (who sees it,   (pure arithmetic,         (cached or
//!               which state)    text cleanup)             derived image)
//! ```
//!
//! Everything up to the image slot is a pure function of its inputs. The
//! image slot is the only stateful step: it owns the per-section image
//! records and derives displayed images on demand, with a deadline so a
//! slow derivation never blocks the page.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`geometry`] | Container widths, aspect-ratio codes, tile and image dimensions |
//! | [`visibility`] | Which sections render, the time-active section, locked state |
//! | [`title`] | Tile titles from section names or summaries |
//! | [`slots`] | Per-section image records: upload, derive, invalidate, deadline |
//! | [`render`] | Builds [`types::TileDescriptor`]s for a course |
//! | [`format`] | Per-course settings snapshots and the operations that change them |
//! | [`html`] | Grid and list markup using Maud |
//! | [`config`] | Course format settings: defaults, `config.toml`, validation, CSS |
//! | [`store`] | Record and blob storage traits with memory and filesystem backends |
//! | [`imaging`] | Pure-Rust image identification and resizing |
//! | [`types`] | Section descriptors and tile descriptors |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Versioned Image Records
//!
//! Each section's image record carries an `original_version` and a
//! `displayed_version`. Uploading or resizing bumps the original; deriving
//! sets the displayed version. A displayed image is served only while
//! `displayed_version >= original_version`, so invalidation is a counter
//! bump rather than a sweep over blobs. Versions never go backwards, which
//! keeps image URLs unique across rebuilds.
//!
//! ## Settings Snapshots
//!
//! A render reads one immutable settings snapshot for the whole course. An
//! update swaps the snapshot after it is persisted, so concurrent renders
//! see either the old settings or the new ones, never a mix.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for decoding and Lanczos3
//! resampling. No system libraries are needed.

pub mod config;
pub mod format;
pub mod geometry;
pub mod html;
pub mod imaging;
pub mod output;
pub mod render;
pub mod slots;
pub mod store;
pub mod title;
pub mod types;
pub mod visibility;

#[cfg(test)]
pub(crate) mod test_helpers;
