//! CLI output formatting.
//!
//! Output is **section-centric**: every line starts from the section's
//! position in the course, with image and diagnostic details on indented
//! context lines beneath it.
//!
//! # Output Format
//!
//! ## Render
//!
//! ```text
//! Course 7 (grid, 210x140)
//! 000 General [banner]
//! 001 Introduction [active, current]
//!     Image: 3f9a...-0 v2 (204x134)
//! 002 Week 2 [locked]
//!     Image: none
//!
//! Rendered 2 tiles: 1 cached, 0 derived (2 total), 1 without image
//! ```
//!
//! ## Image record
//!
//! ```text
//! Section 12
//!     Original: photo.png (png, 800x600) v3
//!     Displayed: 1b2c...-4 (204x153) v3
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::config::CourseFormatSettings;
use crate::render::RenderedCourse;
use crate::slots::SlotStats;
use crate::store::SectionImageRecord;
use crate::types::{CourseId, TileDescriptor, TileState};

// ============================================================================
// Shared helpers
// ============================================================================

fn format_index(number: u32) -> String {
    format!("{:0>3}", number)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Bracketed flags after a tile title, empty when none apply.
fn tile_flags(tile: &TileDescriptor) -> String {
    let mut flags = Vec::new();
    match tile.state {
        TileState::Active => flags.push("active"),
        TileState::Locked => flags.push("locked"),
        TileState::Inactive => {}
    }
    if tile.hidden {
        flags.push("hidden");
    }
    if tile.current {
        flags.push("current");
    }
    if tile.has_new_activity {
        flags.push("new");
    }
    if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    }
}

fn tile_lines(tile: &TileDescriptor, verbose: bool) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}{}",
        format_index(tile.number),
        tile.title,
        tile_flags(tile)
    )];
    match &tile.image {
        Some(image) => lines.push(format!(
            "{}Image: {} v{} ({}x{})",
            indent(1),
            image.blob,
            image.version,
            image.width,
            image.height
        )),
        None => lines.push(format!("{}Image: none", indent(1))),
    }
    if verbose {
        lines.push(format!(
            "{}Activities: {} media, {} other",
            indent(1),
            tile.counts.media,
            tile.counts.other
        ));
    }
    if let Some(diagnostic) = &tile.diagnostic {
        lines.push(format!("{}Diagnostic: {}", indent(1), diagnostic));
    }
    lines
}

// ============================================================================
// Render
// ============================================================================

pub fn format_render_output(
    course: CourseId,
    rendered: &RenderedCourse,
    settings: &CourseFormatSettings,
    stats: &SlotStats,
    verbose: bool,
) -> Vec<String> {
    let (width, height) = crate::geometry::container_dimensions(
        settings.container.width,
        settings.container.aspect_ratio,
    );
    let layout = match settings.display.layout {
        crate::config::Layout::Grid => "grid",
        crate::config::Layout::List => "list",
    };
    let mut lines = vec![format!("Course {course} ({layout}, {width}x{height})")];

    if let Some(banner) = &rendered.banner {
        lines.push(format!("{} {} [banner]", format_index(banner.number), banner.title));
    }
    for tile in &rendered.tiles {
        lines.extend(tile_lines(tile, verbose));
    }

    lines.push(String::new());
    lines.push(format!(
        "Rendered {}: {}",
        plural(rendered.tiles.len(), "tile"),
        stats
    ));
    lines
}

pub fn print_render_output(
    course: CourseId,
    rendered: &RenderedCourse,
    settings: &CourseFormatSettings,
    stats: &SlotStats,
    verbose: bool,
) {
    for line in format_render_output(course, rendered, settings, stats, verbose) {
        println!("{}", line);
    }
}

// ============================================================================
// Image records
// ============================================================================

pub fn format_image_record(record: &SectionImageRecord) -> Vec<String> {
    let mut lines = vec![format!("Section {}", record.section_id)];
    match &record.original {
        Some(original) => lines.push(format!(
            "{}Original: {} ({}, {}x{}) v{}",
            indent(1),
            original.filename,
            original.format,
            original.width,
            original.height,
            record.original_version
        )),
        None => lines.push(format!("{}Original: none", indent(1))),
    }
    match &record.displayed {
        Some(displayed) => {
            let stale = if record.is_fresh() { "" } else { " stale" };
            lines.push(format!(
                "{}Displayed: {} ({}x{}) v{}{}",
                indent(1),
                displayed.blob,
                displayed.width,
                displayed.height,
                record.displayed_version,
                stale
            ));
        }
        None => lines.push(format!("{}Displayed: pending", indent(1))),
    }
    lines
}

pub fn print_image_record(record: &SectionImageRecord) {
    for line in format_image_record(record) {
        println!("{}", line);
    }
}

// ============================================================================
// Settings
// ============================================================================

fn flatten(prefix: &str, value: &toml::Value, lines: &mut Vec<String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, lines);
            }
        }
        other => lines.push(format!("{prefix} = {other}")),
    }
}

/// One `key = value` line per setting, keyed the way `set` accepts them.
pub fn format_settings(course: CourseId, settings: &CourseFormatSettings) -> Vec<String> {
    let mut lines = vec![format!("Course {course} settings")];
    match toml::Value::try_from(settings) {
        Ok(value) => {
            let mut entries = Vec::new();
            flatten("", &value, &mut entries);
            lines.extend(entries.into_iter().map(|e| format!("{}{}", indent(1), e)));
        }
        Err(e) => lines.push(format!("{}(unavailable: {})", indent(1), e)),
    }
    lines
}

pub fn print_settings(course: CourseId, settings: &CourseFormatSettings) {
    for line in format_settings(course, settings) {
        println!("{}", line);
    }
}

/// Summary after a settings change.
pub fn format_settings_change(course: CourseId, invalidated: usize) -> Vec<String> {
    let mut lines = vec![format!("Course {course} settings saved")];
    if invalidated > 0 {
        lines.push(format!(
            "{}{} dropped for rebuild",
            indent(1),
            plural(invalidated, "displayed image")
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{ResizeMethod, SourceFormat};
    use crate::store::{BlobRef, DisplayTarget, DisplayedImage, OriginalImage};
    use crate::types::{ActivityCounts, ImageRef};

    fn tile(number: u32, title: &str) -> TileDescriptor {
        TileDescriptor {
            section_id: u64::from(number) + 100,
            number,
            width: 210,
            height: 140,
            state: TileState::Inactive,
            hidden: false,
            current: false,
            title: title.to_string(),
            image: None,
            diagnostic: None,
            counts: ActivityCounts::default(),
            has_new_activity: false,
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(0), "000");
        assert_eq!(format_index(12), "012");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn plural_words() {
        assert_eq!(plural(1, "tile"), "1 tile");
        assert_eq!(plural(0, "tile"), "0 tiles");
        assert_eq!(plural(3, "image"), "3 images");
    }

    #[test]
    fn flags_empty_for_plain_tile() {
        assert_eq!(tile_flags(&tile(1, "A")), "");
    }

    #[test]
    fn flags_listed_in_order() {
        let mut t = tile(1, "A");
        t.state = TileState::Active;
        t.current = true;
        t.has_new_activity = true;
        assert_eq!(tile_flags(&t), " [active, current, new]");
    }

    // =========================================================================
    // Render output
    // =========================================================================

    #[test]
    fn render_output_lists_tiles_and_stats() {
        let mut first = tile(1, "Introduction");
        first.state = TileState::Active;
        first.image = Some(ImageRef {
            blob: BlobRef::new("abc-0"),
            version: 2,
            width: 204,
            height: 134,
        });
        let mut second = tile(2, "Week 2");
        second.state = TileState::Locked;
        let rendered = RenderedCourse {
            banner: Some(tile(0, "General")),
            tiles: vec![first, second],
        };
        let stats = SlotStats {
            hits: 1,
            derived: 0,
            missing: 1,
            timeouts: 0,
        };
        let lines = format_render_output(
            7,
            &rendered,
            &CourseFormatSettings::default(),
            &stats,
            false,
        );
        assert_eq!(
            lines,
            vec![
                "Course 7 (grid, 210x140)",
                "000 General [banner]",
                "001 Introduction [active]",
                "    Image: abc-0 v2 (204x134)",
                "002 Week 2 [locked]",
                "    Image: none",
                "",
                "Rendered 2 tiles: 1 cached, 0 derived (2 total), 1 without image",
            ]
        );
    }

    #[test]
    fn render_output_verbose_shows_counts_and_diagnostics() {
        let mut t = tile(1, "A");
        t.counts = ActivityCounts { media: 1, other: 4 };
        t.diagnostic = Some("derivation timed out".into());
        let rendered = RenderedCourse {
            banner: None,
            tiles: vec![t],
        };
        let lines = format_render_output(
            1,
            &rendered,
            &CourseFormatSettings::default(),
            &SlotStats::default(),
            true,
        );
        assert!(lines.contains(&"    Activities: 1 media, 4 other".to_string()));
        assert!(lines.contains(&"    Diagnostic: derivation timed out".to_string()));
        assert_eq!(lines.last().unwrap(), "Rendered 1 tile: 0 derived");
    }

    // =========================================================================
    // Image record output
    // =========================================================================

    #[test]
    fn image_record_with_fresh_display() {
        let mut record = SectionImageRecord::new(12);
        record.original = Some(OriginalImage {
            blob: BlobRef::new("orig-0"),
            filename: "photo.png".into(),
            format: SourceFormat::Png,
            width: 800,
            height: 600,
        });
        record.displayed = Some(DisplayedImage {
            blob: BlobRef::new("disp-1"),
            width: 204,
            height: 153,
            target: DisplayTarget {
                width: 204,
                height: 134,
                method: ResizeMethod::Scale,
                quality: 90,
            },
        });
        record.original_version = 3;
        record.displayed_version = 3;
        let lines = format_image_record(&record);
        assert_eq!(lines[0], "Section 12");
        assert_eq!(lines[1], "    Original: photo.png (png, 800x600) v3");
        assert_eq!(lines[2], "    Displayed: disp-1 (204x153) v3");
    }

    #[test]
    fn image_record_pending_display() {
        let mut record = SectionImageRecord::new(4);
        record.original = Some(OriginalImage {
            blob: BlobRef::new("orig-0"),
            filename: "a.gif".into(),
            format: SourceFormat::Gif,
            width: 10,
            height: 10,
        });
        record.original_version = 1;
        let lines = format_image_record(&record);
        assert_eq!(lines[2], "    Displayed: pending");
    }

    #[test]
    fn image_record_without_original() {
        let lines = format_image_record(&SectionImageRecord::new(9));
        assert_eq!(lines, vec!["Section 9", "    Original: none", "    Displayed: pending"]);
    }

    // =========================================================================
    // Settings output
    // =========================================================================

    #[test]
    fn settings_use_dotted_keys() {
        let lines = format_settings(3, &CourseFormatSettings::default());
        assert_eq!(lines[0], "Course 3 settings");
        assert!(lines.contains(&"    container.width = 210".to_string()));
        assert!(lines.contains(&"    container.aspect_ratio = \"3-2\"".to_string()));
        assert!(lines.contains(&"    style.border_width = 3".to_string()));
    }

    #[test]
    fn settings_change_summary() {
        assert_eq!(format_settings_change(2, 0), vec!["Course 2 settings saved"]);
        assert_eq!(
            format_settings_change(2, 3),
            vec!["Course 2 settings saved", "    3 displayed images dropped for rebuild"]
        );
    }
}
