//! Course format settings.
//!
//! Handles loading, validating, merging and overriding the settings that
//! drive tile geometry, styling and presentation. Settings are layered:
//! stock defaults are overridden by a site-wide `config.toml` in the data
//! directory, and each course keeps its own stored copy that starts from
//! the site defaults the first time the course is rendered.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [container]
//! width = 210               # 128, 192, 210, 256, 320, 384, 448, 512, 576, 640, 704 or 768
//! aspect_ratio = "3-2"      # 3-2, 3-1, 3-3, 2-3, 1-3, 4-3 or 3-4
//! resize_method = "scale"   # scale or crop
//!
//! [style]
//! border_width = 3          # 1-10 pixels
//! border_radius = true
//! border_colour = "#dddddd"
//! background_colour = "#f1f2f2"
//! current_section_colour = "#8E66FF"
//! current_container_colour = "#ffc540"
//!
//! [display]
//! section0 = "top"          # top (banner) or grid (tile 0)
//! hidden_sections = "collapsed"
//! course_display = "single-page"
//! layout = "grid"
//! new_activity = "show"
//!
//! [processing]
//! quality = 90              # JPEG quality of displayed images (1-100)
//! derive_timeout_ms = 5000  # Longest a render waits for one derivation
//! max_processes = 4         # Omit for auto = CPU cores
//! ```
//!
//! Unknown keys and out-of-range values are rejected when settings are
//! loaded or updated, never at render time.

use crate::geometry::{AspectRatio, ContainerWidth};
use crate::imaging::ResizeMethod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Per-course settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CourseFormatSettings {
    /// Tile size and how images are fitted into it.
    pub container: ContainerConfig,
    /// Borders and colours.
    pub style: StyleConfig,
    /// Presentation switches.
    pub display: DisplayConfig,
    /// Image derivation settings.
    pub processing: ProcessingConfig,
}

impl CourseFormatSettings {
    /// Validate values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.style.border_width) {
            return Err(ConfigError::Validation(
                "style.border_width must be 1-10".into(),
            ));
        }
        if !(1..=100).contains(&self.processing.quality) {
            return Err(ConfigError::Validation(
                "processing.quality must be 1-100".into(),
            ));
        }
        if self.processing.derive_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "processing.derive_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Whether switching from `self` to `other` changes what a displayed
    /// image looks like.
    pub fn affects_images(&self, other: &Self) -> bool {
        self.container != other.container
            || self.style.border_width != other.style.border_width
            || self.processing.quality != other.processing.quality
    }
}

/// Tile size and resize method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    pub width: ContainerWidth,
    pub aspect_ratio: AspectRatio,
    pub resize_method: ResizeMethod,
}

/// A CSS colour in `#rgb` or `#rrggbb` form.
///
/// Input may omit the leading `#`; it is always stored with one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Colour(String);

impl Colour {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let hex = input.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let valid = matches!(hex.len(), 3 | 6) && hex.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(ConfigError::Validation(format!(
                "'{input}' is not a #rgb or #rrggbb colour"
            )));
        }
        Ok(Self(format!("#{hex}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Colour {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Colour> for String {
    fn from(c: Colour) -> String {
        c.0
    }
}

/// Borders and colours of tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleConfig {
    /// Border width in pixels, 1-10.
    pub border_width: u32,
    pub border_radius: bool,
    pub border_colour: Colour,
    pub background_colour: Colour,
    /// Highlight of the course marker section.
    pub current_section_colour: Colour,
    /// Highlight of the active section's container.
    pub current_container_colour: Colour,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            border_width: 3,
            border_radius: true,
            border_colour: Colour("#dddddd".into()),
            background_colour: Colour("#f1f2f2".into()),
            current_section_colour: Colour("#8E66FF".into()),
            current_container_colour: Colour("#ffc540".into()),
        }
    }
}

/// Where section 0 goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section0 {
    /// Above the grid, as a banner.
    #[default]
    Top,
    /// In the grid, as tile 0.
    Grid,
}

/// How restricted sections are treated for viewers without override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HiddenSections {
    #[default]
    Collapsed,
    Invisible,
}

/// Where a tile link points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseDisplay {
    #[default]
    SinglePage,
    MultiPage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NewActivity {
    Hide,
    #[default]
    Show,
}

/// Presentation switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub section0: Section0,
    pub hidden_sections: HiddenSections,
    pub course_display: CourseDisplay,
    pub layout: Layout,
    pub new_activity: NewActivity,
}

/// Image derivation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// JPEG quality of displayed images (1-100).
    pub quality: u32,
    /// How long a render waits for one derivation, in milliseconds.
    pub derive_timeout_ms: u64,
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            quality: 90,
            derive_timeout_ms: 5000,
            max_processes: None,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Groups of settings that can be put back to their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetFlags {
    /// Container width and aspect ratio.
    pub size: bool,
    pub resize: bool,
    /// Border and colours.
    pub style: bool,
    pub new_activity: bool,
}

impl ResetFlags {
    pub fn any(&self) -> bool {
        self.size || self.resize || self.style || self.new_activity
    }
}

/// Put the flagged groups of `settings` back to `defaults`.
pub fn reset_settings(
    settings: &CourseFormatSettings,
    defaults: &CourseFormatSettings,
    flags: ResetFlags,
) -> CourseFormatSettings {
    let mut out = settings.clone();
    if flags.size {
        out.container.width = defaults.container.width;
        out.container.aspect_ratio = defaults.container.aspect_ratio;
    }
    if flags.resize {
        out.container.resize_method = defaults.container.resize_method;
    }
    if flags.style {
        out.style = defaults.style.clone();
    }
    if flags.new_activity {
        out.display.new_activity = defaults.display.new_activity;
    }
    out
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default settings as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CourseFormatSettings::default()).expect("default settings must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CourseFormatSettings, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let settings: CourseFormatSettings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load site defaults from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<CourseFormatSettings, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Parse a command-line value as a TOML literal, falling back to a plain
/// string: `320` is an integer, `true` a boolean, `crop` a string.
fn parse_override_value(raw: &str) -> toml::Value {
    let doc = format!("v = {raw}");
    toml::from_str::<toml::Table>(&doc)
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

/// Apply one `section.key = value` override to `settings`.
///
/// The result is deserialized and validated as a whole, so an unknown key
/// or a bad value leaves nothing half-applied.
pub fn apply_override(
    settings: &CourseFormatSettings,
    key: &str,
    raw: &str,
) -> Result<CourseFormatSettings, ConfigError> {
    let parts: Vec<&str> = key.split('.').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::Validation(format!("invalid settings key '{key}'")));
    }
    let overlay = parts
        .iter()
        .rev()
        .fold(parse_override_value(raw), |value, part| {
            let mut table = toml::Table::new();
            table.insert((*part).to_string(), value);
            toml::Value::Table(table)
        });
    let base = toml::Value::try_from(settings)
        .map_err(|e| ConfigError::Validation(format!("settings do not serialize: {e}")))?;
    resolve_config(base, Some(overlay))
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Tile Grid Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# This file lives at <data>/config.toml and sets the site defaults. Each
# course starts from these values the first time it is rendered and keeps
# its own copy afterwards (change it with `tilegrid set <key> <value>`).
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Container
# ---------------------------------------------------------------------------
[container]
# Tile width in pixels. One of:
# 128, 192, 210, 256, 320, 384, 448, 512, 576, 640, 704, 768
width = 210

# Tile height relative to width, as a ratio code.
# One of: 3-2, 3-1, 3-3, 2-3, 1-3, 4-3, 3-4
aspect_ratio = "3-2"

# How images are fitted into the tile.
# "scale" keeps the whole image; "crop" fills the tile and trims overflow.
resize_method = "scale"

# ---------------------------------------------------------------------------
# Style
# ---------------------------------------------------------------------------
[style]
# Border width in pixels (1-10).
border_width = 3

# Rounded tile corners.
border_radius = true

# Colours as #rgb or #rrggbb.
border_colour = "#dddddd"
background_colour = "#f1f2f2"
current_section_colour = "#8E66FF"
current_container_colour = "#ffc540"

# ---------------------------------------------------------------------------
# Display
# ---------------------------------------------------------------------------
[display]
# Section 0: "top" shows it as a banner above the grid, "grid" as tile 0.
section0 = "top"

# Restricted sections for students: "collapsed" shows them, "invisible"
# hides them unless they ask to show their availability.
hidden_sections = "collapsed"

# Tile links: "single-page" jumps to an anchor, "multi-page" opens the
# section on its own page.
course_display = "single-page"

# "grid" for image tiles, "list" for a plain list.
layout = "grid"

# Mark tiles with activities added since the viewer's last visit.
# "show" or "hide".
new_activity = "show"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# JPEG quality of displayed images (1-100).
quality = 90

# Longest a render waits for one image derivation, in milliseconds.
# Past it the tile renders without its image and the derivation finishes
# in the background.
derive_timeout_ms = 5000

# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

/// CSS custom properties for a course's tiles.
pub fn generate_tile_css(settings: &CourseFormatSettings) -> String {
    let style = &settings.style;
    format!(
        r#":root {{
    --tile-width: {width}px;
    --tile-border-width: {border_width}px;
    --tile-border-radius: {radius};
    --tile-border-colour: {border};
    --tile-background: {background};
    --tile-current-section: {current_section};
    --tile-current-container: {current_container};
}}"#,
        width = settings.container.width.px(),
        border_width = style.border_width,
        radius = if style.border_radius { "6px" } else { "0" },
        border = style.border_colour,
        background = style.background_colour,
        current_section = style.current_section_colour,
        current_container = style.current_container_colour,
    )
}
