//! Shared types passed between the host course structure, the renderer and
//! the markup layer.
//!
//! Sections are owned by the host and read-only here. Tiles are derived on
//! every render and never persisted.

use crate::store::BlobRef;
use serde::{Deserialize, Serialize};

pub type CourseId = u64;
pub type SectionId = u64;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// A section's availability window. Either bound may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
}

#[derive(Deserialize)]
struct ConditionTree {
    #[serde(default)]
    c: Vec<Condition>,
}

#[derive(Deserialize)]
struct Condition {
    #[serde(default)]
    t: Option<Timestamp>,
}

impl AvailabilityWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parse a host availability condition tree.
    ///
    /// The first condition's `t` is the start and the second's is the end:
    /// `{"op":"&","c":[{"type":"date","d":">=","t":1700000000},{"type":"date","d":"<","t":1700600000}]}`.
    /// Malformed or empty input yields `None` rather than an error.
    pub fn from_condition_json(json: &str) -> Option<Self> {
        let tree: ConditionTree = serde_json::from_str(json).ok()?;
        let start = tree.c.first().and_then(|c| c.t);
        let end = tree.c.get(1).and_then(|c| c.t);
        if start.is_none() && end.is_none() {
            return None;
        }
        Some(Self { start, end })
    }

    /// Both bounds, when the window is complete.
    pub fn bounds(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.start?, self.end?))
    }
}

/// An activity inside a section, as far as the tile needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    /// Host module type name, e.g. `video`, `quiz`, `forum`.
    pub kind: String,
    /// When the activity was added to the course.
    #[serde(default)]
    pub added: Timestamp,
}

fn yes() -> bool {
    true
}

/// One section of a course as described by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDescriptor {
    pub id: SectionId,
    /// Ordinal position; 0 is the course summary section.
    pub number: u32,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default = "yes")]
    pub available: bool,
    /// Show the section with a restriction notice even when unavailable.
    #[serde(default)]
    pub show_availability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<AvailabilityWindow>,
    /// Raw host condition JSON, used when `window` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl SectionDescriptor {
    pub fn new(id: SectionId, number: u32) -> Self {
        Self {
            id,
            number,
            visible: true,
            available: true,
            show_availability: false,
            window: None,
            availability: None,
            name: String::new(),
            summary: String::new(),
            activities: Vec::new(),
        }
    }

    /// Effective availability window: the explicit one, else the parsed
    /// condition JSON.
    pub fn effective_window(&self) -> Option<AvailabilityWindow> {
        self.window.or_else(|| {
            self.availability
                .as_deref()
                .and_then(AvailabilityWindow::from_condition_json)
        })
    }
}

/// A course's sections as handed over by the host for one render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseSections {
    /// Section number highlighted as current.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<u32>,
    pub sections: Vec<SectionDescriptor>,
}

impl CourseSections {
    pub fn section_ids(&self) -> Vec<SectionId> {
        self.sections.iter().map(|s| s.id).collect()
    }
}

/// Time state of a rendered tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileState {
    /// Inside its availability window right now.
    Active,
    /// Rendered and open, but not the active section.
    Inactive,
    /// Availability starts in the future.
    Locked,
}

/// A displayed image reference handed to the markup layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub blob: BlobRef,
    pub version: u64,
    pub width: u32,
    pub height: u32,
}

/// Activity counts shown on a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCounts {
    pub media: u32,
    pub other: u32,
}

/// Everything the markup layer needs to draw one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub section_id: SectionId,
    pub number: u32,
    pub width: u32,
    pub height: u32,
    pub state: TileState,
    /// Section is hidden from students but shown to this viewer.
    pub hidden: bool,
    /// Section is the course marker.
    pub current: bool,
    pub title: String,
    /// `None` renders a label-only placeholder.
    pub image: Option<ImageRef>,
    /// Why the image is missing, only filled in verbose renders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub counts: ActivityCounts,
    pub has_new_activity: bool,
}
