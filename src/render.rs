//! Tile renderer.
//!
//! Composes geometry, visibility, image slots and titles into the ordered
//! tile descriptors of one course render. The renderer keeps no state
//! between calls and never emits markup; see [`html`](crate::html) for that.
//!
//! Configuration problems (invalid settings, two sections claiming the same
//! number) abort the whole render. Image problems are per section: the tile
//! falls back to a label-only placeholder and, in verbose renders, carries
//! the reason as a diagnostic.

use crate::config::{ConfigError, CourseFormatSettings, NewActivity, Section0};
use crate::geometry::container_dimensions;
use crate::slots::{ImageSource, SlotConfig, SlotLookup};
use crate::title::derive_title;
use crate::types::{
    Activity, ActivityCounts, CourseId, CourseSections, SectionDescriptor, TileDescriptor,
    TileState, Timestamp,
};
use crate::visibility::{Capabilities, SectionState, VisibilityPolicy};
use log::{debug, warn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("invalid course settings: {0}")]
    Settings(#[from] ConfigError),
    #[error("section number {0} appears more than once")]
    DuplicateSection(u32),
}

/// Everything about the request a render depends on.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub course_id: CourseId,
    pub now: Timestamp,
    pub capabilities: Capabilities,
    /// When the viewer last opened the course; `None` for a first visit.
    pub last_access: Option<Timestamp>,
    /// Attach image failure reasons to tiles.
    pub verbose: bool,
}

impl RenderContext {
    pub fn new(course_id: CourseId, now: Timestamp) -> Self {
        Self {
            course_id,
            now,
            capabilities: Capabilities::default(),
            last_access: None,
            verbose: false,
        }
    }
}

/// Output of one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedCourse {
    /// Section 0 when it is placed above the grid.
    pub banner: Option<TileDescriptor>,
    pub tiles: Vec<TileDescriptor>,
}

impl RenderedCourse {
    pub fn active(&self) -> Option<&TileDescriptor> {
        self.banner
            .iter()
            .chain(&self.tiles)
            .find(|t| t.state == TileState::Active)
    }
}

// ============================================================================
// Activity classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityBucket {
    Media,
    Other,
}

/// Sorts activities into the buckets a tile counts.
pub trait ActivityClassifier: Send + Sync {
    fn classify(&self, activity: &Activity) -> ActivityBucket;
}

/// Counts a fixed set of activity kinds as media.
#[derive(Debug, Clone)]
pub struct KindClassifier {
    media_kinds: Vec<String>,
}

impl KindClassifier {
    pub fn new<I, S>(media_kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            media_kinds: media_kinds.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for KindClassifier {
    fn default() -> Self {
        Self::new(["video"])
    }
}

impl ActivityClassifier for KindClassifier {
    fn classify(&self, activity: &Activity) -> ActivityBucket {
        if self
            .media_kinds
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&activity.kind))
        {
            ActivityBucket::Media
        } else {
            ActivityBucket::Other
        }
    }
}

pub fn count_activities(
    activities: &[Activity],
    classifier: &dyn ActivityClassifier,
) -> ActivityCounts {
    activities
        .iter()
        .fold(ActivityCounts::default(), |mut counts, activity| {
            match classifier.classify(activity) {
                ActivityBucket::Media => counts.media += 1,
                ActivityBucket::Other => counts.other += 1,
            }
            counts
        })
}

/// Whether any activity was added after the viewer's last visit.
pub fn has_new_activity(activities: &[Activity], last_access: Option<Timestamp>) -> bool {
    let since = last_access.unwrap_or(0);
    activities.iter().any(|a| a.added > since)
}

// ============================================================================
// Rendering
// ============================================================================

/// Render a course's sections into tile descriptors.
pub fn render_tiles(
    course: &CourseSections,
    settings: &CourseFormatSettings,
    ctx: &RenderContext,
    images: &dyn ImageSource,
    classifier: &dyn ActivityClassifier,
) -> Result<RenderedCourse, RenderError> {
    settings.validate()?;

    let mut sections: Vec<&SectionDescriptor> = course.sections.iter().collect();
    sections.sort_by_key(|s| s.number);
    if let Some(pair) = sections.windows(2).find(|w| w[0].number == w[1].number) {
        return Err(RenderError::DuplicateSection(pair[0].number));
    }

    let policy = VisibilityPolicy::new(
        &course.sections,
        ctx.now,
        ctx.capabilities,
        settings.display.hidden_sections,
    );
    let slot_config = SlotConfig::from_settings(settings);
    let (width, height) =
        container_dimensions(settings.container.width, settings.container.aspect_ratio);
    let show_new = settings.display.new_activity == NewActivity::Show;

    let mut rendered = RenderedCourse::default();
    for section in sections {
        let state = match policy.state(section) {
            SectionState::Suppressed => {
                debug!("course {}: section {} suppressed", ctx.course_id, section.number);
                continue;
            }
            SectionState::Active => TileState::Active,
            SectionState::Inactive => TileState::Inactive,
            SectionState::Locked => TileState::Locked,
        };

        let (image, diagnostic) = match images.display_image(section.id, &slot_config) {
            Ok(SlotLookup::Found(image)) => (Some(image), None),
            Ok(SlotLookup::NotFound) => (None, None),
            Err(e) => {
                warn!(
                    "course {}: section {} renders without image: {e}",
                    ctx.course_id, section.number
                );
                (None, ctx.verbose.then(|| e.to_string()))
            }
        };

        let tile = TileDescriptor {
            section_id: section.id,
            number: section.number,
            width,
            height,
            state,
            hidden: !section.visible,
            current: course.marker == Some(section.number),
            title: derive_title(&section.name, &section.summary, section.number),
            image,
            diagnostic,
            counts: count_activities(&section.activities, classifier),
            has_new_activity: show_new && has_new_activity(&section.activities, ctx.last_access),
        };

        if section.number == 0 && settings.display.section0 == Section0::Top {
            rendered.banner = Some(tile);
        } else {
            rendered.tiles.push(tile);
        }
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HiddenSections;
    use crate::imaging::BackendError;
    use crate::slots::SlotError;
    use crate::store::BlobRef;
    use crate::types::{AvailabilityWindow, ImageRef, SectionId};
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Outcome {
        Image,
        Fail,
    }

    /// Image source with canned answers; unknown sections have no image.
    #[derive(Default)]
    struct FakeImages {
        outcomes: HashMap<SectionId, Outcome>,
        calls: Mutex<Vec<(SectionId, SlotConfig)>>,
    }

    impl FakeImages {
        fn with(outcomes: impl IntoIterator<Item = (SectionId, Outcome)>) -> Self {
            Self {
                outcomes: outcomes.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ImageSource for FakeImages {
        fn display_image(
            &self,
            section: SectionId,
            config: &SlotConfig,
        ) -> Result<SlotLookup, SlotError> {
            self.calls.lock().unwrap().push((section, *config));
            match self.outcomes.get(&section) {
                Some(Outcome::Image) => Ok(SlotLookup::Found(ImageRef {
                    blob: BlobRef::new(format!("img-{section}")),
                    version: 1,
                    width: config.width,
                    height: config.height,
                })),
                Some(Outcome::Fail) => Err(SlotError::Imaging(BackendError::ProcessingFailed(
                    "corrupt original".into(),
                ))),
                None => Ok(SlotLookup::NotFound),
            }
        }
    }

    fn section(number: u32) -> SectionDescriptor {
        let mut s = SectionDescriptor::new(u64::from(number) + 100, number);
        s.name = format!("Topic {number}");
        s
    }

    fn course(sections: Vec<SectionDescriptor>) -> CourseSections {
        CourseSections {
            marker: None,
            sections,
        }
    }

    fn render(course: &CourseSections, settings: &CourseFormatSettings) -> RenderedCourse {
        render_with(course, settings, &RenderContext::new(1, 1_000), &FakeImages::default())
    }

    fn render_with(
        course: &CourseSections,
        settings: &CourseFormatSettings,
        ctx: &RenderContext,
        images: &FakeImages,
    ) -> RenderedCourse {
        render_tiles(course, settings, ctx, images, &KindClassifier::default()).unwrap()
    }

    fn numbers(tiles: &[TileDescriptor]) -> Vec<u32> {
        tiles.iter().map(|t| t.number).collect()
    }

    // =========================================================================
    // Ordering and section 0
    // =========================================================================

    #[test]
    fn tiles_in_ascending_number_order() {
        let c = course(vec![section(3), section(1), section(2)]);
        let out = render(&c, &CourseFormatSettings::default());
        assert_eq!(numbers(&out.tiles), vec![1, 2, 3]);
    }

    #[test]
    fn section0_top_becomes_banner() {
        let c = course(vec![section(0), section(1)]);
        let out = render(&c, &CourseFormatSettings::default());
        assert_eq!(out.banner.as_ref().map(|b| b.number), Some(0));
        assert_eq!(numbers(&out.tiles), vec![1]);
    }

    #[test]
    fn section0_grid_becomes_first_tile() {
        let mut settings = CourseFormatSettings::default();
        settings.display.section0 = Section0::Grid;
        let c = course(vec![section(1), section(0)]);
        let out = render(&c, &settings);
        assert!(out.banner.is_none());
        assert_eq!(numbers(&out.tiles), vec![0, 1]);
    }

    #[test]
    fn duplicate_numbers_abort_render() {
        let c = course(vec![section(1), section(2), section(2)]);
        let result = render_tiles(
            &c,
            &CourseFormatSettings::default(),
            &RenderContext::new(1, 0),
            &FakeImages::default(),
            &KindClassifier::default(),
        );
        assert!(matches!(result, Err(RenderError::DuplicateSection(2))));
    }

    #[test]
    fn invalid_settings_abort_render() {
        let mut settings = CourseFormatSettings::default();
        settings.style.border_width = 0;
        let result = render_tiles(
            &course(vec![section(1)]),
            &settings,
            &RenderContext::new(1, 0),
            &FakeImages::default(),
            &KindClassifier::default(),
        );
        assert!(matches!(result, Err(RenderError::Settings(_))));
    }

    #[test]
    fn empty_course_renders_nothing() {
        let out = render(&course(vec![]), &CourseFormatSettings::default());
        assert_eq!(out, RenderedCourse::default());
    }

    // =========================================================================
    // Geometry and images
    // =========================================================================

    #[test]
    fn tiles_use_container_geometry() {
        let images = FakeImages::with([(101, Outcome::Image)]);
        let out = render_with(
            &course(vec![section(1)]),
            &CourseFormatSettings::default(),
            &RenderContext::new(1, 0),
            &images,
        );
        let tile = &out.tiles[0];
        assert_eq!((tile.width, tile.height), (210, 140));
        let image = tile.image.as_ref().unwrap();
        // Image sits inside the border
        assert_eq!((image.width, image.height), (204, 134));
        let calls = images.calls.lock().unwrap();
        assert_eq!(calls[0].0, 101);
        assert_eq!((calls[0].1.width, calls[0].1.height), (204, 134));
    }

    #[test]
    fn missing_image_is_placeholder_without_diagnostic() {
        let mut ctx = RenderContext::new(1, 0);
        ctx.verbose = true;
        let out = render_with(
            &course(vec![section(1)]),
            &CourseFormatSettings::default(),
            &ctx,
            &FakeImages::default(),
        );
        assert_eq!(out.tiles[0].image, None);
        assert_eq!(out.tiles[0].diagnostic, None);
    }

    #[test]
    fn failed_image_does_not_abort_siblings() {
        let images = FakeImages::with([
            (101, Outcome::Image),
            (102, Outcome::Fail),
            (103, Outcome::Image),
        ]);
        let c = course(vec![section(1), section(2), section(3)]);
        let out = render_with(
            &c,
            &CourseFormatSettings::default(),
            &RenderContext::new(1, 0),
            &images,
        );
        assert_eq!(out.tiles.len(), 3);
        assert!(out.tiles[0].image.is_some());
        assert!(out.tiles[1].image.is_none());
        assert_eq!(out.tiles[1].diagnostic, None);
        assert!(out.tiles[2].image.is_some());
    }

    #[test]
    fn verbose_render_carries_diagnostic() {
        let images = FakeImages::with([(102, Outcome::Fail)]);
        let mut ctx = RenderContext::new(1, 0);
        ctx.verbose = true;
        let out = render_with(
            &course(vec![section(2)]),
            &CourseFormatSettings::default(),
            &ctx,
            &images,
        );
        let diagnostic = out.tiles[0].diagnostic.as_deref().unwrap();
        assert!(diagnostic.contains("corrupt original"));
    }

    // =========================================================================
    // Visibility and state
    // =========================================================================

    #[test]
    fn suppressed_sections_skipped_and_not_queried() {
        let mut hidden = section(2);
        hidden.visible = false;
        hidden.available = false;
        let mut settings = CourseFormatSettings::default();
        settings.display.hidden_sections = HiddenSections::Invisible;
        let images = FakeImages::default();
        let out = render_with(
            &course(vec![section(1), hidden, section(3)]),
            &settings,
            &RenderContext::new(1, 0),
            &images,
        );
        assert_eq!(numbers(&out.tiles), vec![1, 3]);
        assert!(images.calls.lock().unwrap().iter().all(|(id, _)| *id != 102));
    }

    #[test]
    fn editor_sees_hidden_section_marked() {
        let mut hidden = section(2);
        hidden.visible = false;
        let mut ctx = RenderContext::new(1, 0);
        ctx.capabilities = Capabilities::editor();
        let out = render_with(
            &course(vec![section(1), hidden]),
            &CourseFormatSettings::default(),
            &ctx,
            &FakeImages::default(),
        );
        assert_eq!(numbers(&out.tiles), vec![1, 2]);
        assert!(!out.tiles[0].hidden);
        assert!(out.tiles[1].hidden);
    }

    #[test]
    fn time_states() {
        let mut open = section(1);
        open.window = Some(AvailabilityWindow::new(500, 1_500));
        let mut upcoming = section(2);
        upcoming.window = Some(AvailabilityWindow::new(2_000, 3_000));
        let plain = section(3);
        let out = render(
            &course(vec![open, upcoming, plain]),
            &CourseFormatSettings::default(),
        );
        let states: Vec<_> = out.tiles.iter().map(|t| t.state).collect();
        assert_eq!(
            states,
            vec![TileState::Active, TileState::Locked, TileState::Inactive]
        );
        assert_eq!(out.active().map(|t| t.number), Some(1));
    }

    #[test]
    fn marker_flags_current_tile() {
        let mut c = course(vec![section(1), section(2)]);
        c.marker = Some(2);
        let out = render(&c, &CourseFormatSettings::default());
        assert!(!out.tiles[0].current);
        assert!(out.tiles[1].current);
    }

    // =========================================================================
    // Titles, counts, new activity
    // =========================================================================

    #[test]
    fn title_from_summary_when_unnamed() {
        let mut s = section(1);
        s.name.clear();
        s.summary = "<p>Hello world this is a long summary paragraph</p>".into();
        let out = render(&course(vec![s]), &CourseFormatSettings::default());
        let title = &out.tiles[0].title;
        assert!(title.chars().count() <= 40);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn activities_counted_by_classifier() {
        let mut s = section(1);
        s.activities = vec![
            Activity { id: 1, kind: "video".into(), added: 10 },
            Activity { id: 2, kind: "quiz".into(), added: 10 },
            Activity { id: 3, kind: "Video".into(), added: 10 },
            Activity { id: 4, kind: "forum".into(), added: 10 },
        ];
        let out = render(&course(vec![s.clone()]), &CourseFormatSettings::default());
        assert_eq!(out.tiles[0].counts, ActivityCounts { media: 2, other: 2 });

        let custom = KindClassifier::new(["quiz", "forum"]);
        assert_eq!(
            count_activities(&s.activities, &custom),
            ActivityCounts { media: 2, other: 2 }
        );
        let none = KindClassifier::new(Vec::<String>::new());
        assert_eq!(
            count_activities(&s.activities, &none),
            ActivityCounts { media: 0, other: 4 }
        );
    }

    #[test]
    fn new_activity_since_last_access() {
        let mut s = section(1);
        s.activities = vec![Activity { id: 1, kind: "page".into(), added: 500 }];
        let c = course(vec![s]);
        let settings = CourseFormatSettings::default();

        let mut ctx = RenderContext::new(1, 1_000);
        ctx.last_access = Some(400);
        assert!(render_with(&c, &settings, &ctx, &FakeImages::default()).tiles[0].has_new_activity);

        ctx.last_access = Some(600);
        assert!(!render_with(&c, &settings, &ctx, &FakeImages::default()).tiles[0].has_new_activity);

        let mut hidden = settings.clone();
        hidden.display.new_activity = NewActivity::Hide;
        ctx.last_access = Some(400);
        assert!(!render_with(&c, &hidden, &ctx, &FakeImages::default()).tiles[0].has_new_activity);
    }

    #[test]
    fn first_visit_sees_everything_as_new() {
        let activities = vec![Activity { id: 1, kind: "page".into(), added: 1 }];
        assert!(has_new_activity(&activities, None));
        assert!(!has_new_activity(&[], None));
    }
}
