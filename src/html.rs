//! HTML output using Maud templates.
//!
//! Turns a [`RenderedCourse`] into grid or list markup. Nothing here
//! decides what is shown; every value comes from the tile descriptors and
//! the course settings.
//!
//! ## Links
//!
//! | Course display | Tile link |
//! |---|---|
//! | single-page | `#section-N` |
//! | multi-page | `?section=N` |
//!
//! Image URLs are produced by a caller-supplied function so the markup does
//! not depend on where blobs live.

use crate::config::{CourseDisplay, CourseFormatSettings, Layout, generate_tile_css};
use crate::render::RenderedCourse;
use crate::types::{ImageRef, TileDescriptor, TileState};
use maud::{DOCTYPE, Markup, PreEscaped, html};

const CSS_STATIC: &str = include_str!("../static/tiles.css");

/// Link target of a section tile.
pub fn tile_link(number: u32, display: CourseDisplay) -> String {
    match display {
        CourseDisplay::SinglePage => format!("#section-{number}"),
        CourseDisplay::MultiPage => format!("?section={number}"),
    }
}

fn tile_classes(tile: &TileDescriptor) -> String {
    let mut classes = vec!["tile"];
    match tile.state {
        TileState::Active => classes.push("active"),
        TileState::Locked => classes.push("locked"),
        TileState::Inactive => {}
    }
    if tile.hidden {
        classes.push("hidden");
    }
    if tile.current {
        classes.push("current");
    }
    classes.join(" ")
}

fn tile_body(tile: &TileDescriptor, image_url: &dyn Fn(&ImageRef) -> String) -> Markup {
    html! {
        div.tile-image style={ "height: " (tile.height) "px" } {
            @if let Some(image) = &tile.image {
                img src=(image_url(image)) alt=(tile.title)
                    width=(image.width) height=(image.height) loading="lazy";
            } @else {
                span.tile-placeholder { (tile.title) }
            }
        }
        span.tile-title { (tile.title) }
        @if tile.counts.media > 0 || tile.counts.other > 0 {
            span.tile-counts {
                @if tile.counts.media > 0 {
                    (tile.counts.media) " media"
                    @if tile.counts.other > 0 { ", " }
                }
                @if tile.counts.other > 0 {
                    (tile.counts.other) " activities"
                }
            }
        }
        @if tile.has_new_activity {
            span.tile-new { "New activity" }
        }
    }
}

/// One grid tile. Locked tiles are not links.
pub fn render_tile(
    tile: &TileDescriptor,
    display: CourseDisplay,
    image_url: &dyn Fn(&ImageRef) -> String,
) -> Markup {
    html! {
        li class=(tile_classes(tile)) id={ "tile-" (tile.number) } {
            @if tile.state == TileState::Locked {
                div.tile-body { (tile_body(tile, image_url)) }
            } @else {
                a href=(tile_link(tile.number, display)) { (tile_body(tile, image_url)) }
            }
            @if let Some(diagnostic) = &tile.diagnostic {
                span.tile-diagnostic { (diagnostic) }
            }
        }
    }
}

fn render_list_item(tile: &TileDescriptor, display: CourseDisplay) -> Markup {
    html! {
        li class=[tile.current.then_some("current")] {
            @if tile.state == TileState::Locked {
                span { (tile.title) }
            } @else {
                a href=(tile_link(tile.number, display)) { (tile.title) }
            }
            @if tile.has_new_activity {
                " "
                span.tile-new { "New activity" }
            }
        }
    }
}

/// Banner, then tiles or list, plus the course's CSS custom properties.
pub fn render_course(
    course: &RenderedCourse,
    settings: &CourseFormatSettings,
    image_url: &dyn Fn(&ImageRef) -> String,
) -> Markup {
    let display = settings.display.course_display;
    html! {
        style { (PreEscaped(generate_tile_css(settings))) }
        @if let Some(banner) = &course.banner {
            section.course-banner id={ "section-" (banner.number) } {
                h2 { (banner.title) }
                @if let Some(image) = &banner.image {
                    img src=(image_url(image)) alt=(banner.title)
                        width=(image.width) height=(image.height);
                }
            }
        }
        @match settings.display.layout {
            Layout::Grid => {
                ul.tile-grid {
                    @for tile in &course.tiles {
                        (render_tile(tile, display, image_url))
                    }
                }
            }
            Layout::List => {
                ul.section-list {
                    @for tile in &course.tiles {
                        (render_list_item(tile, display))
                    }
                }
            }
        }
    }
}

/// A standalone HTML document for one course.
pub fn render_page(
    title: &str,
    course: &RenderedCourse,
    settings: &CourseFormatSettings,
    image_url: &dyn Fn(&ImageRef) -> String,
) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (PreEscaped(CSS_STATIC)) }
            }
            body {
                main.course { (render_course(course, settings, image_url)) }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BlobRef;
    use crate::types::ActivityCounts;

    fn tile(number: u32) -> TileDescriptor {
        TileDescriptor {
            section_id: u64::from(number),
            number,
            width: 210,
            height: 140,
            state: TileState::Inactive,
            hidden: false,
            current: false,
            title: format!("Topic {number}"),
            image: None,
            diagnostic: None,
            counts: ActivityCounts::default(),
            has_new_activity: false,
        }
    }

    fn url(image: &ImageRef) -> String {
        format!("/img/{}?v={}", image.blob, image.version)
    }

    fn course(tiles: Vec<TileDescriptor>) -> RenderedCourse {
        RenderedCourse {
            banner: None,
            tiles,
        }
    }

    fn render(course: &RenderedCourse, settings: &CourseFormatSettings) -> String {
        render_course(course, settings, &url).into_string()
    }

    #[test]
    fn single_page_links_to_anchor() {
        assert_eq!(tile_link(3, CourseDisplay::SinglePage), "#section-3");
        assert_eq!(tile_link(3, CourseDisplay::MultiPage), "?section=3");
    }

    #[test]
    fn grid_renders_tiles_in_order() {
        let html = render(&course(vec![tile(1), tile(2)]), &CourseFormatSettings::default());
        let first = html.find("id=\"tile-1\"").unwrap();
        let second = html.find("id=\"tile-2\"").unwrap();
        assert!(first < second);
        assert!(html.contains("href=\"#section-1\""));
        assert!(html.contains("class=\"tile-grid\""));
    }

    #[test]
    fn multi_page_links() {
        let mut settings = CourseFormatSettings::default();
        settings.display.course_display = CourseDisplay::MultiPage;
        let html = render(&course(vec![tile(4)]), &settings);
        assert!(html.contains("href=\"?section=4\""));
    }

    #[test]
    fn image_tile_uses_url_and_dimensions() {
        let mut t = tile(1);
        t.image = Some(ImageRef {
            blob: BlobRef::new("abc-0"),
            version: 3,
            width: 204,
            height: 134,
        });
        let html = render(&course(vec![t]), &CourseFormatSettings::default());
        assert!(html.contains("src=\"/img/abc-0?v=3\""));
        assert!(html.contains("width=\"204\""));
        assert!(!html.contains("tile-placeholder"));
    }

    #[test]
    fn missing_image_renders_placeholder() {
        let html = render(&course(vec![tile(1)]), &CourseFormatSettings::default());
        assert!(html.contains("<span class=\"tile-placeholder\">Topic 1</span>"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn state_classes() {
        let mut active = tile(1);
        active.state = TileState::Active;
        active.current = true;
        let mut locked = tile(2);
        locked.state = TileState::Locked;
        locked.hidden = true;
        let html = render(&course(vec![active, locked]), &CourseFormatSettings::default());
        assert!(html.contains("class=\"tile active current\""));
        assert!(html.contains("class=\"tile locked hidden\""));
        // Locked tile has no link
        assert!(!html.contains("href=\"#section-2\""));
    }

    #[test]
    fn diagnostic_and_counts_shown() {
        let mut t = tile(1);
        t.diagnostic = Some("storage failure: disk full".into());
        t.counts = ActivityCounts { media: 2, other: 1 };
        t.has_new_activity = true;
        let html = render(&course(vec![t]), &CourseFormatSettings::default());
        assert!(html.contains("storage failure: disk full"));
        assert!(html.contains("2 media, 1 activities"));
        assert!(html.contains("New activity"));
    }

    #[test]
    fn titles_are_escaped() {
        let mut t = tile(1);
        t.title = "<script>alert(1)</script>".into();
        let html = render(&course(vec![t]), &CourseFormatSettings::default());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn list_layout() {
        let mut settings = CourseFormatSettings::default();
        settings.display.layout = Layout::List;
        let mut current = tile(2);
        current.current = true;
        let html = render(&course(vec![tile(1), current]), &settings);
        assert!(html.contains("class=\"section-list\""));
        assert!(html.contains("<li class=\"current\"><a href=\"#section-2\">Topic 2</a></li>"));
        assert!(!html.contains("tile-grid"));
    }

    #[test]
    fn banner_rendered_above_grid() {
        let mut rendered = course(vec![tile(1)]);
        rendered.banner = Some(tile(0));
        let html = render(&rendered, &CourseFormatSettings::default());
        let banner = html.find("course-banner").unwrap();
        let grid = html.find("tile-grid").unwrap();
        assert!(banner < grid);
        assert!(html.contains("id=\"section-0\""));
    }

    #[test]
    fn page_is_full_document() {
        let html = render_page(
            "Course",
            &course(vec![tile(1)]),
            &CourseFormatSettings::default(),
            &url,
        )
        .into_string();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Course</title>"));
        assert!(html.contains("--tile-width: 210px"));
    }
}
