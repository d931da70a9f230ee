//! Section visibility policy.
//!
//! Decides, per section, whether a tile is rendered at all and which time
//! state it shows. Inputs are the section descriptor, the current time, the
//! viewer's capabilities and the course's hidden-sections mode; nothing here
//! touches storage.
//!
//! ## Render rule
//!
//! A tile is rendered when the viewer may see hidden sections, or when the
//! section is visible and at least one of these holds: it is available, it
//! asks to show its availability notice, or the course shows restricted
//! sections collapsed rather than hiding them.
//!
//! ## Active section
//!
//! A section with a complete window `[start, end]` is time-active when
//! `start <= now <= end`. Several sections can match at once; the one with
//! the earliest start wins, then the lowest section number. Everything else
//! that is rendered is either locked (start in the future) or inactive.

use crate::config::HiddenSections;
use crate::types::{SectionDescriptor, Timestamp};

/// What the viewer is allowed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub view_hidden_sections: bool,
    pub change_layout: bool,
}

impl Capabilities {
    /// A course editor: sees hidden sections and may change settings.
    pub fn editor() -> Self {
        Self {
            view_hidden_sections: true,
            change_layout: true,
        }
    }
}

/// Outcome of the policy for one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Active,
    Inactive,
    Locked,
    Suppressed,
}

pub fn is_rendered(
    section: &SectionDescriptor,
    caps: Capabilities,
    hidden_sections: HiddenSections,
) -> bool {
    caps.view_hidden_sections
        || (section.visible
            && (section.available
                || section.show_availability
                || hidden_sections == HiddenSections::Collapsed))
}

/// Whether `now` falls inside the section's complete availability window.
pub fn is_time_active(section: &SectionDescriptor, now: Timestamp) -> bool {
    section
        .effective_window()
        .and_then(|w| w.bounds())
        .is_some_and(|(start, end)| start <= now && now <= end)
}

/// Whether the section opens strictly after `now`.
pub fn is_locked(section: &SectionDescriptor, now: Timestamp) -> bool {
    section
        .effective_window()
        .and_then(|w| w.start)
        .is_some_and(|start| start > now)
}

/// Pick the single active section number among `sections`.
pub fn select_active<'a, I>(sections: I, now: Timestamp) -> Option<u32>
where
    I: IntoIterator<Item = &'a SectionDescriptor>,
{
    sections
        .into_iter()
        .filter(|s| is_time_active(s, now))
        .filter_map(|s| {
            let (start, _) = s.effective_window()?.bounds()?;
            Some((start, s.number))
        })
        .min()
        .map(|(_, number)| number)
}

/// The policy for one render: viewer, clock and course mode fixed.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityPolicy {
    pub now: Timestamp,
    pub caps: Capabilities,
    pub hidden_sections: HiddenSections,
    /// Section number chosen by [`select_active`] over the rendered set.
    pub active: Option<u32>,
}

impl VisibilityPolicy {
    /// Build a policy and resolve the active section among the sections
    /// this viewer will actually see.
    pub fn new(
        sections: &[SectionDescriptor],
        now: Timestamp,
        caps: Capabilities,
        hidden_sections: HiddenSections,
    ) -> Self {
        let active = select_active(
            sections
                .iter()
                .filter(|s| is_rendered(s, caps, hidden_sections)),
            now,
        );
        Self {
            now,
            caps,
            hidden_sections,
            active,
        }
    }

    pub fn state(&self, section: &SectionDescriptor) -> SectionState {
        if !is_rendered(section, self.caps, self.hidden_sections) {
            SectionState::Suppressed
        } else if self.active == Some(section.number) {
            SectionState::Active
        } else if is_locked(section, self.now) {
            SectionState::Locked
        } else {
            SectionState::Inactive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AvailabilityWindow;

    fn section(number: u32) -> SectionDescriptor {
        SectionDescriptor::new(u64::from(number) + 100, number)
    }

    fn windowed(number: u32, start: Timestamp, end: Timestamp) -> SectionDescriptor {
        let mut s = section(number);
        s.window = Some(AvailabilityWindow::new(start, end));
        s
    }

    // =========================================================================
    // Render rule
    // =========================================================================

    #[test]
    fn hidden_unavailable_invisible_mode_is_suppressed() {
        let mut s = section(1);
        s.visible = false;
        s.available = false;
        let policy = VisibilityPolicy::new(
            &[],
            0,
            Capabilities::default(),
            HiddenSections::Invisible,
        );
        assert_eq!(policy.state(&s), SectionState::Suppressed);
    }

    #[test]
    fn override_capability_renders_everything() {
        let mut s = section(1);
        s.visible = false;
        s.available = false;
        assert!(is_rendered(
            &s,
            Capabilities::editor(),
            HiddenSections::Invisible
        ));
    }

    #[test]
    fn invisible_section_not_rescued_by_collapsed_mode() {
        let mut s = section(1);
        s.visible = false;
        assert!(!is_rendered(
            &s,
            Capabilities::default(),
            HiddenSections::Collapsed
        ));
    }

    #[test]
    fn unavailable_visible_section() {
        let mut s = section(1);
        s.available = false;
        let student = Capabilities::default();
        assert!(is_rendered(&s, student, HiddenSections::Collapsed));
        assert!(!is_rendered(&s, student, HiddenSections::Invisible));
        s.show_availability = true;
        assert!(is_rendered(&s, student, HiddenSections::Invisible));
    }

    // =========================================================================
    // Time window
    // =========================================================================

    #[test]
    fn now_inside_window_is_active() {
        let sections = vec![section(1), windowed(2, 100, 200), section(3)];
        let policy = VisibilityPolicy::new(
            &sections,
            150,
            Capabilities::default(),
            HiddenSections::Collapsed,
        );
        let states: Vec<_> = sections.iter().map(|s| policy.state(s)).collect();
        assert_eq!(
            states,
            vec![
                SectionState::Inactive,
                SectionState::Active,
                SectionState::Inactive
            ]
        );
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let s = windowed(1, 100, 200);
        assert!(is_time_active(&s, 100));
        assert!(is_time_active(&s, 200));
        assert!(!is_time_active(&s, 99));
        assert!(!is_time_active(&s, 201));
    }

    #[test]
    fn no_window_never_active() {
        let s = section(1);
        for now in [i64::MIN, 0, 1_700_000_000, i64::MAX] {
            assert!(!is_time_active(&s, now));
        }
    }

    #[test]
    fn incomplete_window_never_active() {
        let mut s = section(1);
        s.window = Some(AvailabilityWindow {
            start: Some(0),
            end: None,
        });
        assert!(!is_time_active(&s, 10));
    }

    #[test]
    fn malformed_condition_json_never_active() {
        let mut s = section(1);
        s.availability = Some("{\"c\": [".into());
        assert!(!is_time_active(&s, 10));
        assert!(!is_locked(&s, 10));
    }

    #[test]
    fn future_start_is_locked() {
        let s = windowed(4, 500, 600);
        let policy = VisibilityPolicy::new(
            std::slice::from_ref(&s),
            100,
            Capabilities::default(),
            HiddenSections::Collapsed,
        );
        assert_eq!(policy.state(&s), SectionState::Locked);
        assert!(!is_locked(&s, 500));
    }

    #[test]
    fn past_window_is_inactive() {
        let s = windowed(4, 100, 200);
        let policy = VisibilityPolicy::new(
            std::slice::from_ref(&s),
            300,
            Capabilities::default(),
            HiddenSections::Collapsed,
        );
        assert_eq!(policy.state(&s), SectionState::Inactive);
    }

    // =========================================================================
    // Tie-break
    // =========================================================================

    #[test]
    fn overlapping_windows_earliest_start_wins() {
        let sections = vec![windowed(1, 120, 300), windowed(2, 100, 300)];
        assert_eq!(select_active(&sections, 150), Some(2));
    }

    #[test]
    fn equal_starts_lowest_number_wins() {
        let sections = vec![windowed(5, 100, 300), windowed(3, 100, 300)];
        assert_eq!(select_active(&sections, 150), Some(3));

        let policy = VisibilityPolicy::new(
            &sections,
            150,
            Capabilities::default(),
            HiddenSections::Collapsed,
        );
        assert_eq!(policy.state(&sections[0]), SectionState::Inactive);
        assert_eq!(policy.state(&sections[1]), SectionState::Active);
    }

    #[test]
    fn suppressed_sections_cannot_win() {
        let mut hidden = windowed(1, 50, 300);
        hidden.visible = false;
        let sections = vec![hidden, windowed(2, 100, 300)];
        let policy = VisibilityPolicy::new(
            &sections,
            150,
            Capabilities::default(),
            HiddenSections::Collapsed,
        );
        assert_eq!(policy.active, Some(2));
    }
}
