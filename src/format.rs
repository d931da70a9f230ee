//! Course format service.
//!
//! Ties the pieces together for a host: it owns the per-course settings
//! snapshots, the image slot manager and the activity classifier, and is
//! the one place settings are created, changed and deleted.
//!
//! ## Settings snapshots
//!
//! Every course's settings are held as an `Arc<CourseFormatSettings>`.
//! A render clones the `Arc` once and uses that snapshot throughout; an
//! update builds and validates a complete new value, persists it, then swaps
//! the `Arc`. Readers therefore see either the old settings or the new ones,
//! never a mix.
//!
//! ## Upsert on miss
//!
//! A course without stored settings gets the site defaults the first time
//! they are asked for, and those defaults are written back so later changes
//! to the site config do not silently alter existing courses.

use crate::config::{
    ConfigError, CourseFormatSettings, ResetFlags, apply_override, reset_settings,
};
use crate::imaging::ImageBackend;
use crate::render::{
    ActivityClassifier, KindClassifier, RenderContext, RenderError, RenderedCourse, render_tiles,
};
use crate::slots::{ImageSlotManager, SlotError};
use crate::store::{BlobStore, RecordStore, StoreError};
use crate::types::{CourseId, CourseSections, SectionId};
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Outcome of a settings change.
#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub settings: Arc<CourseFormatSettings>,
    /// Displayed images dropped up front. Sections not listed by the caller
    /// rebuild on their next render instead.
    pub invalidated: usize,
}

/// Grid course format over a record store, a blob store and an image
/// backend.
pub struct CourseFormat {
    records: Arc<dyn RecordStore>,
    slots: ImageSlotManager,
    defaults: CourseFormatSettings,
    classifier: Box<dyn ActivityClassifier>,
    snapshots: RwLock<HashMap<CourseId, Arc<CourseFormatSettings>>>,
    updates: Mutex<()>,
}

impl CourseFormat {
    /// `defaults` are the site defaults new courses start from.
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        backend: Arc<dyn ImageBackend>,
        defaults: CourseFormatSettings,
    ) -> Self {
        let slots = ImageSlotManager::new(Arc::clone(&records), blobs, backend);
        Self {
            records,
            slots,
            defaults,
            classifier: Box::new(KindClassifier::default()),
            snapshots: RwLock::new(HashMap::new()),
            updates: Mutex::new(()),
        }
    }

    /// Replace the activity classifier.
    pub fn with_classifier(mut self, classifier: impl ActivityClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn slots(&self) -> &ImageSlotManager {
        &self.slots
    }

    pub fn defaults(&self) -> &CourseFormatSettings {
        &self.defaults
    }

    /// Current settings snapshot for a course, created from the site
    /// defaults when the course has none.
    pub fn settings(&self, course: CourseId) -> Result<Arc<CourseFormatSettings>, FormatError> {
        if let Some(snapshot) = self.read_snapshot(course) {
            return Ok(snapshot);
        }

        let settings = match self.records.load_settings(course)? {
            Some(stored) => {
                stored.validate()?;
                stored
            }
            None => {
                self.records.save_settings(course, &self.defaults)?;
                info!("course {course}: created settings from site defaults");
                self.defaults.clone()
            }
        };
        let mut snapshots = self
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = snapshots
            .entry(course)
            .or_insert_with(|| Arc::new(settings));
        Ok(Arc::clone(snapshot))
    }

    fn read_snapshot(&self, course: CourseId) -> Option<Arc<CourseFormatSettings>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&course)
            .cloned()
    }

    /// Validate, persist and publish new settings for a course.
    ///
    /// When the change affects displayed images, the derivatives of
    /// `sections` are dropped so the next render rebuilds them.
    pub fn update_settings(
        &self,
        course: CourseId,
        new: CourseFormatSettings,
        sections: &[SectionId],
    ) -> Result<SettingsUpdate, FormatError> {
        let _update = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        new.validate()?;
        let old = self.settings(course)?;
        if *old == new {
            return Ok(SettingsUpdate {
                settings: old,
                invalidated: 0,
            });
        }

        self.records.save_settings(course, &new)?;
        let new = Arc::new(new);
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(course, Arc::clone(&new));
        info!("course {course}: settings updated");

        let invalidated = if old.affects_images(&new) {
            self.slots.invalidate_all(sections)?
        } else {
            0
        };
        Ok(SettingsUpdate {
            settings: new,
            invalidated,
        })
    }

    /// Change one `section.key` setting from its text form.
    pub fn set(
        &self,
        course: CourseId,
        key: &str,
        value: &str,
        sections: &[SectionId],
    ) -> Result<SettingsUpdate, FormatError> {
        let current = self.settings(course)?;
        let new = apply_override(&current, key, value)?;
        self.update_settings(course, new, sections)
    }

    /// Put groups of settings back to the site defaults.
    pub fn reset_settings(
        &self,
        course: CourseId,
        flags: ResetFlags,
        sections: &[SectionId],
    ) -> Result<SettingsUpdate, FormatError> {
        let current = self.settings(course)?;
        let new = reset_settings(&current, &self.defaults, flags);
        self.update_settings(course, new, sections)
    }

    /// Render a course with its current settings snapshot.
    pub fn render(
        &self,
        course: &CourseSections,
        ctx: &RenderContext,
    ) -> Result<RenderedCourse, FormatError> {
        let settings = self.settings(ctx.course_id)?;
        Ok(render_tiles(
            course,
            &settings,
            ctx,
            &self.slots,
            self.classifier.as_ref(),
        )?)
    }

    /// Forget everything stored for a deleted section.
    pub fn delete_section(&self, section: SectionId) -> Result<(), FormatError> {
        self.slots.delete_section(section)?;
        Ok(())
    }

    /// Forget a deleted course: its sections' images and its settings.
    pub fn delete_course(&self, course: CourseId, sections: &[SectionId]) -> Result<(), FormatError> {
        for &section in sections {
            self.slots.delete_section(section)?;
        }
        self.records.delete_settings(course)?;
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&course);
        info!("course {course}: deleted settings and {} section image(s)", sections.len());
        Ok(())
    }
}
