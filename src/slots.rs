//! Image slot manager.
//!
//! Each section has at most one image slot: an uploaded original and a
//! displayed derivative resized to the tile. Derivatives are created lazily
//! on the first render that needs them and dropped whenever the original
//! or the size settings change.
//!
//! ## Versions
//!
//! A [`SectionImageRecord`] carries two counters. `original_version` moves
//! every time the displayed image must be rebuilt; `displayed_version` is
//! stamped on each derivative. A derivative is fresh while
//! `displayed_version >= original_version` and its stored [`DisplayTarget`]
//! (box, resize method, quality) equals the one the lookup asks for, so a
//! settings change reaches every section on its next render whether or not
//! it was invalidated up front. Every new derivative gets a
//! version strictly greater than anything the section had before, so the
//! version doubles as a cache-busting key for the markup layer.
//!
//! ## Concurrency
//!
//! All mutations of one section run under that section's lock. A lookup
//! takes the lock-free fast path when the record is fresh; otherwise it
//! re-checks freshness under the lock before deriving, so concurrent renders
//! of the same section produce one derivative between them.
//!
//! With a deadline configured, the derivation runs on the `rayon` pool and
//! the caller waits at most that long. A late derivation still completes and
//! stores its result for the next render; the caller gets
//! [`SlotError::DeadlineExceeded`] and renders a placeholder.
//!
//! ## Failure handling
//!
//! Uploads are identified before anything is written, so an unsupported
//! file never touches the slot. A blob written during a failed operation is
//! deleted again and the record keeps its previous state. Blobs that a
//! successful operation replaces are deleted after the record is saved; a
//! failure there only leaves an orphan and is logged.

use crate::config::CourseFormatSettings;
use crate::geometry::displayed_image_dimensions;
use crate::imaging::{
    BackendError, ImageBackend, Quality, ResizeMethod, ResizeParams, output_dimensions,
};
use crate::store::{
    BlobRef, BlobStore, DisplayTarget, DisplayedImage, OriginalImage, RecordStore,
    SectionImageRecord, StoreError,
};
use crate::types::{ImageRef, SectionId};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StoreError),
    #[error("image processing failed: {0}")]
    Imaging(BackendError),
    #[error("displayed image not ready within {0:?}")]
    DeadlineExceeded(Duration),
}

impl SlotError {
    /// Whether trying the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SlotError::StorageFailure(_) | SlotError::DeadlineExceeded(_)
        )
    }
}

/// Result of a displayed-image lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLookup {
    Found(ImageRef),
    /// No original uploaded for the section.
    NotFound,
}

impl SlotLookup {
    pub fn image(self) -> Option<ImageRef> {
        match self {
            SlotLookup::Found(image) => Some(image),
            SlotLookup::NotFound => None,
        }
    }
}

/// What a derivative must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    pub width: u32,
    pub height: u32,
    pub method: ResizeMethod,
    pub quality: Quality,
    /// Longest a lookup waits for a derivation; `None` derives inline.
    pub deadline: Option<Duration>,
}

impl SlotConfig {
    pub fn from_settings(settings: &CourseFormatSettings) -> Self {
        let (width, height) = displayed_image_dimensions(
            settings.container.width,
            settings.container.aspect_ratio,
            settings.style.border_width,
        );
        Self {
            width,
            height,
            method: settings.container.resize_method,
            quality: Quality::new(settings.processing.quality),
            deadline: Some(Duration::from_millis(settings.processing.derive_timeout_ms)),
        }
    }

    /// The part of the config a stored derivative has to match.
    pub fn target(&self) -> DisplayTarget {
        DisplayTarget {
            width: self.width,
            height: self.height,
            method: self.method,
            quality: self.quality.value(),
        }
    }
}

/// Anything that can hand the renderer a displayed image.
pub trait ImageSource {
    fn display_image(&self, section: SectionId, config: &SlotConfig)
    -> Result<SlotLookup, SlotError>;
}

/// Summary of slot activity since the manager was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotStats {
    pub hits: u32,
    pub derived: u32,
    pub missing: u32,
    pub timeouts: u32,
}

impl SlotStats {
    pub fn total(&self) -> u32 {
        self.hits + self.derived + self.missing + self.timeouts
    }
}

impl fmt::Display for SlotStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} derived ({} total)",
                self.hits,
                self.derived,
                self.total()
            )?;
        } else {
            write!(f, "{} derived", self.derived)?;
        }
        if self.missing > 0 {
            write!(f, ", {} without image", self.missing)?;
        }
        if self.timeouts > 0 {
            write!(f, ", {} timed out", self.timeouts)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU32,
    derived: AtomicU32,
    missing: AtomicU32,
    timeouts: AtomicU32,
}

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct SlotInner {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    backend: Arc<dyn ImageBackend>,
    locks: Mutex<HashMap<SectionId, Arc<Mutex<()>>>>,
    counters: Counters,
}

/// Per-section image bookkeeping over a record store and a blob store.
///
/// Cheap to clone; clones share locks and statistics.
#[derive(Clone)]
pub struct ImageSlotManager {
    inner: Arc<SlotInner>,
}

impl ImageSlotManager {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                records,
                blobs,
                backend,
                locks: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// The displayed image for `section`, deriving it if stale or absent.
    pub fn get_display_image(
        &self,
        section: SectionId,
        config: &SlotConfig,
    ) -> Result<SlotLookup, SlotError> {
        let counters = &self.inner.counters;
        let Some(record) = self.inner.records.load_image(section)? else {
            bump(&counters.missing);
            return Ok(SlotLookup::NotFound);
        };
        if record.original.is_none() {
            bump(&counters.missing);
            return Ok(SlotLookup::NotFound);
        }
        if let Some(image) = record.fresh_ref(&config.target()) {
            bump(&counters.hits);
            return Ok(SlotLookup::Found(image));
        }

        let Some(deadline) = config.deadline else {
            return self.inner.derive(section, config);
        };
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let config = *config;
        rayon::spawn(move || {
            // The receiver may be gone after a timeout; the result is stored either way
            let _ = tx.send(inner.derive(section, &config));
        });
        match rx.recv_timeout(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                bump(&counters.timeouts);
                warn!(
                    "section {section}: displayed image not ready after {}ms, rendering placeholder",
                    deadline.as_millis()
                );
                Err(SlotError::DeadlineExceeded(deadline))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SlotError::Imaging(
                BackendError::ProcessingFailed("derivation worker stopped".into()),
            )),
        }
    }

    /// Replace the section's original. The next lookup derives a new
    /// displayed image.
    pub fn set_image(
        &self,
        section: SectionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<SectionImageRecord, SlotError> {
        let info = self.inner.backend.identify(bytes).map_err(|e| match e {
            BackendError::Unsupported(msg) => SlotError::UnsupportedFormat(msg),
            other => SlotError::Imaging(other),
        })?;

        let lock = self.inner.section_lock(section);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.inner.records.load_image(section)?;
        let blob = self.inner.blobs.store(bytes)?;
        let latest = previous.as_ref().map_or(0, SectionImageRecord::latest_version);
        let record = SectionImageRecord {
            section_id: section,
            original: Some(OriginalImage {
                blob: blob.clone(),
                filename: filename.to_string(),
                format: info.format,
                width: info.width,
                height: info.height,
            }),
            displayed: None,
            original_version: latest + 1,
            displayed_version: previous.as_ref().map_or(0, |r| r.displayed_version),
        };
        if let Err(e) = self.inner.records.save_image(&record) {
            self.inner.discard(&blob);
            return Err(e.into());
        }

        if let Some(previous) = previous {
            self.inner.discard_record_blobs(&previous, Some(&blob));
        }
        info!(
            "section {section}: new original {filename} ({} {}x{}), version {}",
            info.format, info.width, info.height, record.original_version
        );
        Ok(record)
    }

    /// Remove the section's original and displayed images.
    pub fn clear_image(&self, section: SectionId) -> Result<(), SlotError> {
        let lock = self.inner.section_lock(section);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(record) = self.inner.records.load_image(section)? else {
            return Ok(());
        };
        self.inner.records.delete_image(section)?;
        self.inner.discard_record_blobs(&record, None);
        info!("section {section}: image cleared");
        Ok(())
    }

    /// Drop everything stored for a section that is being deleted.
    pub fn delete_section(&self, section: SectionId) -> Result<(), SlotError> {
        self.clear_image(section)?;
        self.inner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&section);
        Ok(())
    }

    /// Drop the section's displayed image so the next lookup derives a new
    /// one. Returns whether there was anything to drop.
    pub fn invalidate(&self, section: SectionId) -> Result<bool, SlotError> {
        let lock = self.inner.section_lock(section);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut record) = self.inner.records.load_image(section)? else {
            return Ok(false);
        };
        let Some(displayed) = record.displayed.take() else {
            return Ok(false);
        };
        record.original_version = record.latest_version() + 1;
        self.inner.records.save_image(&record)?;
        self.inner.discard(&displayed.blob);
        debug!("section {section}: displayed image invalidated");
        Ok(true)
    }

    /// [`invalidate`](Self::invalidate) every listed section.
    pub fn invalidate_all(&self, sections: &[SectionId]) -> Result<usize, SlotError> {
        let mut dropped = 0;
        for &section in sections {
            if self.invalidate(section)? {
                dropped += 1;
            }
        }
        if dropped > 0 {
            info!("invalidated {dropped} displayed image(s)");
        }
        Ok(dropped)
    }

    /// The stored record, if any.
    pub fn record(&self, section: SectionId) -> Result<Option<SectionImageRecord>, SlotError> {
        Ok(self.inner.records.load_image(section)?)
    }

    /// Bytes of a stored image.
    pub fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, SlotError> {
        Ok(self.inner.blobs.fetch(blob)?)
    }

    pub fn stats(&self) -> SlotStats {
        let c = &self.inner.counters;
        SlotStats {
            hits: c.hits.load(Ordering::Relaxed),
            derived: c.derived.load(Ordering::Relaxed),
            missing: c.missing.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
        }
    }
}

impl ImageSource for ImageSlotManager {
    fn display_image(
        &self,
        section: SectionId,
        config: &SlotConfig,
    ) -> Result<SlotLookup, SlotError> {
        self.get_display_image(section, config)
    }
}

impl SlotInner {
    fn section_lock(&self, section: SectionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(section).or_default())
    }

    /// Derive under the section lock, re-checking freshness first.
    fn derive(&self, section: SectionId, config: &SlotConfig) -> Result<SlotLookup, SlotError> {
        let lock = self.section_lock(section);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut record) = self.records.load_image(section)? else {
            return Ok(SlotLookup::NotFound);
        };
        let Some(original) = record.original.clone() else {
            return Ok(SlotLookup::NotFound);
        };
        if let Some(image) = record.fresh_ref(&config.target()) {
            bump(&self.counters.hits);
            return Ok(SlotLookup::Found(image));
        }

        let source = self.blobs.fetch(&original.blob)?;
        let bytes = self
            .backend
            .resize(&ResizeParams {
                source: &source,
                width: config.width,
                height: config.height,
                method: config.method,
                output: original.format.output_format(),
                quality: config.quality,
            })
            .map_err(SlotError::Imaging)?;
        let (width, height) = output_dimensions(
            (original.width, original.height),
            (config.width, config.height),
            config.method,
        );

        let blob = self.blobs.store(&bytes)?;
        let replaced = record.displayed.replace(DisplayedImage {
            blob: blob.clone(),
            width,
            height,
            target: config.target(),
        });
        let version = record
            .original_version
            .max(record.displayed_version + 1);
        record.displayed_version = version;
        if let Err(e) = self.records.save_image(&record) {
            self.discard(&blob);
            return Err(e.into());
        }
        if let Some(replaced) = replaced
            && replaced.blob != blob
        {
            self.discard(&replaced.blob);
        }

        bump(&self.counters.derived);
        debug!(
            "section {section}: derived {width}x{height} {} image, version {version}",
            config.method
        );
        Ok(SlotLookup::Found(ImageRef {
            blob,
            version,
            width,
            height,
        }))
    }

    /// Delete a blob nobody references any more.
    fn discard(&self, blob: &BlobRef) {
        if let Err(e) = self.blobs.delete(blob) {
            warn!("could not delete blob {blob}: {e}");
        }
    }

    /// Delete a record's blobs, except `keep`.
    fn discard_record_blobs(&self, record: &SectionImageRecord, keep: Option<&BlobRef>) {
        let original = record.original.as_ref().map(|o| &o.blob);
        let displayed = record.displayed.as_ref().map(|d| &d.blob);
        for blob in [original, displayed].into_iter().flatten() {
            if Some(blob) != keep {
                self.discard(blob);
            }
        }
    }
}
