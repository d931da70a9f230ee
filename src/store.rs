//! Persistence collaborators: record store and blob store.
//!
//! The library never talks to a database or a file-storage service
//! directly. It goes through two traits:
//!
//! - [`RecordStore`] keeps per-course settings and per-section image records,
//!   keyed by course id and section id. Get, upsert and delete are the only
//!   operations; each one is atomic for a single record and nothing more.
//! - [`BlobStore`] keeps opaque image bytes and hands back a [`BlobRef`].
//!
//! Two implementations of each ship with the crate: in-memory stores for
//! tests and embedding, and filesystem stores used by the CLI.
//!
//! ## Filesystem layout
//!
//! ```text
//! <data>/
//! ├── settings/<course-id>.json
//! ├── images/<section-id>.json
//! └── blobs/<hh>/<sha256>-<n>
//! ```
//!
//! Record files are written to a temporary sibling and renamed into place,
//! so a crash mid-write leaves the previous record intact. Blob names start
//! with the SHA-256 of their content, which [`FsBlobStore::fetch`] verifies;
//! the `-<n>` suffix keeps two uploads of the same bytes independent so
//! deleting one never pulls the other out from under a section.

use crate::config::CourseFormatSettings;
use crate::imaging::{ResizeMethod, SourceFormat};
use crate::types::{CourseId, ImageRef, SectionId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("blob not found: {0}")]
    MissingBlob(BlobRef),
    #[error("invalid blob reference: {0}")]
    InvalidRef(BlobRef),
    #[error("blob {0} is corrupt (content hash mismatch)")]
    Corrupt(BlobRef),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque handle to stored bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The uploaded source image of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalImage {
    pub blob: BlobRef,
    pub filename: String,
    pub format: SourceFormat,
    pub width: u32,
    pub height: u32,
}

/// The box and encoding a displayed image was derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTarget {
    pub width: u32,
    pub height: u32,
    pub method: ResizeMethod,
    pub quality: u32,
}

/// The resized derivative shown in the tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedImage {
    pub blob: BlobRef,
    pub width: u32,
    pub height: u32,
    pub target: DisplayTarget,
}

/// Image bookkeeping for one section.
///
/// `original_version` moves whenever the displayed image must be rebuilt
/// (new upload, size settings change). A displayed image is fresh only when
/// `displayed_version >= original_version` and it was derived for the
/// target being asked for. No original means no displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionImageRecord {
    pub section_id: SectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<OriginalImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayed: Option<DisplayedImage>,
    #[serde(default)]
    pub original_version: u64,
    #[serde(default)]
    pub displayed_version: u64,
}

impl SectionImageRecord {
    pub fn new(section_id: SectionId) -> Self {
        Self {
            section_id,
            original: None,
            displayed: None,
            original_version: 0,
            displayed_version: 0,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.original.is_some()
            && self.displayed.is_some()
            && self.displayed_version >= self.original_version
    }

    /// Highest version this record has ever handed out.
    pub fn latest_version(&self) -> u64 {
        self.original_version.max(self.displayed_version)
    }

    /// Fresh, and derived for exactly `target`.
    pub fn is_fresh_for(&self, target: &DisplayTarget) -> bool {
        self.is_fresh() && self.displayed.as_ref().is_some_and(|d| d.target == *target)
    }

    /// The displayed image as a tile reference, when fresh for `target`.
    pub fn fresh_ref(&self, target: &DisplayTarget) -> Option<ImageRef> {
        if !self.is_fresh_for(target) {
            return None;
        }
        self.displayed.as_ref().map(|d| ImageRef {
            blob: d.blob.clone(),
            version: self.displayed_version,
            width: d.width,
            height: d.height,
        })
    }
}

/// Keyed records: settings per course, image records per section.
pub trait RecordStore: Send + Sync {
    fn load_settings(&self, course: CourseId) -> Result<Option<CourseFormatSettings>, StoreError>;
    fn save_settings(
        &self,
        course: CourseId,
        settings: &CourseFormatSettings,
    ) -> Result<(), StoreError>;
    fn delete_settings(&self, course: CourseId) -> Result<(), StoreError>;

    fn load_image(&self, section: SectionId) -> Result<Option<SectionImageRecord>, StoreError>;
    fn save_image(&self, record: &SectionImageRecord) -> Result<(), StoreError>;
    fn delete_image(&self, section: SectionId) -> Result<(), StoreError>;
}

/// Opaque byte storage for originals and displayed images.
pub trait BlobStore: Send + Sync {
    fn store(&self, bytes: &[u8]) -> Result<BlobRef, StoreError>;
    fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, StoreError>;
    /// Deleting a blob that does not exist is not an error.
    fn delete(&self, blob: &BlobRef) -> Result<(), StoreError>;
}

/// SHA-256 of a byte slice, as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    settings: Mutex<HashMap<CourseId, CourseFormatSettings>>,
    images: Mutex<HashMap<SectionId, SectionImageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

impl RecordStore for MemoryStore {
    fn load_settings(&self, course: CourseId) -> Result<Option<CourseFormatSettings>, StoreError> {
        Ok(self.settings.lock().map_err(poisoned)?.get(&course).cloned())
    }

    fn save_settings(
        &self,
        course: CourseId,
        settings: &CourseFormatSettings,
    ) -> Result<(), StoreError> {
        self.settings
            .lock()
            .map_err(poisoned)?
            .insert(course, settings.clone());
        Ok(())
    }

    fn delete_settings(&self, course: CourseId) -> Result<(), StoreError> {
        self.settings.lock().map_err(poisoned)?.remove(&course);
        Ok(())
    }

    fn load_image(&self, section: SectionId) -> Result<Option<SectionImageRecord>, StoreError> {
        Ok(self.images.lock().map_err(poisoned)?.get(&section).cloned())
    }

    fn save_image(&self, record: &SectionImageRecord) -> Result<(), StoreError> {
        self.images
            .lock()
            .map_err(poisoned)?
            .insert(record.section_id, record.clone());
        Ok(())
    }

    fn delete_image(&self, section: SectionId) -> Result<(), StoreError> {
        self.images.lock().map_err(poisoned)?.remove(&section);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<BlobRef, Vec<u8>>>,
    next_id: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, blob: &BlobRef) -> bool {
        self.blobs
            .lock()
            .map(|b| b.contains_key(blob))
            .unwrap_or(false)
    }
}

impl BlobStore for MemoryBlobStore {
    fn store(&self, bytes: &[u8]) -> Result<BlobRef, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let blob = BlobRef(format!("mem-{id}"));
        self.blobs
            .lock()
            .map_err(poisoned)?
            .insert(blob.clone(), bytes.to_vec());
        Ok(blob)
    }

    fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .map_err(poisoned)?
            .get(blob)
            .cloned()
            .ok_or_else(|| StoreError::MissingBlob(blob.clone()))
    }

    fn delete(&self, blob: &BlobRef) -> Result<(), StoreError> {
        self.blobs.lock().map_err(poisoned)?.remove(blob);
        Ok(())
    }
}

// ============================================================================
// Filesystem stores
// ============================================================================

/// JSON records under a data directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn settings_path(&self, course: CourseId) -> PathBuf {
        self.root.join("settings").join(format!("{course}.json"))
    }

    fn image_path(&self, section: SectionId) -> PathBuf {
        self.root.join("images").join(format!("{section}.json"))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write via a temporary sibling and rename.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl RecordStore for FsStore {
    fn load_settings(&self, course: CourseId) -> Result<Option<CourseFormatSettings>, StoreError> {
        read_json(&self.settings_path(course))
    }

    fn save_settings(
        &self,
        course: CourseId,
        settings: &CourseFormatSettings,
    ) -> Result<(), StoreError> {
        write_json(&self.settings_path(course), settings)
    }

    fn delete_settings(&self, course: CourseId) -> Result<(), StoreError> {
        remove_if_exists(&self.settings_path(course))
    }

    fn load_image(&self, section: SectionId) -> Result<Option<SectionImageRecord>, StoreError> {
        read_json(&self.image_path(section))
    }

    fn save_image(&self, record: &SectionImageRecord) -> Result<(), StoreError> {
        write_json(&self.image_path(record.section_id), record)
    }

    fn delete_image(&self, section: SectionId) -> Result<(), StoreError> {
        remove_if_exists(&self.image_path(section))
    }
}

/// Content-named blob files under `<root>/blobs`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into().join("blobs"),
        }
    }

    /// Map a reference to its file, rejecting anything that is not
    /// `<64 hex>-<digits>`.
    fn path_for(&self, blob: &BlobRef) -> Result<PathBuf, StoreError> {
        let (hash, suffix) = blob
            .as_str()
            .split_once('-')
            .ok_or_else(|| StoreError::InvalidRef(blob.clone()))?;
        let valid = hash.len() == 64
            && hash.bytes().all(|b| b.is_ascii_hexdigit())
            && !suffix.is_empty()
            && suffix.bytes().all(|b| b.is_ascii_digit());
        if !valid {
            return Err(StoreError::InvalidRef(blob.clone()));
        }
        Ok(self.root.join(&hash[..2]).join(blob.as_str()))
    }

    /// Location of a blob relative to the data directory, `/`-separated.
    pub fn relative_path(blob: &BlobRef) -> String {
        let shard = blob.as_str().get(..2).unwrap_or_default();
        format!("blobs/{shard}/{blob}")
    }
}

impl BlobStore for FsBlobStore {
    fn store(&self, bytes: &[u8]) -> Result<BlobRef, StoreError> {
        let hash = hash_bytes(bytes);
        let dir = self.root.join(&hash[..2]);
        fs::create_dir_all(&dir)?;
        for n in 0u32.. {
            let name = format!("{hash}-{n}");
            let file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&name));
            match file {
                Ok(mut file) => {
                    file.write_all(bytes)?;
                    file.sync_all()?;
                    return Ok(BlobRef(name));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Unavailable(format!("no free name for blob {hash}")))
    }

    fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(blob)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::MissingBlob(blob.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if !blob.as_str().starts_with(&hash_bytes(&bytes)) {
            return Err(StoreError::Corrupt(blob.clone()));
        }
        Ok(bytes)
    }

    fn delete(&self, blob: &BlobRef) -> Result<(), StoreError> {
        remove_if_exists(&self.path_for(blob)?)
    }
}
