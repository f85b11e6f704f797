//! Content-addressed on-disk tile store.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <sha1-hex(media_id)>/
//!     metadata                      key\tvalue\ttype lines
//!     00/000000_000000.jpg          level 0
//!     01/000000_000000.jpg          level 1, row 0, column 0
//!     01/000000_000001.jpg
//!     ...
//! ```
//!
//! Hashing the media identifier keeps arbitrary identifiers (URLs, paths
//! with special characters, very long names) filesystem-safe. Fixed-width
//! numeric fields make lexical order match numeric order.
//!
//! The metadata file is written last and atomically; its presence is what
//! marks a pyramid as complete.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::tile::TileId;

use super::lock::{disk_lock, DiskGuard};
use super::metadata::{MetaValue, Metadata, PyramidMetadata};

/// File name of the per-media metadata record.
pub const METADATA_FILE: &str = "metadata";

/// Suffix of the scratch file used for atomic metadata replacement.
const METADATA_TMP_SUFFIX: &str = ".tmp";

/// On-disk tile store rooted at a directory.
///
/// Metadata records are cached in memory after their first load. The cache
/// belongs to the store instance; call [`TileStore::invalidate`] when another
/// process may have rewritten a record.
#[derive(Debug)]
pub struct TileStore {
    root: PathBuf,
    metadata: RwLock<HashMap<String, Arc<Metadata>>>,
}

impl TileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquire the process-wide disk lock.
    pub fn disk_lock(&self) -> DiskGuard {
        disk_lock()
    }

    // =========================================================================
    // Paths
    // =========================================================================

    /// Directory holding all files of `media_id`.
    pub fn media_path(&self, media_id: &str) -> PathBuf {
        self.root.join(media_hash(media_id))
    }

    /// Path of the metadata record of `media_id`.
    pub fn metadata_path(&self, media_id: &str) -> PathBuf {
        self.media_path(media_id).join(METADATA_FILE)
    }

    /// Path of one tile file.
    ///
    /// `prefix` is prepended to the file name and `filext` is the extension
    /// without its dot. With `mkdirp` set, missing parent directories are
    /// created before returning.
    pub fn tile_path(
        &self,
        id: &TileId,
        mkdirp: bool,
        prefix: &str,
        filext: &str,
    ) -> Result<PathBuf, StoreError> {
        let dir = self
            .media_path(&id.media_id)
            .join(format!("{:02}", id.level));

        if mkdirp {
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }

        Ok(dir.join(format!(
            "{}{:06}_{:06}.{}",
            prefix, id.row, id.column, filext
        )))
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Atomically replace the metadata record of `media_id`.
    ///
    /// The record is written to a scratch file and renamed over the old one,
    /// so readers see either the previous record or the new one in full.
    pub fn write_metadata(&self, media_id: &str, metadata: &Metadata) -> Result<(), StoreError> {
        let dir = self.media_path(media_id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let path = dir.join(METADATA_FILE);
        let tmp = dir.join(format!("{}{}", METADATA_FILE, METADATA_TMP_SUFFIX));

        {
            let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
            file.write_all(metadata.to_text().as_bytes())
                .and_then(|()| file.sync_all())
                .map_err(|e| StoreError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;

        self.write_cache()
            .insert(media_id.to_string(), Arc::new(metadata.clone()));
        debug!(media_id, path = %path.display(), "metadata written");
        Ok(())
    }

    /// Commit the record of a completed pyramid.
    pub fn write_pyramid_metadata(
        &self,
        media_id: &str,
        pyramid: &PyramidMetadata,
    ) -> Result<(), StoreError> {
        self.write_metadata(media_id, &pyramid.to_metadata())
    }

    /// Load the full metadata record of `media_id`.
    ///
    /// Returns `Ok(None)` when no record exists. Loaded records are cached;
    /// absent ones are not, so a record written later is picked up.
    pub fn metadata(&self, media_id: &str) -> Result<Option<Arc<Metadata>>, StoreError> {
        if let Some(cached) = self.read_cache().get(media_id) {
            return Ok(Some(Arc::clone(cached)));
        }

        let path = self.metadata_path(media_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let metadata = Arc::new(Metadata::parse(&path, &text)?);
        self.write_cache()
            .insert(media_id.to_string(), Arc::clone(&metadata));
        Ok(Some(metadata))
    }

    /// Look up one metadata value.
    pub fn get_metadata(&self, media_id: &str, key: &str) -> Result<Option<MetaValue>, StoreError> {
        Ok(self
            .metadata(media_id)?
            .and_then(|metadata| metadata.get(key).cloned()))
    }

    /// The pyramid record of `media_id`, if complete and well-formed.
    pub fn pyramid_metadata(&self, media_id: &str) -> Result<Option<PyramidMetadata>, StoreError> {
        Ok(self
            .metadata(media_id)?
            .and_then(|metadata| PyramidMetadata::from_metadata(&metadata)))
    }

    /// Delete the metadata record of `media_id`, marking it incomplete.
    pub fn clear_metadata(&self, media_id: &str) -> Result<(), StoreError> {
        self.invalidate(media_id);
        let path = self.metadata_path(media_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Drop the cached record of `media_id`.
    pub fn invalidate(&self, media_id: &str) {
        self.write_cache().remove(media_id);
    }

    /// Drop every cached record.
    pub fn invalidate_all(&self) {
        self.write_cache().clear();
    }

    // =========================================================================
    // Existence
    // =========================================================================

    /// Whether `media_id` has a complete pyramid.
    ///
    /// Cheap heuristic: the pyramid record exists and the level-0 tile is on
    /// disk. Individual tiles are not verified.
    pub fn tiled(&self, media_id: &str) -> bool {
        let pyramid = match self.pyramid_metadata(media_id) {
            Ok(Some(pyramid)) => pyramid,
            Ok(None) => return false,
            Err(e) => {
                warn!(media_id, error = %e, "unreadable metadata");
                return false;
            }
        };

        let root_tile = TileId::new(media_id, 0, 0, 0);
        self.tile_path(&root_tile, false, "", &pyramid.filext)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Delete every file of `media_id`.
    pub fn remove_media(&self, media_id: &str) -> Result<(), StoreError> {
        self.invalidate(media_id);
        remove_dir_if_exists(&self.media_path(media_id))
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Metadata>>> {
        self.metadata.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Metadata>>> {
        self.metadata.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stable hex digest naming the directory of `media_id`.
pub fn media_hash(media_id: &str) -> String {
    hex::encode(Sha1::digest(media_id.as_bytes()))
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

// =============================================================================
// Tests
// =============================================================================
