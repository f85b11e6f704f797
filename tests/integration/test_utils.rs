//! Test utilities for integration tests.
//!
//! Helpers for writing synthetic rasters and for building pyramids in
//! throwaway stores.

use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use walkdir::WalkDir;

use zoom_tiler::error::BuildError;
use zoom_tiler::job::JobProgress;
use zoom_tiler::pyramid::{build_pyramid, BuildOptions};
use zoom_tiler::raster::write_raster;
use zoom_tiler::store::{PyramidMetadata, TileStore};

// =============================================================================
// Synthetic Rasters
// =============================================================================

/// Colour of the synthetic source pixel at (x, y).
pub fn gradient_pixel(x: u32, y: u32) -> [u8; 3] {
    [(x % 256) as u8, (y % 256) as u8, ((x / 256 + y / 256) % 256) as u8]
}

/// Pixel bytes of a `width` x `height` gradient image.
pub fn gradient_pixels(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&gradient_pixel(x, y));
        }
    }
    pixels
}

/// Write a gradient raster named `name` into `dir`.
pub fn write_gradient_raster(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    write_raster(&path, width, height, &gradient_pixels(width, height)).unwrap();
    path
}

/// Write a raster whose header promises more rows than it holds.
pub fn write_truncated_raster(dir: &Path, name: &str, width: u32, height: u32, rows: u32) -> PathBuf {
    let path = dir.join(name);
    let mut data = format!("P6\n{} {}\n255\n", width, height).into_bytes();
    data.extend(gradient_pixels(width, rows));
    std::fs::write(&path, data).unwrap();
    path
}

// =============================================================================
// Stores
// =============================================================================

/// A tile store in a fresh temporary directory.
pub struct TestStore {
    pub dir: TempDir,
    pub store: Arc<TileStore>,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TileStore::new(dir.path().join("store")));
        Self { dir, store }
    }

    /// Directory for inputs, outside the store root.
    pub fn inputs(&self) -> &Path {
        self.dir.path()
    }

    /// Build a lossless pyramid for a gradient of the given size.
    pub fn build_gradient(
        &self,
        media_id: &str,
        width: u32,
        height: u32,
        tile_size: u32,
    ) -> Result<PyramidMetadata, BuildError> {
        let raster = write_gradient_raster(self.inputs(), &format!("{}.ppm", media_id), width, height);
        let progress = JobProgress::new();
        build_pyramid(
            &self.store,
            media_id,
            &raster,
            &BuildOptions::new(tile_size, "png"),
            progress.full(),
        )
    }

    /// Backdate every file of `media_id` by `age`.
    pub fn age_media(&self, media_id: &str, age: Duration) {
        let when = SystemTime::now() - age;
        let times = FileTimes::new().set_accessed(when).set_modified(when);
        for entry in WalkDir::new(self.store.media_path(media_id)) {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                File::options()
                    .write(true)
                    .open(entry.path())
                    .unwrap()
                    .set_times(times)
                    .unwrap();
            }
        }
    }
}

/// Number of files under `dir`.
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}
