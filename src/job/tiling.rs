//! Convert-and-tile jobs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::convert::{converter_for, run_conversion, ConvertOptions, RASTER_EXTENSION};
use crate::error::{ConversionError, JobError};
use crate::pyramid::{build_pyramid_locked, BuildOptions};
use crate::store::{media_hash, PyramidMetadata, TileStore};

use super::pool::{JobHandle, WorkerPool};
use super::progress::JobProgress;

/// Share of progress given to conversion when the input needs one.
const CONVERSION_SHARE: f64 = 0.5;

/// Everything needed to turn one input file into a stored pyramid.
#[derive(Debug, Clone)]
pub struct TilingJob {
    /// Source document or image
    pub input: PathBuf,

    /// Identifier the pyramid is stored under
    pub media_id: String,

    pub build: BuildOptions,

    pub convert: ConvertOptions,

    /// Where intermediate rasters are written
    pub scratch_dir: PathBuf,
}

impl TilingJob {
    /// A job with default options, identified by the input path.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        Self {
            media_id: input.display().to_string(),
            input,
            build: BuildOptions::default(),
            convert: ConvertOptions::default(),
            scratch_dir: std::env::temp_dir().join("zoom-tiler"),
        }
    }

    pub fn with_media_id(mut self, media_id: impl Into<String>) -> Self {
        self.media_id = media_id.into();
        self
    }

    pub fn with_build_options(mut self, build: BuildOptions) -> Self {
        self.build = build;
        self
    }

    pub fn with_convert_options(mut self, convert: ConvertOptions) -> Self {
        self.convert = convert;
        self
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    /// Convert (if needed) and tile the input.
    ///
    /// The disk lock is held across both steps. Whatever fails, the store is
    /// left without any output for the media.
    pub fn run(&self, store: &TileStore, progress: &JobProgress) -> Result<PyramidMetadata, JobError> {
        let guard = store.disk_lock();
        if progress.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        info!(input = %self.input.display(), media_id = %self.media_id, "tiling job started");

        let converter = match converter_for(&self.input, &self.convert) {
            Ok(converter) => converter,
            Err(e) => {
                store.remove_media(&self.media_id)?;
                return Err(e.into());
            }
        };

        let Some(converter) = converter else {
            return Ok(build_pyramid_locked(
                store,
                &self.media_id,
                &self.input,
                &self.build,
                progress.full(),
                &guard,
            )?);
        };

        let raster = self.scratch_raster_path();
        let converted = fs::create_dir_all(&self.scratch_dir)
            .map_err(ConversionError::from)
            .and_then(|()| {
                run_conversion(
                    converter.as_ref(),
                    &self.input,
                    &raster,
                    progress.range(0.0, CONVERSION_SHARE),
                    &guard,
                )
            });
        if let Err(e) = converted {
            store.remove_media(&self.media_id)?;
            return Err(e.into());
        }

        let built = build_pyramid_locked(
            store,
            &self.media_id,
            &raster,
            &self.build,
            progress.range(CONVERSION_SHARE, 1.0),
            &guard,
        );
        remove_scratch(&raster);
        Ok(built?)
    }

    fn scratch_raster_path(&self) -> PathBuf {
        self.scratch_dir
            .join(format!("{}.{}", media_hash(&self.media_id), RASTER_EXTENSION))
    }
}

fn remove_scratch(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove intermediate raster");
        }
    }
}

impl WorkerPool {
    /// Queue a tiling job against `store`.
    pub fn submit_tiling(&self, store: Arc<TileStore>, job: TilingJob) -> JobHandle {
        let name = job.media_id.clone();
        self.submit(name, move |progress| {
            job.run(&store, progress)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}
