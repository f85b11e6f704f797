//! Recursive pyramid construction.
//!
//! The builder makes a single pass over the source raster. Asking for the
//! one level-0 row recursively asks for rows `2r` and `2r + 1` of the next
//! finer level, down to the finest level where rows are cut straight from
//! scanlines. Every tile is written to the store as soon as it exists, then
//! halved and handed to its parent, which merges four children into one
//! tile. Finer tiles are dropped as soon as their parent is built, so only
//! one path of rows through the pyramid is in memory at a time.
//!
//! ```text
//! level 0          [0]
//!                 /   \
//! level 1     [0,1]   [0,1]          rows 0 and 1
//!             /  \     /  \
//! level 2   r0   r1   r2   r3        read from the raster in order
//! ```

use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

use image::ImageFormat;
use tracing::{debug, error, info, warn};

use crate::error::{BuildError, RasterError};
use crate::job::ProgressRange;
use crate::raster::{RasterReader, BYTES_PER_PIXEL};
use crate::store::{DiskGuard, PyramidMetadata, TileStore};
use crate::tile::{Tile, TileId};

use super::geometry::PyramidGeometry;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default tile file extension.
pub const DEFAULT_TILE_FORMAT: &str = "jpg";

// =============================================================================
// Options
// =============================================================================

/// Parameters of a pyramid build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Edge length of a full tile in pixels
    pub tile_size: u32,

    /// Tile file extension; selects the encoding
    pub filext: String,
}

impl BuildOptions {
    pub fn new(tile_size: u32, filext: impl Into<String>) -> Self {
        Self {
            tile_size,
            filext: filext.into(),
        }
    }

    /// Check that tiles of this size and format can be produced.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.tile_size == 0 {
            return Err(BuildError::InvalidParameters(
                "tile size must be positive".to_string(),
            ));
        }
        if !is_writable_format(&self.filext) {
            return Err(BuildError::InvalidParameters(format!(
                "cannot encode tiles as {:?}",
                self.filext
            )));
        }
        Ok(())
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE, DEFAULT_TILE_FORMAT)
    }
}

/// Whether the imaging backend can encode files with this extension.
pub fn is_writable_format(filext: &str) -> bool {
    ImageFormat::from_extension(filext).is_some_and(|format| format.writing_enabled())
}

// =============================================================================
// Builder
// =============================================================================

/// Builds and stores the pyramid of one raster.
pub struct PyramidBuilder<'a, R> {
    store: &'a TileStore,
    media_id: &'a str,
    filext: &'a str,
    reader: RasterReader<R>,
    geometry: PyramidGeometry,
    progress: ProgressRange<'a>,
    total_tiles: u64,
    tiles_written: u64,
    next_row: u32,
}

impl<'a, R: BufRead> PyramidBuilder<'a, R> {
    /// Prepare a build. `reader` must not have consumed any scanline.
    pub fn new(
        store: &'a TileStore,
        media_id: &'a str,
        reader: RasterReader<R>,
        options: &'a BuildOptions,
        progress: ProgressRange<'a>,
    ) -> Result<Self, BuildError> {
        options.validate()?;
        if reader.rows_read() != 0 {
            return Err(BuildError::InvalidParameters(
                "raster reader is not positioned at the first scanline".to_string(),
            ));
        }

        let geometry = PyramidGeometry::new(reader.width(), reader.height(), options.tile_size)?;

        Ok(Self {
            store,
            media_id,
            filext: &options.filext,
            reader,
            geometry,
            progress,
            total_tiles: geometry.total_tile_count(),
            tiles_written: 0,
            next_row: 0,
        })
    }

    pub fn geometry(&self) -> &PyramidGeometry {
        &self.geometry
    }

    /// Build the pyramid and commit its metadata.
    ///
    /// Any previous output for the media is removed first. On failure the
    /// partially written directory is deleted again, so a failed build
    /// leaves nothing behind. The disk lock must be held throughout.
    pub fn run(mut self, _guard: &DiskGuard) -> Result<PyramidMetadata, BuildError> {
        let started = Instant::now();
        info!(
            media_id = self.media_id,
            width = self.geometry.width(),
            height = self.geometry.height(),
            tile_size = self.geometry.tile_size(),
            levels = self.geometry.max_level() + 1,
            tiles = self.total_tiles,
            "building pyramid"
        );

        match self.build() {
            Ok(metadata) => {
                info!(
                    media_id = self.media_id,
                    tiles = self.tiles_written,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pyramid complete"
                );
                Ok(metadata)
            }
            Err(e) => {
                error!(media_id = self.media_id, error = %e, "pyramid build failed");
                if let Err(cleanup) = self.store.remove_media(self.media_id) {
                    warn!(media_id = self.media_id, error = %cleanup, "failed to remove partial pyramid");
                }
                Err(e)
            }
        }
    }

    fn build(&mut self) -> Result<PyramidMetadata, BuildError> {
        self.store.remove_media(self.media_id)?;

        self.build_row(0, 0)?;

        if self.reader.rows_read() != self.geometry.height() {
            return Err(RasterError::Truncated {
                expected: self.geometry.height(),
                read: self.reader.rows_read(),
            }
            .into());
        }

        let metadata = PyramidMetadata {
            filext: self.filext.to_string(),
            tilesize: self.geometry.tile_size(),
            maxtilelevel: self.geometry.max_level(),
            width: self.geometry.width(),
            height: self.geometry.height(),
        };
        self.store.write_pyramid_metadata(self.media_id, &metadata)?;
        self.progress.finish();
        Ok(metadata)
    }

    /// Produce, store and return (halved) the tiles of one row.
    ///
    /// Returns `None` when `row` lies below the image at this level, which
    /// the parent treats as an absent bottom half.
    fn build_row(&mut self, level: u32, row: u32) -> Result<Option<Vec<Tile>>, BuildError> {
        let (_, rows) = self.geometry.grid_size(level);
        if row >= rows {
            return Ok(None);
        }

        let tiles = if level == self.geometry.max_level() {
            self.read_finest_row(row)?
        } else {
            let upper = self.build_row(level + 1, 2 * row)?;
            let lower = self.build_row(level + 1, 2 * row + 1)?;
            match upper {
                Some(upper) => merge_rows(upper, lower),
                None => return Ok(None),
            }
        };

        debug!(media_id = self.media_id, level, row, columns = tiles.len(), "row built");

        let mut halved = Vec::with_capacity(if level > 0 { tiles.len() } else { 0 });
        for (column, tile) in tiles.into_iter().enumerate() {
            let column = column as u32;
            // Odd tile sizes halve to one pixel more than half the parent
            let (width, height) = self.geometry.tile_dimensions(level, row, column);
            let tile = if tile.size() == (width, height) {
                tile
            } else {
                tile.resize(width, height)
            };

            self.persist(level, row, column, &tile)?;
            if level > 0 {
                halved.push(tile.downsample_half());
            }
        }
        Ok(Some(halved))
    }

    /// Cut one row of native-resolution tiles from the next scanlines.
    fn read_finest_row(&mut self, row: u32) -> Result<Vec<Tile>, BuildError> {
        if row != self.next_row {
            return Err(BuildError::RowOrder {
                level: self.geometry.max_level(),
                expected: self.next_row,
                requested: row,
            });
        }

        let tile_size = self.geometry.tile_size();
        let width = self.geometry.width();
        let height = self.geometry.height();
        let (columns, _) = self.geometry.grid_size(self.geometry.max_level());

        let tile_height = (height - row * tile_size).min(tile_size);
        let tile_widths: Vec<u32> = (0..columns)
            .map(|column| (width - column * tile_size).min(tile_size))
            .collect();

        let mut buffers: Vec<Vec<u8>> = tile_widths
            .iter()
            .map(|&w| Vec::with_capacity(w as usize * tile_height as usize * BYTES_PER_PIXEL))
            .collect();

        let stride = tile_size as usize * BYTES_PER_PIXEL;
        for _ in 0..tile_height {
            let rows_read = self.reader.rows_read();
            let line = self.reader.next_scanline()?.ok_or(RasterError::Truncated {
                expected: height,
                read: rows_read,
            })?;

            for (line_chunk, buffer) in line.chunks(stride).zip(buffers.iter_mut()) {
                buffer.extend_from_slice(line_chunk);
            }
        }
        self.next_row += 1;

        buffers
            .into_iter()
            .zip(tile_widths)
            .map(|(buffer, w)| Tile::from_raw(w, tile_height, buffer).map_err(BuildError::from))
            .collect()
    }

    fn persist(&mut self, level: u32, row: u32, column: u32, tile: &Tile) -> Result<(), BuildError> {
        if self.progress.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let id = TileId::new(self.media_id, level, row, column);
        let path = self.store.tile_path(&id, true, "", self.filext)?;
        tile.save(&path)?;

        self.tiles_written += 1;
        // The metadata commit counts as one more step, so tiles alone never reach 1.0
        self.progress
            .set(self.tiles_written as f64 / (self.total_tiles + 1) as f64);
        Ok(())
    }
}

/// Merge two rows of halved tiles into one row of the coarser level.
///
/// Columns `2c` and `2c + 1` of `upper` and `lower` become column `c`.
fn merge_rows(upper: Vec<Tile>, lower: Option<Vec<Tile>>) -> Vec<Tile> {
    let mut upper = upper.into_iter();
    let mut lower = lower.unwrap_or_default().into_iter();
    let mut merged = Vec::with_capacity(upper.len().div_ceil(2));

    while let Some(top_left) = upper.next() {
        let top_right = upper.next();
        let bottom_left = lower.next();
        let bottom_right = lower.next();
        merged.push(Tile::merge(
            &top_left,
            top_right.as_ref(),
            bottom_left.as_ref(),
            bottom_right.as_ref(),
        ));
    }
    merged
}

// =============================================================================
// Convenience
// =============================================================================

/// Open `raster_path` and build its pyramid, taking the disk lock.
pub fn build_pyramid(
    store: &TileStore,
    media_id: &str,
    raster_path: &Path,
    options: &BuildOptions,
    progress: ProgressRange<'_>,
) -> Result<PyramidMetadata, BuildError> {
    let guard = store.disk_lock();
    build_pyramid_locked(store, media_id, raster_path, options, progress, &guard)
}

/// [`build_pyramid`] for callers already holding the disk lock.
pub fn build_pyramid_locked(
    store: &TileStore,
    media_id: &str,
    raster_path: &Path,
    options: &BuildOptions,
    progress: ProgressRange<'_>,
    guard: &DiskGuard,
) -> Result<PyramidMetadata, BuildError> {
    let reader = match RasterReader::open(raster_path) {
        Ok(reader) => reader,
        Err(e) => {
            // Nothing written yet, but stale output must not survive a failed rebuild
            store.remove_media(media_id)?;
            return Err(e.into());
        }
    };
    PyramidBuilder::new(store, media_id, reader, options, progress)?.run(guard)
}
