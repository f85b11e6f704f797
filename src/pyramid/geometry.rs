//! Grid arithmetic of a tile pyramid.
//!
//! Level `max_level` holds the image at native resolution; every coarser
//! level halves it. A tile at level `L` stands for a square of
//! `tile_size * 2^(max_level - L)` native pixels (its real tile size),
//! clipped at the right and bottom image edges.

use crate::error::BuildError;
use crate::store::PyramidMetadata;
use crate::tile::TileId;

/// Smallest level `L` with `tile_size * 2^L >= max(width, height)`.
///
/// Computed in integers, so the bound is always tight: an image that fits in
/// one tile gets level 0, and `tile_size * 2^(L-1)` is below the larger
/// dimension whenever `L > 0`.
pub fn max_tile_level(width: u32, height: u32, tile_size: u32) -> u32 {
    let max_dim = u64::from(width.max(height));
    let tile_size = u64::from(tile_size.max(1));
    max_dim
        .div_ceil(tile_size)
        .max(1)
        .next_power_of_two()
        .trailing_zeros()
}

/// Number of native pixels covered by the last tile along a dimension.
pub fn edge_extent(dimension: u32, real_tile_size: u64) -> u32 {
    ((u64::from(dimension) - 1) % real_tile_size + 1) as u32
}

/// Dimensions and levels of one pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidGeometry {
    width: u32,
    height: u32,
    tile_size: u32,
    max_level: u32,
}

impl PyramidGeometry {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, BuildError> {
        if tile_size == 0 {
            return Err(BuildError::InvalidParameters(
                "tile size must be positive".to_string(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(BuildError::InvalidParameters(format!(
                "image dimensions must be positive, got {}x{}",
                width, height
            )));
        }

        let max_level = max_tile_level(width, height, tile_size);
        debug_assert!(
            max_level == 0
                || u64::from(tile_size) << (max_level - 1) < u64::from(width.max(height))
        );

        Ok(Self {
            width,
            height,
            tile_size,
            max_level,
        })
    }

    /// Geometry of a committed pyramid.
    pub fn from_metadata(metadata: &PyramidMetadata) -> Result<Self, BuildError> {
        Self::new(metadata.width, metadata.height, metadata.tilesize)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Index of the finest level.
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Native pixels spanned by one tile edge at `level`.
    pub fn real_tile_size(&self, level: u32) -> u64 {
        u64::from(self.tile_size) << (self.max_level - level.min(self.max_level))
    }

    /// `(columns, rows)` of the tile grid at `level`.
    pub fn grid_size(&self, level: u32) -> (u32, u32) {
        let real = self.real_tile_size(level);
        (
            u64::from(self.width).div_ceil(real) as u32,
            u64::from(self.height).div_ceil(real) as u32,
        )
    }

    /// Number of tiles at `level`.
    pub fn tile_count(&self, level: u32) -> u64 {
        let (columns, rows) = self.grid_size(level);
        u64::from(columns) * u64::from(rows)
    }

    /// Number of tiles over all levels.
    pub fn total_tile_count(&self) -> u64 {
        (0..=self.max_level).map(|level| self.tile_count(level)).sum()
    }

    /// Pixel size of the tile at `(level, row, column)` as stored.
    ///
    /// Full tiles are `tile_size` square; edge tiles cover their clipped
    /// region scaled down to the level, rounding up.
    pub fn tile_dimensions(&self, level: u32, row: u32, column: u32) -> (u32, u32) {
        let (columns, rows) = self.grid_size(level);
        let real = self.real_tile_size(level);
        let scale = real / u64::from(self.tile_size);

        let extent = |index: u32, count: u32, dimension: u32| {
            if index + 1 < count {
                self.tile_size
            } else {
                u64::from(edge_extent(dimension, real)).div_ceil(scale) as u32
            }
        };

        (
            extent(column, columns, self.width),
            extent(row, rows, self.height),
        )
    }

    /// Every tile address of the pyramid, coarsest level first.
    pub fn tile_ids<'a>(&'a self, media_id: &'a str) -> impl Iterator<Item = TileId> + 'a {
        (0..=self.max_level).flat_map(move |level| {
            let (columns, rows) = self.grid_size(level);
            (0..rows).flat_map(move |row| {
                (0..columns).map(move |column| TileId::new(media_id, level, row, column))
            })
        })
    }
}
