//! Tile pyramid generation.
//!
//! [`PyramidBuilder`] turns a [`crate::raster::RasterReader`] into a complete
//! multi-resolution pyramid in the [`crate::store::TileStore`], with level 0
//! the coarsest and [`PyramidGeometry::max_level`] the native resolution.
//! [`PyramidGeometry`] holds the grid arithmetic shared by the builder and
//! by readers of a finished pyramid.

mod builder;
mod geometry;

pub use builder::{
    build_pyramid, build_pyramid_locked, is_writable_format, BuildOptions, PyramidBuilder,
    DEFAULT_TILE_FORMAT, DEFAULT_TILE_SIZE,
};
pub use geometry::{edge_extent, max_tile_level, PyramidGeometry};
