//! Uncompressed raster input.
//!
//! Every source document is converted into a single binary RGB raster
//! before tiling. [`RasterReader`] streams it back one scanline at a time so
//! that arbitrarily large images never have to fit in memory.

mod reader;
mod writer;

pub use reader::{RasterReader, BYTES_PER_PIXEL, RASTER_MAGIC, RASTER_MAXVAL};
pub use writer::{write_raster, RasterWriter};
