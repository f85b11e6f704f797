//! # Zoom Tiler
//!
//! Tile pyramid generation for zooming image viewers.
//!
//! Large source images, and PDF documents rasterized page by page, are
//! converted to an uncompressed raster and decomposed into a multi-resolution
//! quad-tree of fixed-size tiles. A viewport can then pan and zoom smoothly
//! while holding only the tiles it displays.
//!
//! ## Features
//!
//! - **Streaming builds**: the source raster is read once, top to bottom, a
//!   tile row at a time
//! - **Minimal pyramids**: only as many levels as needed to shrink the image
//!   into a single tile
//! - **Content-addressed store**: tiles live under a hash of the media id, with
//!   a small typed metadata record committed once a pyramid is complete
//! - **Background jobs**: conversion and tiling run on a bounded worker pool
//!   with monotonic progress and failure isolation
//! - **Viewer delivery**: an LRU tile cache fed newest-request-first
//!
//! ## Architecture
//!
//! - [`raster`] - uncompressed raster reader and writer
//! - [`tile`] - tile buffers, ids, cache and provider
//! - [`store`] - on-disk tile store, metadata, disk lock and eviction
//! - [`pyramid`] - pyramid geometry and the recursive builder
//! - [`convert`] - PDF and image converters producing rasters
//! - [`job`] - progress tracking, worker pool and tiling jobs
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zoom_tiler::{TileStore, TilingJob, WorkerPool};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(TileStore::new("./tiles"));
//!     let pool = WorkerPool::new(2);
//!
//!     let handle = pool.submit_tiling(store.clone(), TilingJob::new("scan.png"));
//!     handle.wait(None).await;
//!
//!     assert!(store.tiled("scan.png"));
//! }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod pyramid;
pub mod raster;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, EvictConfig, InfoConfig, StoreArgs, TileConfig};
pub use convert::{converter_for, run_conversion, ConvertOptions, Converter};
pub use error::{BuildError, ConversionError, JobError, RasterError, StoreError, TileError};
pub use job::{JobHandle, JobProgress, JobState, ProgressRange, TilingJob, WorkerPool};
pub use pyramid::{build_pyramid, BuildOptions, PyramidBuilder, PyramidGeometry};
pub use raster::{RasterReader, RasterWriter};
pub use store::{disk_lock, DiskGuard, MetaValue, Metadata, PyramidMetadata, SweepReport, TileStore};
pub use tile::{Tile, TileCache, TileId, TileProvider, TileSource};
