//! Tiles and their in-memory delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Presentation layer             │
//! └────────────────────┬────────────────────┘
//!                      │ request(TileId)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileProvider               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  LIFO requests  │  │
//! │  │  (decoded    │  │  + background   │  │
//! │  │   tiles)     │  │    workers      │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ StoreTileSource │    │ CheckerboardSource  │
//! │ (tile files)    │    │ (procedural)        │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Tile`]: RGB pixel buffer with crop, resize, merge and save
//! - [`TileId`]: `(media_id, level, row, column)` address of a tile
//! - [`TileCache`]: LRU cache of decoded tiles with size-based eviction
//! - [`TileProvider`]: serves requests most-recent-first from a [`TileSource`]

mod buffer;
mod cache;
mod id;
mod provider;

pub use buffer::{Tile, RESIZE_FILTER};
pub use cache::{TileCache, DEFAULT_TILE_CACHE_CAPACITY};
pub use id::TileId;
pub use provider::{
    CheckerboardSource, StoreTileSource, TileProvider, TileSource, DEFAULT_PROVIDER_WORKERS,
};
