//! On-disk tile store.
//!
//! # Components
//!
//! - [`TileStore`]: path derivation, metadata records and existence checks
//! - [`Metadata`] / [`PyramidMetadata`]: the per-media key/value record
//! - [`disk_lock`] / [`DiskGuard`]: process-wide serialisation of disk work
//! - [`SweepReport`]: result of an age-based eviction sweep

mod lock;
mod metadata;
mod sweep;
mod tile_store;

pub use lock::{disk_lock, DiskGuard};
pub use metadata::{MetaValue, Metadata, PyramidMetadata};
pub use sweep::{SweepFailure, SweepReport};
pub use tile_store::{media_hash, TileStore, METADATA_FILE};
