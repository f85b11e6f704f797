//! Tile cache for decoded tiles.
//!
//! This module provides an LRU cache for decoded tiles, so that a tile that
//! scrolls out of view and back in is not decoded from disk again.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total pixel bytes of cached tiles and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

use super::buffer::Tile;
use super::id::TileId;

/// Default cache capacity: 256MB of pixel data
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Cached tiles plus their running byte total, kept under one lock.
struct CacheState {
    entries: LruCache<TileId, Arc<Tile>>,
    current_size: usize,
}

/// LRU cache of decoded tiles with size-based capacity.
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
pub struct TileCache {
    state: Mutex<CacheState>,

    /// Maximum total size in bytes
    max_size: usize,
}

impl TileCache {
    /// Create a new tile cache with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new tile cache with specified capacity and maximum entries.
    ///
    /// A `max_entries` of zero is treated as one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Get a tile, marking it as recently used.
    pub async fn get(&self, key: &TileId) -> Option<Arc<Tile>> {
        let mut state = self.state.lock().await;
        state.entries.get(key).cloned()
    }

    /// Check if a tile is cached without updating LRU order.
    pub async fn contains(&self, key: &TileId) -> bool {
        let state = self.state.lock().await;
        state.entries.contains(key)
    }

    /// Store a tile.
    ///
    /// If the cache is over capacity after insertion, least-recently-used
    /// entries are evicted until it fits. Replacing an entry updates its size.
    pub async fn put(&self, key: TileId, tile: Arc<Tile>) {
        let tile_size = tile.byte_size();
        let mut state = self.state.lock().await;

        if let Some(old_size) = state.entries.peek(&key).map(|old| old.byte_size()) {
            state.current_size = state.current_size.saturating_sub(old_size);
        }

        // Entry-count evictions happen inside `push`; account for them too
        if let Some((evicted_key, evicted)) = state.entries.push(key.clone(), tile) {
            if evicted_key != key {
                state.current_size = state.current_size.saturating_sub(evicted.byte_size());
            }
        }
        state.current_size += tile_size;

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_size = state.current_size.saturating_sub(evicted.byte_size());
                }
                None => break,
            }
        }
    }

    /// Remove a tile, returning it if it was cached.
    pub async fn remove(&self, key: &TileId) -> Option<Arc<Tile>> {
        let mut state = self.state.lock().await;
        let removed = state.entries.pop(key)?;
        state.current_size = state.current_size.saturating_sub(removed.byte_size());
        Some(removed)
    }

    /// Drop every tile of one media item.
    pub async fn remove_media(&self, media_id: &str) {
        let mut state = self.state.lock().await;
        let keys: Vec<TileId> = state
            .entries
            .iter()
            .filter(|(key, _)| &*key.media_id == media_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys {
            if let Some(removed) = state.entries.pop(&key) {
                state.current_size = state.current_size.saturating_sub(removed.byte_size());
            }
        }
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.current_size = 0;
    }

    /// Get the current number of cached tiles.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Get the current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        self.state.lock().await.current_size
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
