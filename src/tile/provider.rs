//! Tile delivery for a viewer.
//!
//! Requests are answered from the [`TileCache`] when possible. Misses are
//! pushed onto a stack and loaded by background workers, newest request
//! first, so tiles the user is looking at right now win over tiles that
//! scrolled away. Loaded tiles are announced on a broadcast channel.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::store::TileStore;

use super::buffer::Tile;
use super::cache::TileCache;
use super::id::TileId;

/// Default number of background loaders.
pub const DEFAULT_PROVIDER_WORKERS: usize = 2;

/// Requests kept waiting; older ones are dropped first.
const MAX_QUEUED_REQUESTS: usize = 1024;

/// Capacity of the loaded-tile broadcast channel.
const LOADED_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Sources
// =============================================================================

/// Produces tile pixels on demand.
///
/// Called from blocking threads, so implementations may do file I/O.
pub trait TileSource: Send + Sync + 'static {
    /// Load one tile, or `None` if the source has no such tile.
    fn load(&self, id: &TileId) -> Result<Option<Tile>, TileError>;
}

/// Reads tiles written by the pyramid builder.
pub struct StoreTileSource {
    store: Arc<TileStore>,
}

impl StoreTileSource {
    pub fn new(store: Arc<TileStore>) -> Self {
        Self { store }
    }
}

impl TileSource for StoreTileSource {
    fn load(&self, id: &TileId) -> Result<Option<Tile>, TileError> {
        let Some(pyramid) = self.store.pyramid_metadata(&id.media_id)? else {
            return Ok(None);
        };
        if id.level > pyramid.maxtilelevel {
            return Ok(None);
        }

        let path = self.store.tile_path(id, false, "", &pyramid.filext)?;
        if !path.is_file() {
            return Ok(None);
        }
        Tile::open(&path).map(Some)
    }
}

/// Procedural two-colour checkerboard, useful as a placeholder.
#[derive(Debug, Clone)]
pub struct CheckerboardSource {
    tile_size: u32,
    square: u32,
    colors: [[u8; 3]; 2],
}

impl CheckerboardSource {
    pub fn new(tile_size: u32, square: u32) -> Self {
        Self {
            tile_size: tile_size.max(1),
            square: square.max(1),
            colors: [[0xFF, 0xFF, 0xFF], [0xCC, 0xCC, 0xCC]],
        }
    }

    pub fn with_colors(mut self, light: [u8; 3], dark: [u8; 3]) -> Self {
        self.colors = [light, dark];
        self
    }
}

impl TileSource for CheckerboardSource {
    fn load(&self, id: &TileId) -> Result<Option<Tile>, TileError> {
        let size = self.tile_size;
        let square = self.square;
        let colors = self.colors;
        // Offset by tile position so neighbouring tiles continue the pattern
        let origin_x = u64::from(id.column) * u64::from(size);
        let origin_y = u64::from(id.row) * u64::from(size);

        let pixels = RgbImage::from_fn(size, size, |x, y| {
            let cx = (origin_x + u64::from(x)) / u64::from(square);
            let cy = (origin_y + u64::from(y)) / u64::from(square);
            image::Rgb(colors[((cx + cy) % 2) as usize])
        });
        Ok(Some(Tile::from_image(pixels)))
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Waiting requests and those being loaded.
#[derive(Default)]
struct RequestQueue {
    /// Newest request last
    stack: Vec<TileId>,
    in_flight: HashSet<TileId>,
}

impl RequestQueue {
    /// Push `id` on top, moving it there if it already waits.
    ///
    /// Returns `false` if the tile is already being loaded.
    fn push(&mut self, id: TileId) -> bool {
        if self.in_flight.contains(&id) {
            return false;
        }
        if let Some(pos) = self.stack.iter().position(|queued| *queued == id) {
            self.stack.remove(pos);
        }
        self.stack.push(id);
        if self.stack.len() > MAX_QUEUED_REQUESTS {
            self.stack.remove(0);
        }
        true
    }

    fn pop(&mut self) -> Option<TileId> {
        let id = self.stack.pop()?;
        self.in_flight.insert(id.clone());
        Some(id)
    }
}

struct Shared {
    cache: Arc<TileCache>,
    source: Arc<dyn TileSource>,
    queue: Mutex<RequestQueue>,
    wake: Notify,
    loaded: broadcast::Sender<TileId>,
}

impl Shared {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, RequestQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serves tiles from a cache backed by a [`TileSource`].
///
/// Must be created from within a Tokio runtime; workers are aborted on
/// [`shutdown`](Self::shutdown) or drop.
pub struct TileProvider {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TileProvider {
    pub fn new(source: Arc<dyn TileSource>, cache: Arc<TileCache>) -> Self {
        Self::with_workers(source, cache, DEFAULT_PROVIDER_WORKERS)
    }

    /// Create a provider with `workers` background loaders (minimum one).
    pub fn with_workers(source: Arc<dyn TileSource>, cache: Arc<TileCache>, workers: usize) -> Self {
        let (loaded, _) = broadcast::channel(LOADED_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            cache,
            source,
            queue: Mutex::new(RequestQueue::default()),
            wake: Notify::new(),
            loaded,
        });

        let workers = (0..workers.max(1))
            .map(|worker| tokio::spawn(run_worker(Arc::clone(&shared), worker)))
            .collect();

        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.shared.cache
    }

    /// Receive the id of every tile loaded into the cache from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TileId> {
        self.shared.loaded.subscribe()
    }

    /// Return the tile if cached, otherwise queue it for loading.
    ///
    /// A queued tile is announced through [`subscribe`](Self::subscribe) once
    /// loaded. Requesting a tile that already waits moves it to the front.
    pub async fn request(&self, id: &TileId) -> Option<Arc<Tile>> {
        if let Some(tile) = self.shared.cache.get(id).await {
            return Some(tile);
        }

        let queued = self.shared.lock_queue().push(id.clone());
        if queued {
            self.shared.wake.notify_one();
        }
        None
    }

    /// Load a tile right away, bypassing the request stack.
    pub async fn fetch(&self, id: &TileId) -> Result<Option<Arc<Tile>>, TileError> {
        if let Some(tile) = self.shared.cache.get(id).await {
            return Ok(Some(tile));
        }
        load_into_cache(&self.shared, id.clone()).await
    }

    /// Number of requests waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.lock_queue().stack.len()
    }

    /// Forget waiting requests; loads already running still complete.
    pub fn cancel_pending(&self) {
        self.shared.lock_queue().stack.clear();
    }

    /// Stop the workers.
    pub async fn shutdown(&self) {
        let workers: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for worker in &workers {
            worker.abort();
        }
        for worker in workers {
            let _ = worker.await;
        }
    }
}

impl Drop for TileProvider {
    fn drop(&mut self) {
        let workers = self.workers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for worker in workers.drain(..) {
            worker.abort();
        }
    }
}

async fn run_worker(shared: Arc<Shared>, worker: usize) {
    loop {
        let next = shared.lock_queue().pop();
        let Some(id) = next else {
            shared.wake.notified().await;
            continue;
        };

        debug!(worker, tile = %id, "loading tile");
        match load_into_cache(&shared, id.clone()).await {
            Ok(Some(_)) => {
                // No receivers is fine
                let _ = shared.loaded.send(id.clone());
            }
            Ok(None) => debug!(tile = %id, "tile not available"),
            Err(e) => warn!(tile = %id, error = %e, "failed to load tile"),
        }
        shared.lock_queue().in_flight.remove(&id);
    }
}

async fn load_into_cache(shared: &Shared, id: TileId) -> Result<Option<Arc<Tile>>, TileError> {
    let source = Arc::clone(&shared.source);
    let key = id.clone();
    let loaded = tokio::task::spawn_blocking(move || source.load(&key))
        .await
        .map_err(|e| TileError::Image(format!("tile loader stopped: {}", e)))??;

    let Some(tile) = loaded else {
        return Ok(None);
    };
    let tile = Arc::new(tile);
    shared.cache.put(id, Arc::clone(&tile)).await;
    Ok(Some(tile))
}
