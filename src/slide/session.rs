//! A single open slide: pyramid geometry, tile cache and load scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::info;

use crate::error::{CacheError, SlideError};
use crate::pyramid::{Extent, LayerIndex, TileKey};
use crate::tile::{
    CacheStats, LiveLayer, LoadScheduler, Lookup, Notification, Request, StaleFilter, TileCache,
    TileLoader, WaitOutcome, DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_WORKER_COUNT,
};

// =============================================================================
// Configuration
// =============================================================================

/// Options for opening a slide.
#[derive(Debug, Clone)]
pub struct SlideOpenConfig {
    /// Maximum number of READY tiles kept in memory
    pub capacity: usize,

    /// Maximum number of concurrent decodes
    pub workers: usize,

    /// High-resolution layer published by the viewport controller.
    /// `None` disables stale filtering.
    pub live_layer: Option<Arc<LiveLayer>>,

    /// Broadcast signalled on every completed load.
    /// `None` means consumers have to poll.
    pub notification: Option<Arc<Notification>>,

    /// Runtime the decode workers run on; defaults to the current one
    pub runtime: Option<Handle>,
}

impl Default for SlideOpenConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TILE_CACHE_CAPACITY,
            workers: DEFAULT_WORKER_COUNT,
            live_layer: None,
            notification: None,
            runtime: None,
        }
    }
}

impl SlideOpenConfig {
    pub fn with_live_layer(mut self, live_layer: Arc<LiveLayer>) -> Self {
        self.live_layer = Some(live_layer);
        self
    }

    pub fn with_notification(mut self, notification: Arc<Notification>) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SlideError> {
        if self.capacity == 0 {
            return Err(SlideError::InvalidConfig(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(SlideError::InvalidConfig(
                "workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Slide
// =============================================================================

/// An open slide.
///
/// Owns the tile cache for the slide and the scheduler feeding it. Tiles are
/// addressed by `(layer, x, y)` and validated against the pyramid before any
/// work is queued.
pub struct Slide<L: TileLoader> {
    extent: Arc<Extent>,
    cache: Arc<TileCache>,
    scheduler: LoadScheduler<L>,
}

impl<L: TileLoader> Slide<L> {
    /// Open a slide over `extent`, decoding tiles with `loader`.
    ///
    /// Fails without side effects when the pyramid or the configuration is
    /// invalid, or when no runtime was given and none is current.
    pub fn open(extent: Extent, loader: Arc<L>, config: SlideOpenConfig) -> Result<Self, SlideError> {
        extent.validate()?;
        config.validate()?;

        let runtime = match config.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| {
                SlideError::InvalidConfig("no Tokio runtime available for decoding".to_string())
            })?,
        };

        let cache = Arc::new(TileCache::with_notification(
            config.capacity,
            config.notification,
        ));
        let filter = StaleFilter::new(config.live_layer);
        let scheduler = LoadScheduler::with_runtime(
            cache.clone(),
            loader,
            filter,
            config.workers,
            runtime,
        );

        info!(
            width = extent.width,
            height = extent.height,
            layers = extent.layer_count(),
            capacity = config.capacity,
            workers = config.workers,
            "Opened slide"
        );

        Ok(Self {
            extent: Arc::new(extent),
            cache,
            scheduler,
        })
    }

    pub fn extent(&self) -> &Arc<Extent> {
        &self.extent
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn scheduler(&self) -> &LoadScheduler<L> {
        &self.scheduler
    }

    /// Request the tile at `(x, y)` of `layer`.
    pub fn request_tile(&self, layer: LayerIndex, x: u32, y: u32) -> Result<Request, SlideError> {
        let key = self.extent.tile_key(layer, x, y)?;
        Ok(self.scheduler.request(key))
    }

    /// Request a tile by its key.
    pub fn request(&self, key: TileKey) -> Result<Request, SlideError> {
        self.extent.tile_coords(key.layer, key.tile)?;
        Ok(self.scheduler.request(key))
    }

    /// Non-blocking lookup of the tile at `(x, y)` of `layer`.
    pub fn lookup(&self, layer: LayerIndex, x: u32, y: u32) -> Result<Lookup, SlideError> {
        let key = self.extent.tile_key(layer, x, y)?;
        Ok(self.cache.lookup(key))
    }

    /// Block until `key` is READY, its load is abandoned, the slide is
    /// closed, or `timeout` elapses.
    pub fn wait_for(&self, key: TileKey, timeout: Duration) -> Result<WaitOutcome, CacheError> {
        self.cache.wait_for(key, timeout)
    }

    /// Wait asynchronously until `key` is READY, its load is abandoned, or
    /// the slide is closed.
    pub async fn wait_for_async(&self, key: TileKey) -> Result<WaitOutcome, CacheError> {
        self.cache.wait_for_async(key).await
    }

    /// Drop queued loads for layers the viewer left.
    ///
    /// Call after publishing a new high-resolution layer.
    pub fn prune_stale(&self) -> usize {
        self.scheduler.prune_stale()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Release every cached tile and invalidate pending loads.
    ///
    /// Waiters are woken with [`WaitOutcome::Cleared`]; decodes still
    /// running are discarded when they finish.
    pub fn close(&self) {
        let stats = self.cache.stats();
        self.cache.clear();
        info!(
            ready = stats.ready,
            pending = stats.pending,
            "Closed slide"
        );
    }
}
