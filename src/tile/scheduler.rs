//! Load scheduler for tile decodes.
//!
//! The scheduler is the only component that turns cache misses into decode
//! work. For every request it:
//!
//! 1. Serves READY tiles straight from the cache
//! 2. Drops requests for stale layers without touching the cache
//! 3. Claims the decode through [`TileCache::begin_load`] (one per tile)
//! 4. Runs the loader on a worker task, bounded by a semaphore
//! 5. Stores the result, or returns the entry to ABSENT on failure
//!
//! ```text
//!   request(key) ──▶ lookup ──hit──▶ Ready
//!                      │miss
//!                      ▼
//!                 StaleFilter ──reject──▶ Stale
//!                      │accept
//!                      ▼
//!                  begin_load ──pending──▶ InFlight
//!                      │ticket
//!                      ▼
//!            worker: permit → loader → complete_load → notify
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::cache::{BeginLoad, LoadTicket, Lookup, TileCache};
use super::filter::StaleFilter;
use super::loader::TileLoader;
use crate::buffer::Buffer;
use crate::pyramid::TileKey;

/// Default number of concurrent decodes.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Outcome of [`LoadScheduler::request`].
#[derive(Debug, Clone)]
pub enum Request {
    /// The tile was already cached
    Ready(Buffer),
    /// A decode was queued for the tile
    Dispatched,
    /// A decode for the tile is already queued or running
    InFlight,
    /// The tile's layer is no longer relevant; nothing was queued
    Stale,
}

/// Returns a ticket to the cache if a worker exits without a result, so a
/// panicking or cancelled decode never leaves a tile stuck in PENDING.
struct TicketGuard {
    cache: Arc<TileCache>,
    ticket: Option<LoadTicket>,
    outstanding: Arc<AtomicUsize>,
}

impl TicketGuard {
    fn ticket(&self) -> Option<&LoadTicket> {
        self.ticket.as_ref()
    }

    fn complete(mut self, buffer: Buffer) {
        if let Some(ticket) = self.ticket.take() {
            self.cache.complete_load(ticket, buffer);
        }
    }

    fn abort(mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.cache.abort_ticket(ticket);
        }
    }
}

impl Drop for TicketGuard {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.cache.fail_load(ticket);
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

// =============================================================================
// Load Scheduler
// =============================================================================

/// Dispatches tile decodes for cache misses.
///
/// # Type Parameters
///
/// * `L` - The loader that decodes tiles
pub struct LoadScheduler<L: TileLoader> {
    cache: Arc<TileCache>,
    loader: Arc<L>,
    filter: StaleFilter,
    permits: Arc<Semaphore>,
    outstanding: Arc<AtomicUsize>,
    runtime: Handle,
}

impl<L: TileLoader> LoadScheduler<L> {
    /// Create a scheduler running decodes on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`with_runtime`](Self::with_runtime) from plain threads.
    pub fn new(cache: Arc<TileCache>, loader: Arc<L>, filter: StaleFilter, workers: usize) -> Self {
        Self::with_runtime(cache, loader, filter, workers, Handle::current())
    }

    /// Create a scheduler running decodes on `runtime`.
    ///
    /// At most `workers` decodes run at once (at least one).
    pub fn with_runtime(
        cache: Arc<TileCache>,
        loader: Arc<L>,
        filter: StaleFilter,
        workers: usize,
        runtime: Handle,
    ) -> Self {
        Self {
            cache,
            loader,
            filter,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            outstanding: Arc::new(AtomicUsize::new(0)),
            runtime,
        }
    }

    /// Request a tile.
    ///
    /// Never blocks: a miss either queues a decode or reports why not.
    /// Stale requests are expected during fast zooming and are not errors.
    pub fn request(&self, key: TileKey) -> Request {
        if let Lookup::Ready(buffer) = self.cache.lookup(key) {
            return Request::Ready(buffer);
        }

        if !self.filter.accepts(key.layer) {
            debug!(
                tile = %key,
                live_layer = ?self.filter.live_layer(),
                "Dropping stale tile request"
            );
            return Request::Stale;
        }

        match self.cache.begin_load(key) {
            BeginLoad::Ready(buffer) => Request::Ready(buffer),
            BeginLoad::InFlight => Request::InFlight,
            BeginLoad::Ticket(ticket) => {
                self.dispatch(ticket);
                Request::Dispatched
            }
        }
    }

    fn dispatch(&self, ticket: LoadTicket) {
        let key = ticket.key();
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let guard = TicketGuard {
            cache: self.cache.clone(),
            ticket: Some(ticket),
            outstanding: self.outstanding.clone(),
        };

        let cache = self.cache.clone();
        let loader = self.loader.clone();
        let filter = self.filter.clone();
        let permits = self.permits.clone();

        debug!(tile = %key, "Dispatching tile load");
        self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                guard.abort();
                return;
            };

            // The entry may have been aborted while queued.
            let current = guard.ticket().is_some_and(|ticket| cache.is_current(ticket));
            if !current {
                debug!(tile = %key, "Skipping aborted tile load");
                guard.abort();
                return;
            }

            if !filter.accepts(key.layer) {
                debug!(tile = %key, "Tile went stale before decoding");
                guard.abort();
                return;
            }

            match loader.load_tile(key).await {
                Ok(buffer) => guard.complete(buffer),
                Err(e) => {
                    warn!(tile = %key, error = %e, "Tile load failed");
                    // Dropping the guard returns the entry to ABSENT
                    drop(guard);
                }
            }
        });
    }

    /// Abort PENDING loads whose layer is no longer accepted.
    ///
    /// Call after the live layer changes. Decodes that are already running
    /// are not interrupted; their tiles are still stored when they finish.
    /// Returns the number of aborted entries.
    pub fn prune_stale(&self) -> usize {
        if !self.filter.is_enabled() {
            return 0;
        }

        let aborted = self
            .cache
            .pending_keys()
            .into_iter()
            .filter(|key| !self.filter.accepts(key.layer))
            .filter(|key| self.cache.abort_load(*key))
            .count();

        if aborted > 0 {
            debug!(
                aborted,
                live_layer = ?self.filter.live_layer(),
                "Aborted stale tile loads"
            );
        }
        aborted
    }

    /// Number of dispatched loads that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn filter(&self) -> &StaleFilter {
        &self.filter
    }
}

// =============================================================================
// Tests
// =============================================================================
