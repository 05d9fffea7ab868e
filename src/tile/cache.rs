//! Tile cache for decoded tile buffers.
//!
//! This module provides a bounded cache from [`TileKey`] to [`Buffer`] that
//! also tracks in-flight decodes, so the same tile is never decoded twice at
//! the same time.
//!
//! # Entry States
//!
//! ```text
//!            begin_load           complete_load
//!   ABSENT ─────────────▶ PENDING ─────────────▶ READY ──(LRU)──▶ EVICTED
//!     ▲                      │                                      │
//!     └── abort / failure ───┘          begin_load ◀────────────────┘
//! ```
//!
//! # Locking
//!
//! Entry state lives in a sharded map: each shard is a `RwLock`, so lookups
//! on different keys never contend and lookups on the same shard share a
//! read lock. READY entries are additionally threaded through one LRU list
//! (`lru::LruCache`) behind a mutex; touching or evicting is O(1). When both
//! are held, the LRU lock is always taken first. Lookups never hold two
//! locks at once.
//!
//! A `clear` takes every lock, bumps the cache epoch and empties everything.
//! Tickets carry the epoch they were issued in, so decodes started for a
//! previous slide are dropped on completion.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, trace};

use super::notify::Notification;
use crate::buffer::Buffer;
use crate::error::CacheError;
use crate::pyramid::TileKey;

/// Default cache capacity: 1000 READY tiles.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 1000;

/// Number of independently locked map shards.
const SHARD_COUNT: usize = 16;

// =============================================================================
// Public Types
// =============================================================================

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The tile is decoded and available
    Ready(Buffer),
    /// A decode is in flight; wait rather than request again
    Pending,
    /// The tile was cached but evicted; request it again
    Evicted,
    /// The tile was never requested (or was aborted)
    Absent,
}

impl Lookup {
    pub fn is_ready(&self) -> bool {
        matches!(self, Lookup::Ready(_))
    }

    /// The buffer if the tile is ready.
    pub fn ready(self) -> Option<Buffer> {
        match self {
            Lookup::Ready(buffer) => Some(buffer),
            _ => None,
        }
    }
}

/// Permission to decode one tile, issued by [`TileCache::begin_load`].
///
/// Exactly one ticket exists per PENDING entry. Hand it back through
/// [`TileCache::complete_load`], [`TileCache::fail_load`] or
/// [`TileCache::abort_ticket`].
#[derive(Debug)]
#[must_use = "a ticket that is never completed leaves the tile pending"]
pub struct LoadTicket {
    key: TileKey,
    id: u64,
    epoch: u64,
}

impl LoadTicket {
    pub fn key(&self) -> TileKey {
        self.key
    }
}

/// Result of [`TileCache::begin_load`].
#[derive(Debug)]
pub enum BeginLoad {
    /// The caller now owns the decode for this tile
    Ticket(LoadTicket),
    /// Another decode is already in flight
    InFlight,
    /// The tile is already cached
    Ready(Buffer),
}

/// Result of waiting for a tile.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Ready(Buffer),
    /// The cache was cleared (slide closed or replaced) while waiting
    Cleared,
    /// No decode is in flight for the tile: it failed, was aborted, was
    /// evicted again, or was never requested. Request it to retry.
    Abandoned,
    TimedOut,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub ready: usize,
    pub pending: usize,
    pub hits: u64,
    pub misses: u64,
    pub completions: u64,
    /// Completions that arrived after their entry was aborted or evicted
    pub late_completions: u64,
    /// Completions dropped because the cache was cleared meanwhile
    pub discarded: u64,
    pub evictions: u64,
    pub aborts: u64,
    pub failures: u64,
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug)]
enum Slot {
    Pending { ticket: u64 },
    Ready(Buffer),
    Evicted,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    completions: AtomicU64,
    late_completions: AtomicU64,
    discarded: AtomicU64,
    evictions: AtomicU64,
    aborts: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Bounded, concurrently accessed cache of decoded tiles.
///
/// `capacity` bounds the number of READY tiles; PENDING entries are never
/// evicted. Inserting a READY tile beyond capacity evicts the least recently
/// touched READY tile, where lookups and completions count as touches.
///
/// # Example
///
/// ```
/// use wsi_tile_plane::buffer::Buffer;
/// use wsi_tile_plane::pyramid::TileKey;
/// use wsi_tile_plane::tile::{BeginLoad, TileCache};
///
/// let cache = TileCache::with_capacity(2);
/// let key = TileKey::new(0, 0);
///
/// let BeginLoad::Ticket(ticket) = cache.begin_load(key) else {
///     unreachable!()
/// };
/// assert!(matches!(cache.begin_load(key), BeginLoad::InFlight));
///
/// cache.complete_load(ticket, Buffer::copy_from(&[0u8; 16]).unwrap());
/// assert!(cache.lookup(key).is_ready());
/// ```
pub struct TileCache {
    shards: Box<[RwLock<HashMap<TileKey, Slot>>]>,
    hasher: RandomState,
    recency: Mutex<LruCache<TileKey, ()>>,
    capacity: NonZeroUsize,
    epoch: AtomicU64,
    next_ticket: AtomicU64,
    notification: Option<Arc<Notification>>,
    counters: Counters,
}

impl TileCache {
    /// Create a cache with the default capacity and no notification.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` READY tiles.
    ///
    /// A capacity of 0 is treated as 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_notification(capacity, None)
    }

    /// Create a cache that signals `notification` on every completion and
    /// on clear.
    pub fn with_notification(capacity: usize, notification: Option<Arc<Notification>>) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
            recency: Mutex::new(LruCache::unbounded()),
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            epoch: AtomicU64::new(0),
            next_ticket: AtomicU64::new(0),
            notification,
            counters: Counters::default(),
        }
    }

    fn shard(&self, key: TileKey) -> &RwLock<HashMap<TileKey, Slot>> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    fn signal(&self) {
        if let Some(notification) = &self.notification {
            notification.notify_all();
        }
    }

    /// Look a tile up without blocking on any decode.
    ///
    /// A hit marks the tile as recently used.
    pub fn lookup(&self, key: TileKey) -> Lookup {
        let result = self.peek(key);
        if result.is_ready() {
            self.recency.lock().promote(&key);
            Counters::bump(&self.counters.hits);
        } else {
            Counters::bump(&self.counters.misses);
        }
        result
    }

    /// Like [`lookup`](Self::lookup) but without touching recency or stats.
    pub fn peek(&self, key: TileKey) -> Lookup {
        match self.shard(key).read().get(&key) {
            Some(Slot::Ready(buffer)) => Lookup::Ready(buffer.clone()),
            Some(Slot::Pending { .. }) => Lookup::Pending,
            Some(Slot::Evicted) => Lookup::Evicted,
            None => Lookup::Absent,
        }
    }

    /// Claim the decode of `key`.
    ///
    /// Only one ticket is ever outstanding per key: while a decode is in
    /// flight every other caller gets [`BeginLoad::InFlight`].
    pub fn begin_load(&self, key: TileKey) -> BeginLoad {
        let mut shard = self.shard(key).write();
        match shard.get(&key) {
            Some(Slot::Pending { .. }) => BeginLoad::InFlight,
            Some(Slot::Ready(buffer)) => BeginLoad::Ready(buffer.clone()),
            Some(Slot::Evicted) | None => {
                let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                // Read under the shard lock: `clear` holds every shard lock
                // while it bumps the epoch.
                let epoch = self.epoch.load(Ordering::Acquire);
                shard.insert(key, Slot::Pending { ticket: id });
                BeginLoad::Ticket(LoadTicket { key, id, epoch })
            }
        }
    }

    /// Store a decoded tile and wake waiters.
    ///
    /// The tile becomes READY and most recently used, evicting the least
    /// recently used READY tiles beyond capacity. A tile whose entry was
    /// aborted or evicted while decoding is still stored. Returns `false`
    /// only when the cache was cleared since the ticket was issued; the
    /// buffer is dropped in that case.
    pub fn complete_load(&self, ticket: LoadTicket, buffer: Buffer) -> bool {
        let key = ticket.key;
        let mut recency = self.recency.lock();

        if ticket.epoch != self.epoch.load(Ordering::Acquire) {
            Counters::bump(&self.counters.discarded);
            debug!(tile = %key, "Discarding tile decoded for a cleared cache");
            return false;
        }

        {
            let mut shard = self.shard(key).write();
            let previous = shard.insert(key, Slot::Ready(buffer));
            match previous {
                Some(Slot::Pending { ticket: id }) if id == ticket.id => {}
                _ => Counters::bump(&self.counters.late_completions),
            }
        }
        Counters::bump(&self.counters.completions);

        recency.put(key, ());
        let mut evicted = Vec::new();
        while recency.len() > self.capacity.get() {
            match recency.pop_lru() {
                Some((victim, ())) => evicted.push(victim),
                None => break,
            }
        }

        for victim in evicted {
            let mut shard = self.shard(victim).write();
            if let Some(slot) = shard.get_mut(&victim) {
                if matches!(slot, Slot::Ready(_)) {
                    *slot = Slot::Evicted;
                }
            }
            Counters::bump(&self.counters.evictions);
            trace!(tile = %victim, "Evicted tile");
        }

        drop(recency);
        self.signal();
        true
    }

    /// Return a PENDING entry to ABSENT.
    ///
    /// Used when a queued request went stale. Returns `false` if the entry
    /// was not pending. A decode already running for it may still complete
    /// and will be stored.
    pub fn abort_load(&self, key: TileKey) -> bool {
        let aborted = {
            let mut shard = self.shard(key).write();
            matches!(shard.get(&key), Some(Slot::Pending { .. })) && shard.remove(&key).is_some()
        };
        if aborted {
            Counters::bump(&self.counters.aborts);
            self.signal();
        }
        aborted
    }

    /// Give a ticket back without a result, counted as an abort.
    pub fn abort_ticket(&self, ticket: LoadTicket) -> bool {
        let released = self.release(&ticket);
        if released {
            Counters::bump(&self.counters.aborts);
        }
        released
    }

    /// Give a ticket back after a failed decode so the tile can be retried.
    pub fn fail_load(&self, ticket: LoadTicket) -> bool {
        let released = self.release(&ticket);
        Counters::bump(&self.counters.failures);
        released
    }

    fn release(&self, ticket: &LoadTicket) -> bool {
        let owned = {
            let mut shard = self.shard(ticket.key).write();
            let owned = matches!(
                shard.get(&ticket.key),
                Some(Slot::Pending { ticket: id }) if *id == ticket.id
            );
            if owned {
                shard.remove(&ticket.key);
            }
            owned
        };
        // Waiters on the tile have nothing left to wait for.
        if owned {
            self.signal();
        }
        owned
    }

    /// Whether `ticket` still owns a PENDING entry.
    ///
    /// `false` once the entry was aborted, completed by someone else, or
    /// the cache was cleared.
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        let shard = self.shard(ticket.key).read();
        if ticket.epoch != self.epoch.load(Ordering::Acquire) {
            return false;
        }
        matches!(shard.get(&ticket.key), Some(Slot::Pending { ticket: id }) if *id == ticket.id)
    }

    /// Drop every entry, invalidate all tickets and wake all waiters.
    pub fn clear(&self) {
        let mut recency = self.recency.lock();
        let mut shards: Vec<_> = self.shards.iter().map(|shard| shard.write()).collect();

        self.epoch.fetch_add(1, Ordering::AcqRel);

        let mut pending = 0usize;
        for shard in shards.iter_mut() {
            pending += shard
                .values()
                .filter(|slot| matches!(slot, Slot::Pending { .. }))
                .count();
            shard.clear();
        }
        let ready = recency.len();
        recency.clear();

        drop(shards);
        drop(recency);

        self.counters
            .aborts
            .fetch_add(pending as u64, Ordering::Relaxed);
        debug!(ready, pending, "Cleared tile cache");
        self.signal();
    }

    /// Keys of all PENDING entries.
    pub fn pending_keys(&self) -> Vec<TileKey> {
        let mut keys = Vec::new();
        for shard in self.shards.iter() {
            keys.extend(
                shard
                    .read()
                    .iter()
                    .filter(|(_, slot)| matches!(slot, Slot::Pending { .. }))
                    .map(|(key, _)| *key),
            );
        }
        keys
    }

    fn ready_now(&self, key: TileKey, epoch: u64) -> Option<WaitOutcome> {
        if self.epoch.load(Ordering::Acquire) != epoch {
            return Some(WaitOutcome::Cleared);
        }
        match self.peek(key) {
            Lookup::Ready(buffer) => {
                self.recency.lock().promote(&key);
                Some(WaitOutcome::Ready(buffer))
            }
            Lookup::Pending => None,
            Lookup::Absent | Lookup::Evicted => Some(WaitOutcome::Abandoned),
        }
    }

    /// Block the calling thread until `key` is READY, the cache is cleared,
    /// or `timeout` elapses.
    ///
    /// Only PENDING tiles are worth waiting for: once the tile is neither
    /// PENDING nor READY the wait ends with [`WaitOutcome::Abandoned`].
    /// `Duration::MAX` waits without a deadline.
    ///
    /// Fails with [`CacheError::NoNotification`] when the cache has no
    /// notification to wait on; poll [`lookup`](Self::lookup) instead.
    pub fn wait_for(&self, key: TileKey, timeout: Duration) -> Result<WaitOutcome, CacheError> {
        let notification = self
            .notification
            .as_ref()
            .ok_or(CacheError::NoNotification)?;
        let epoch = self.epoch.load(Ordering::Acquire);
        Ok(notification
            .wait_until(timeout, || self.ready_now(key, epoch))
            .unwrap_or(WaitOutcome::TimedOut))
    }

    /// Wait asynchronously until `key` is READY, abandoned, or the cache is
    /// cleared.
    pub async fn wait_for_async(&self, key: TileKey) -> Result<WaitOutcome, CacheError> {
        let notification = self
            .notification
            .as_ref()
            .ok_or(CacheError::NoNotification)?;
        let epoch = self.epoch.load(Ordering::Acquire);
        Ok(notification
            .wait_until_async(|| self.ready_now(key, epoch))
            .await)
    }

    /// Number of READY tiles.
    pub fn len(&self) -> usize {
        self.recency.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of READY tiles.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of times the cache has been cleared.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn notification(&self) -> Option<&Arc<Notification>> {
        self.notification.as_ref()
    }

    pub fn stats(&self) -> CacheStats {
        let counters = &self.counters;
        CacheStats {
            capacity: self.capacity(),
            ready: self.len(),
            pending: self.pending_keys().len(),
            hits: Counters::get(&counters.hits),
            misses: Counters::get(&counters.misses),
            completions: Counters::get(&counters.completions),
            late_completions: Counters::get(&counters.late_completions),
            discarded: Counters::get(&counters.discarded),
            evictions: Counters::get(&counters.evictions),
            aborts: Counters::get(&counters.aborts),
            failures: Counters::get(&counters.failures),
        }
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
