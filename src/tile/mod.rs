//! Tile cache and load scheduling.
//!
//! This module owns every decoded tile of the open slide and decides which
//! tiles get decoded at all.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Renderer / Viewport controller      │
//! │   (requests tiles, publishes HR layer)  │
//! └──────────┬─────────────────▲────────────┘
//!            │ request         │ notify_all
//!            ▼                 │
//! ┌─────────────────────────────────────────┐
//! │             LoadScheduler               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ StaleFilter  │  │  worker tasks   │  │
//! │  │ (HR, HR - 1) │  │  (semaphore)    │  │
//! │  └──────────────┘  └────────┬────────┘  │
//! └────────────────────┬────────┼───────────┘
//!                      │        │ load_tile
//!                      ▼        ▼
//! ┌──────────────────────┐  ┌───────────────┐
//! │      TileCache       │  │  TileLoader   │
//! │ ABSENT → PENDING →   │  │  (codec)      │
//! │ READY → EVICTED (LRU)│  └───────────────┘
//! └──────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileCache`]: Bounded map of tile states with at-most-one decode per tile
//! - [`Notification`]: Broadcast wake shared by the cache and its consumers
//! - [`StaleFilter`] / [`LiveLayer`]: Suppress decodes for layers the viewer left
//! - [`LoadScheduler`]: Turns cache misses into bounded background decodes
//! - [`TileLoader`]: Seam to the codec that produces decoded buffers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wsi_tile_plane::pyramid::TileKey;
//! use wsi_tile_plane::tile::{BeginLoad, Notification, TileCache, WaitOutcome};
//! use wsi_tile_plane::Buffer;
//! use std::time::Duration;
//!
//! let cache = TileCache::with_notification(64, Some(Arc::new(Notification::new())));
//! let key = TileKey::new(0, 0);
//!
//! if let BeginLoad::Ticket(ticket) = cache.begin_load(key) {
//!     let decoded = Buffer::copy_from(&[0u8; 16]).unwrap();
//!     cache.complete_load(ticket, decoded);
//! }
//!
//! let outcome = cache.wait_for(key, Duration::from_millis(10)).unwrap();
//! assert!(matches!(outcome, WaitOutcome::Ready(_)));
//! ```

mod cache;
mod filter;
mod loader;
mod notify;
mod scheduler;

pub use cache::{
    BeginLoad, CacheStats, LoadTicket, Lookup, TileCache, WaitOutcome, DEFAULT_TILE_CACHE_CAPACITY,
};
pub use filter::{LiveLayer, StaleFilter};
pub use loader::{decode_rgba, SyntheticLoader, TileLoader};
pub use notify::Notification;
pub use scheduler::{LoadScheduler, Request, DEFAULT_WORKER_COUNT};
