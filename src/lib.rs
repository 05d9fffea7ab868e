//! # WSI Tile Plane
//!
//! The in-memory data plane of a Whole Slide Image (WSI) viewer.
//!
//! A WSI is a multi-gigapixel image stored as a pyramid of resolution layers,
//! each cut into 256x256 tiles. A viewer only ever needs the handful of tiles
//! under its viewport at the layer it is currently rendering. This crate holds
//! those tiles while they are decoded, shared and eventually evicted.
//!
//! ## Features
//!
//! - **Dual-mode buffers**: reference-counted byte blocks that either own their
//!   storage or borrow foreign memory without copying
//! - **Pyramid addressing**: `(layer, x, y)` to linear tile ids and back
//! - **Bounded tile cache**: at most one decode in flight per tile, LRU
//!   eviction of decoded tiles, broadcast notification on completion
//! - **Stale-layer filtering**: requests for layers the viewer zoomed away from
//!   are dropped before any decode work starts
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`buffer`] - Shared strong/weak byte buffers
//! - [`pyramid`] - Slide extent and tile addressing
//! - [`tile`] - Tile cache, notification, stale filter and load scheduler
//! - [`slide`] - Slide sessions tying the pieces together
//! - [`config`] - CLI configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wsi_tile_plane::{Extent, LiveLayer, Notification, Slide, SlideOpenConfig, SyntheticLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extent = Extent::from_scales(1024, 768, &[1.0, 2.0, 4.0])?;
//!     let loader = Arc::new(SyntheticLoader::new(Arc::new(extent.clone()))?);
//!
//!     let live = Arc::new(LiveLayer::new(2));
//!     let config = SlideOpenConfig::default()
//!         .with_live_layer(live)
//!         .with_notification(Arc::new(Notification::new()));
//!     let slide = Slide::open(extent, loader, config)?;
//!
//!     slide.request_tile(2, 0, 0)?;
//!     let key = slide.extent().tile_key(2, 0, 0)?;
//!     let outcome = tokio::time::timeout(Duration::from_secs(1), slide.wait_for_async(key)).await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod pyramid;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use buffer::{Buffer, BufferView, Strength, WriteRegion};
pub use config::{Cli, Command, ExtentConfig, PyramidArgs, SimulateConfig};
pub use error::{BufferError, CacheError, LoadError, PyramidError, SlideError};
pub use pyramid::{
    Extent, LayerExtent, LayerIndex, TileIndex, TileKey, RGBA_TILE_BYTES, TILE_SIZE,
};
pub use slide::{Slide, SlideHost, SlideOpenConfig};
pub use tile::{
    decode_rgba, BeginLoad, CacheStats, LiveLayer, LoadScheduler, LoadTicket, Lookup,
    Notification, Request, StaleFilter, SyntheticLoader, TileCache, TileLoader, WaitOutcome,
    DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_WORKER_COUNT,
};
