//! Slide sessions.
//!
//! A slide session ties the pieces of the data plane together for one open
//! slide:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               SlideHost                 │
//! │    (one active slide, replace/close)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │                 Slide                   │
//! │  Extent ──(layer, x, y)──▶ TileKey      │
//! │  LoadScheduler ──▶ TileCache            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Closing a slide clears its cache: waiters are woken with
//! [`WaitOutcome::Cleared`](crate::tile::WaitOutcome::Cleared) and decodes
//! still in flight are discarded when they finish.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsi_tile_plane::pyramid::Extent;
//! use wsi_tile_plane::slide::{SlideHost, SlideOpenConfig};
//! use wsi_tile_plane::tile::{LiveLayer, Notification, SyntheticLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extent = Extent::from_scales(2048, 1536, &[1.0, 4.0, 16.0])?;
//!     let loader = Arc::new(SyntheticLoader::new(Arc::new(extent.clone()))?);
//!
//!     let live = Arc::new(LiveLayer::new(0));
//!     let config = SlideOpenConfig::default()
//!         .with_live_layer(live.clone())
//!         .with_notification(Arc::new(Notification::new()));
//!
//!     let host = SlideHost::new();
//!     let slide = host.open(extent, loader, config)?;
//!     slide.request_tile(0, 0, 0)?;
//!     Ok(())
//! }
//! ```

mod host;
mod session;

pub use host::SlideHost;
pub use session::{Slide, SlideOpenConfig};
