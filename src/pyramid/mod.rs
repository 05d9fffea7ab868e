//! Pyramid addressing.
//!
//! Pure functions mapping `(layer, x, y)` tile coordinates to linear tile
//! identifiers and exposing layer geometry. Nothing here holds mutable state.
//!
//! # Layer Ordering
//!
//! ```text
//! layer 0   ┌──┐             most zoomed out, largest downsample
//! layer 1   ┌──┬──┐
//!           └──┴──┘
//! layer N   ┌──┬──┬──┬──┐    most detailed, downsample 1.0
//!           └──┴──┴──┴──┘
//! ```
//!
//! Tiles are always [`TILE_SIZE`] pixels square and numbered row-major:
//! `tile_id = y * x_tiles + x`.

mod extent;
mod key;

pub use extent::{Extent, LayerExtent};
pub use key::{LayerIndex, TileIndex, TileKey};

/// Edge length of a tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Bytes in one RGBA tile.
pub const RGBA_TILE_BYTES: usize = (TILE_SIZE * TILE_SIZE * 4) as usize;
