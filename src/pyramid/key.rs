use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a pyramid layer (0 = most zoomed out).
pub type LayerIndex = u32;

/// Row-major tile identifier, unique only within its layer.
pub type TileIndex = u32;

/// Composite key identifying one tile of a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    /// Pyramid layer
    pub layer: LayerIndex,

    /// Tile identifier within the layer
    pub tile: TileIndex,
}

impl TileKey {
    pub const fn new(layer: LayerIndex, tile: TileIndex) -> Self {
        Self { layer, tile }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layer, self.tile)
    }
}

impl From<(LayerIndex, TileIndex)> for TileKey {
    fn from((layer, tile): (LayerIndex, TileIndex)) -> Self {
        Self::new(layer, tile)
    }
}
