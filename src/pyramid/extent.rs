//! Slide extent and per-layer tile geometry.

use serde::{Deserialize, Serialize};

use super::key::{LayerIndex, TileIndex, TileKey};
use super::TILE_SIZE;
use crate::error::PyramidError;

// =============================================================================
// LayerExtent
// =============================================================================

/// Tile grid and zoom factors of a single layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerExtent {
    /// Number of horizontal 256 pixel tiles
    pub x_tiles: u32,

    /// Number of vertical 256 pixel tiles
    pub y_tiles: u32,

    /// Zoom factor relative to layer 0
    pub scale: f32,

    /// Reciprocal zoom factor relative to the most detailed layer
    /// (1.0 for the most detailed layer)
    pub downsample: f32,
}

impl LayerExtent {
    pub fn tile_count(&self) -> u64 {
        u64::from(self.x_tiles) * u64::from(self.y_tiles)
    }
}

impl Default for LayerExtent {
    fn default() -> Self {
        Self {
            x_tiles: 1,
            y_tiles: 1,
            scale: 1.0,
            downsample: 1.0,
        }
    }
}

// =============================================================================
// Extent
// =============================================================================

/// Pixel extent of a slide plus the geometry of every pyramid layer.
///
/// `width` and `height` describe layer 0, the most zoomed-out layer. Layers
/// are ordered from most zoomed out to most detailed, so downsample factors
/// never increase with the layer index.
///
/// # Example
///
/// ```
/// use wsi_tile_plane::pyramid::Extent;
///
/// let extent = Extent::from_scales(1024, 512, &[1.0, 4.0, 16.0]).unwrap();
///
/// assert_eq!(extent.layer_count(), 3);
/// assert_eq!(extent.tile_count(0).unwrap(), 8);
/// assert_eq!(extent.tile_id(1, 3, 2).unwrap(), 2 * 16 + 3);
/// assert_eq!(extent.downsample(0).unwrap(), 16.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Layer 0 width in pixels
    pub width: u32,

    /// Layer 0 height in pixels
    pub height: u32,

    /// Per-layer geometry, most zoomed out first
    pub layers: Vec<LayerExtent>,
}

/// Pixel length of `pixels` at `scale`, rounded up.
fn scaled_pixels(pixels: u32, scale: f32) -> Result<u32, PyramidError> {
    let scaled = (pixels as f64 * scale as f64).ceil();
    if !scaled.is_finite() || scaled < 0.0 || scaled > u32::MAX as f64 {
        return Err(PyramidError::InvalidExtent(format!(
            "{} px at scale {} does not fit in u32",
            pixels, scale
        )));
    }
    Ok(scaled as u32)
}

impl Extent {
    /// Build an extent from layer 0 dimensions and per-layer zoom scales.
    ///
    /// `scales[i]` is the zoom of layer `i` relative to layer 0, so it must
    /// start at 1.0 and never decrease. Tile counts round partial tiles up.
    pub fn from_scales(width: u32, height: u32, scales: &[f32]) -> Result<Self, PyramidError> {
        let max_scale = match scales.last() {
            Some(&scale) => scale,
            None => return Err(PyramidError::InvalidExtent("no layers".to_string())),
        };

        let layers = scales
            .iter()
            .map(|&scale| {
                let layer_width = scaled_pixels(width, scale)?;
                let layer_height = scaled_pixels(height, scale)?;
                Ok(LayerExtent {
                    x_tiles: layer_width.div_ceil(TILE_SIZE).max(1),
                    y_tiles: layer_height.div_ceil(TILE_SIZE).max(1),
                    scale,
                    downsample: max_scale / scale,
                })
            })
            .collect::<Result<Vec<_>, PyramidError>>()?;

        let extent = Self {
            width,
            height,
            layers,
        };
        extent.validate()?;
        Ok(extent)
    }

    /// Check that the extent is non-empty and correctly ordered.
    pub fn validate(&self) -> Result<(), PyramidError> {
        if self.width == 0 || self.height == 0 {
            return Err(PyramidError::InvalidExtent(format!(
                "zero dimension {}x{}",
                self.width, self.height
            )));
        }
        if self.layers.is_empty() {
            return Err(PyramidError::InvalidExtent("no layers".to_string()));
        }

        for (index, layer) in self.layers.iter().enumerate() {
            if layer.x_tiles == 0 || layer.y_tiles == 0 {
                return Err(PyramidError::InvalidExtent(format!(
                    "layer {} has an empty tile grid",
                    index
                )));
            }
            if !(layer.scale.is_finite() && layer.scale > 0.0) {
                return Err(PyramidError::InvalidExtent(format!(
                    "layer {} has invalid scale {}",
                    index, layer.scale
                )));
            }
            if !(layer.downsample.is_finite() && layer.downsample > 0.0) {
                return Err(PyramidError::InvalidExtent(format!(
                    "layer {} has invalid downsample {}",
                    index, layer.downsample
                )));
            }
        }

        for (index, pair) in self.layers.windows(2).enumerate() {
            if pair[1].downsample > pair[0].downsample {
                return Err(PyramidError::InvalidExtent(format!(
                    "downsample increases from layer {} ({}) to layer {} ({})",
                    index,
                    pair[0].downsample,
                    index + 1,
                    pair[1].downsample
                )));
            }
        }

        Ok(())
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Index of the most detailed layer.
    pub fn top_layer(&self) -> Option<LayerIndex> {
        self.layers.len().checked_sub(1).map(|i| i as LayerIndex)
    }

    /// Geometry of `layer`.
    pub fn layer(&self, layer: LayerIndex) -> Result<&LayerExtent, PyramidError> {
        self.layers
            .get(layer as usize)
            .ok_or(PyramidError::LayerOutOfRange {
                layer,
                count: self.layers.len(),
            })
    }

    /// Number of tiles in `layer`.
    pub fn tile_count(&self, layer: LayerIndex) -> Result<u64, PyramidError> {
        self.layer(layer).map(LayerExtent::tile_count)
    }

    /// Row-major identifier of tile `(x, y)` in `layer`.
    pub fn tile_id(&self, layer: LayerIndex, x: u32, y: u32) -> Result<TileIndex, PyramidError> {
        let extent = self.layer(layer)?;
        if x >= extent.x_tiles || y >= extent.y_tiles {
            return Err(PyramidError::OutOfRange {
                layer,
                x,
                y,
                x_tiles: extent.x_tiles,
                y_tiles: extent.y_tiles,
            });
        }
        let id = u64::from(y) * u64::from(extent.x_tiles) + u64::from(x);
        TileIndex::try_from(id).map_err(|_| PyramidError::TileOutOfRange {
            layer,
            tile: TileIndex::MAX,
            count: extent.tile_count(),
        })
    }

    /// Cache key of tile `(x, y)` in `layer`.
    pub fn tile_key(&self, layer: LayerIndex, x: u32, y: u32) -> Result<TileKey, PyramidError> {
        self.tile_id(layer, x, y).map(|tile| TileKey::new(layer, tile))
    }

    /// Grid coordinates `(x, y)` of a tile identifier.
    pub fn tile_coords(&self, layer: LayerIndex, tile: TileIndex) -> Result<(u32, u32), PyramidError> {
        let extent = self.layer(layer)?;
        if u64::from(tile) >= extent.tile_count() {
            return Err(PyramidError::TileOutOfRange {
                layer,
                tile,
                count: extent.tile_count(),
            });
        }
        Ok((tile % extent.x_tiles, tile / extent.x_tiles))
    }

    pub fn scale(&self, layer: LayerIndex) -> Result<f32, PyramidError> {
        self.layer(layer).map(|l| l.scale)
    }

    pub fn downsample(&self, layer: LayerIndex) -> Result<f32, PyramidError> {
        self.layer(layer).map(|l| l.downsample)
    }

    /// Most detailed layer whose downsample is still at least `downsample`.
    ///
    /// Falls back to layer 0 when every layer is more detailed than asked.
    pub fn best_layer_for_downsample(&self, downsample: f32) -> LayerIndex {
        self.layers
            .iter()
            .rposition(|layer| layer.downsample >= downsample)
            .unwrap_or(0) as LayerIndex
    }
}

// =============================================================================
// Tests
// =============================================================================
