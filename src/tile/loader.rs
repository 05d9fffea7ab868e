//! Tile loading seam.
//!
//! Decoding tiles out of a slide file is the job of an external codec. The
//! cache only needs something that turns a [`TileKey`] into a decoded
//! [`Buffer`], which is what [`TileLoader`] describes.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader, Rgb, RgbImage};

use crate::buffer::Buffer;
use crate::error::LoadError;
use crate::pyramid::{Extent, TileKey, TILE_SIZE};

/// Trait for decoding tiles on behalf of the scheduler.
///
/// Implementations must be thread-safe: the scheduler calls `load_tile` from
/// several worker tasks at once.
#[async_trait]
pub trait TileLoader: Send + Sync + 'static {
    /// Decode the tile at `key` into a buffer.
    ///
    /// Returning a weak buffer over memory the loader already holds keeps
    /// the hand-off zero-copy.
    async fn load_tile(&self, key: TileKey) -> Result<Buffer, LoadError>;
}

#[async_trait]
impl<L: TileLoader + ?Sized> TileLoader for Arc<L> {
    async fn load_tile(&self, key: TileKey) -> Result<Buffer, LoadError> {
        (**self).load_tile(key).await
    }
}

// =============================================================================
// Synthetic Loader
// =============================================================================

/// Default JPEG quality for the synthetic source tile.
const SYNTHETIC_JPEG_QUALITY: u8 = 80;

/// Loader that decodes a generated JPEG tile for every key.
///
/// It stands in for a slide codec in the CLI simulation and in tests: every
/// request pays a real JPEG decode and yields a 256x256 RGBA buffer.
#[derive(Debug, Clone)]
pub struct SyntheticLoader {
    extent: Arc<Extent>,
    source: Bytes,
}

impl SyntheticLoader {
    /// Create a loader for tiles of `extent`.
    pub fn new(extent: Arc<Extent>) -> Result<Self, LoadError> {
        Ok(Self {
            extent,
            source: encode_gradient_tile()?,
        })
    }

    /// The encoded JPEG every tile is decoded from.
    pub fn source_jpeg(&self) -> &Bytes {
        &self.source
    }
}

#[async_trait]
impl TileLoader for SyntheticLoader {
    async fn load_tile(&self, key: TileKey) -> Result<Buffer, LoadError> {
        self.extent.tile_coords(key.layer, key.tile)?;

        let source = self.source.clone();
        tokio::task::spawn_blocking(move || decode_rgba(&source))
            .await
            .map_err(|e| LoadError::Decode(e.to_string()))?
    }
}

/// Decode a JPEG into an owned RGBA buffer without an extra copy.
pub fn decode_rgba(jpeg: &[u8]) -> Result<Buffer, LoadError> {
    let reader = ImageReader::with_format(Cursor::new(jpeg), ImageFormat::Jpeg);
    let image = reader
        .decode()
        .map_err(|e| LoadError::Decode(e.to_string()))?;
    Ok(Buffer::from(image.into_rgba8().into_raw()))
}

fn encode_gradient_tile() -> Result<Bytes, LoadError> {
    let image = RgbImage::from_fn(TILE_SIZE, TILE_SIZE, |x, y| {
        Rgb([x as u8, y as u8, ((x + y) / 2) as u8])
    });

    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, SYNTHETIC_JPEG_QUALITY)
        .encode_image(&image)
        .map_err(|e| LoadError::Decode(e.to_string()))?;
    Ok(Bytes::from(output))
}
