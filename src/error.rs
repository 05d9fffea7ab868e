use thiserror::Error;

/// Errors raised by [`Buffer`](crate::buffer::Buffer) operations.
///
/// These are local to the caller: the buffer never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The backing allocation could not be obtained
    #[error("Allocation of {requested} bytes failed")]
    Allocation { requested: usize },

    /// A weak buffer was asked to write past its fixed capacity
    #[error("Buffer overflow: requested {requested} bytes, {remaining} remaining in weak buffer")]
    Overflow { requested: usize, remaining: usize },

    /// A size larger than the capacity was requested
    #[error("Invalid size {size}: capacity is {capacity}")]
    InvalidSize { size: usize, capacity: usize },

    /// The weak buffer wraps shared read-only bytes that cannot be written
    #[error("Buffer is read-only")]
    ReadOnly,
}

/// Errors raised by pyramid addressing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PyramidError {
    /// Tile coordinates fall outside the layer's tile grid
    #[error("Tile ({x}, {y}) out of range for layer {layer} ({x_tiles}x{y_tiles} tiles)")]
    OutOfRange {
        layer: u32,
        x: u32,
        y: u32,
        x_tiles: u32,
        y_tiles: u32,
    },

    /// Linear tile identifier past the end of the layer
    #[error("Tile id {tile} out of range for layer {layer} ({count} tiles)")]
    TileOutOfRange { layer: u32, tile: u32, count: u64 },

    /// Layer index past the end of the pyramid
    #[error("Layer {layer} out of range ({count} layers)")]
    LayerOutOfRange { layer: u32, count: usize },

    /// Extent violates the pyramid ordering or is empty
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),
}

/// Errors surfaced by a [`TileLoader`](crate::tile::TileLoader).
///
/// Any of these sends the cache entry back to absent so the tile can be
/// requested again.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The external decoder rejected the tile
    #[error("Decode error: {0}")]
    Decode(String),

    /// The loader addressed a tile outside the pyramid
    #[error("Pyramid error: {0}")]
    Pyramid(#[from] PyramidError),

    /// The decoded payload could not be placed in a buffer
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

/// Errors raised by tile cache waits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The cache was opened without a notification, so nothing can be awaited
    #[error("No notification configured: poll with lookup instead")]
    NoNotification,
}

/// Errors raised when opening or addressing a slide session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlideError {
    /// The open configuration was rejected
    #[error("Invalid slide configuration: {0}")]
    InvalidConfig(String),

    /// The slide's pyramid is malformed or a request left it
    #[error("Pyramid error: {0}")]
    Pyramid(#[from] PyramidError),
}
