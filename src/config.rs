//! Command-line configuration for the `wsi-tiles` binary.
//!
//! The binary has two subcommands:
//!
//! - `simulate` drives a synthetic zoom session through the tile data plane
//!   and prints the resulting cache statistics as JSON
//! - `extent` prints the pyramid geometry computed for a slide size
//!
//! # Environment Variables
//!
//! Every option can also be set through an environment variable with the
//! `WSI_TILES_` prefix:
//!
//! - `WSI_TILES_WIDTH` - Width of the most detailed layer in pixels (default: 16384)
//! - `WSI_TILES_HEIGHT` - Height of the most detailed layer in pixels (default: 12288)
//! - `WSI_TILES_LAYERS` - Number of pyramid layers (default: 6)
//! - `WSI_TILES_CAPACITY` - Max decoded tiles kept in memory (default: 1000)
//! - `WSI_TILES_WORKERS` - Concurrent decodes (default: 4)
//! - `WSI_TILES_VIEWPORT` - Viewport edge in tiles (default: 4)
//! - `WSI_TILES_TIMEOUT_MS` - Per-tile wait timeout (default: 5000)

use clap::{Args, Parser, Subcommand};

use crate::error::PyramidError;
use crate::pyramid::Extent;
use crate::tile::{DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_WORKER_COUNT};

// =============================================================================
// Default Values
// =============================================================================

/// Default width of the most detailed layer.
pub const DEFAULT_WIDTH: u32 = 16384;

/// Default height of the most detailed layer.
pub const DEFAULT_HEIGHT: u32 = 12288;

/// Default number of pyramid layers.
pub const DEFAULT_LAYERS: u32 = 6;

/// Largest supported pyramid depth.
pub const MAX_LAYERS: u32 = 20;

/// Default viewport edge length in tiles.
pub const DEFAULT_VIEWPORT_TILES: u32 = 4;

/// Default time to wait for a single tile.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Tiles - tile data plane for Whole Slide Image viewers.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a synthetic zoom session and report cache statistics.
    Simulate(SimulateConfig),

    /// Print the pyramid geometry for a slide size as JSON.
    Extent(ExtentConfig),
}

/// Slide geometry shared by all subcommands.
///
/// Each layer doubles the resolution of the one before it, ending at
/// `width` x `height` for the most detailed layer.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct PyramidArgs {
    /// Width of the most detailed layer in pixels.
    #[arg(long, default_value_t = DEFAULT_WIDTH, env = "WSI_TILES_WIDTH")]
    pub width: u32,

    /// Height of the most detailed layer in pixels.
    #[arg(long, default_value_t = DEFAULT_HEIGHT, env = "WSI_TILES_HEIGHT")]
    pub height: u32,

    /// Number of pyramid layers.
    #[arg(long, default_value_t = DEFAULT_LAYERS, env = "WSI_TILES_LAYERS")]
    pub layers: u32,
}

impl PyramidArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.layers == 0 || self.layers > MAX_LAYERS {
            return Err(format!("layers must be between 1 and {}", MAX_LAYERS));
        }
        Ok(())
    }

    /// Build the pyramid described by these arguments.
    pub fn extent(&self) -> Result<Extent, PyramidError> {
        let top = self.layers.saturating_sub(1);
        let factor = 1u32 << top;
        let scales: Vec<f32> = (0..self.layers).map(|layer| (1u32 << layer) as f32).collect();

        Extent::from_scales(
            self.width.div_ceil(factor),
            self.height.div_ceil(factor),
            &scales,
        )
    }
}

/// Options for the `simulate` subcommand.
#[derive(Args, Debug, Clone)]
pub struct SimulateConfig {
    #[command(flatten)]
    pub pyramid: PyramidArgs,

    /// Maximum number of decoded tiles kept in memory.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "WSI_TILES_CAPACITY")]
    pub capacity: usize,

    /// Maximum number of concurrent tile decodes.
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT, env = "WSI_TILES_WORKERS")]
    pub workers: usize,

    /// Edge length of the simulated viewport in tiles.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_TILES, env = "WSI_TILES_VIEWPORT")]
    pub viewport: u32,

    /// Milliseconds to wait for a single tile before giving up on it.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS, env = "WSI_TILES_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Disable stale-layer filtering.
    #[arg(long, default_value_t = false)]
    pub no_filter: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SimulateConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.pyramid.validate()?;

        if self.capacity == 0 {
            return Err("capacity must be greater than 0".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.viewport == 0 {
            return Err("viewport must be greater than 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Options for the `extent` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ExtentConfig {
    #[command(flatten)]
    pub pyramid: PyramidArgs,

    /// Print compact JSON instead of pretty-printed.
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

impl ExtentConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.pyramid.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
