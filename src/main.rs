//! WSI Tiles - drive the tile data plane from the command line.
//!
//! `simulate` zooms a synthetic slide from its coarsest to its most detailed
//! layer, requesting a viewport of tiles at every step, and prints the cache
//! statistics. `extent` prints pyramid geometry.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tile_plane::{
    config::{Cli, Command, ExtentConfig, SimulateConfig},
    pyramid::{Extent, LayerIndex, TileKey},
    slide::{Slide, SlideHost, SlideOpenConfig},
    tile::{CacheStats, LiveLayer, Notification, Request, SyntheticLoader, WaitOutcome},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Simulate(config) => run_simulate(config).await,
        Command::Extent(config) => run_extent(config),
    }
}

// =============================================================================
// Simulate Command
// =============================================================================

/// Summary printed at the end of a simulation.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    layers_visited: u32,
    requested: u64,
    served_from_cache: u64,
    dispatched: u64,
    in_flight: u64,
    stale: u64,
    ready: u64,
    timed_out: u64,
    cleared: u64,
    abandoned: u64,
    pruned: u64,
    elapsed_ms: u128,
    cache: CacheStats,
}

async fn run_simulate(config: SimulateConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let extent = match config.pyramid.extent() {
        Ok(extent) => extent,
        Err(e) => {
            error!("Invalid pyramid: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let loader = match SyntheticLoader::new(Arc::new(extent.clone())) {
        Ok(loader) => Arc::new(loader),
        Err(e) => {
            error!("Failed to prepare synthetic tiles: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let live = Arc::new(LiveLayer::new(0));
    let mut open_config = SlideOpenConfig {
        capacity: config.capacity,
        workers: config.workers,
        ..Default::default()
    }
    .with_notification(Arc::new(Notification::new()));
    if !config.no_filter {
        open_config = open_config.with_live_layer(live.clone());
    }

    info!("Configuration:");
    info!(
        "  Slide: {}x{} px, {} layers",
        config.pyramid.width, config.pyramid.height, config.pyramid.layers
    );
    info!(
        "  Cache: {} tiles, {} workers",
        config.capacity, config.workers
    );
    if config.no_filter {
        warn!("  Stale filter: DISABLED - every requested layer is decoded");
    }

    let host = SlideHost::new();
    let slide = match host.open(extent, loader, open_config) {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open slide: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let timeout = Duration::from_millis(config.timeout_ms);
    let started = Instant::now();
    let mut report = SimulationReport::default();

    let layer_count = slide.extent().layer_count() as LayerIndex;
    for hr in 0..layer_count {
        live.set(hr);
        report.pruned += slide.prune_stale() as u64;
        report.layers_visited += 1;

        // The renderer still asks for the layers it is leaving behind.
        let mut waiting = Vec::new();
        for layer in hr.saturating_sub(2)..=hr {
            for key in viewport_keys(slide.extent(), layer, config.viewport) {
                report.requested += 1;
                match slide.scheduler().request(key) {
                    Request::Ready(_) => report.served_from_cache += 1,
                    Request::Dispatched => {
                        report.dispatched += 1;
                        waiting.push(key);
                    }
                    Request::InFlight => {
                        report.in_flight += 1;
                        waiting.push(key);
                    }
                    Request::Stale => report.stale += 1,
                }
            }
        }

        for key in waiting {
            wait_tile(&slide, key, timeout, &mut report).await;
        }
        info!(layer = hr, ready = slide.cache().len(), "Zoom step complete");
    }

    report.elapsed_ms = started.elapsed().as_millis();
    report.cache = slide.stats();
    host.close();

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize report: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Wait for one tile and record the outcome.
async fn wait_tile(
    slide: &Slide<SyntheticLoader>,
    key: TileKey,
    timeout: Duration,
    report: &mut SimulationReport,
) {
    match tokio::time::timeout(timeout, slide.wait_for_async(key)).await {
        Ok(Ok(WaitOutcome::Ready(_))) => report.ready += 1,
        Ok(Ok(WaitOutcome::Cleared)) => report.cleared += 1,
        Ok(Ok(WaitOutcome::Abandoned)) => {
            debug!(tile = %key, "Tile load abandoned");
            report.abandoned += 1;
        }
        Ok(Ok(WaitOutcome::TimedOut)) | Err(_) => {
            warn!(tile = %key, "Timed out waiting for tile");
            report.timed_out += 1;
        }
        Ok(Err(e)) => {
            error!(tile = %key, "Cannot wait for tile: {}", e);
            report.timed_out += 1;
        }
    }
}

/// Keys of a centred `side` x `side` window of tiles on `layer`.
fn viewport_keys(extent: &Extent, layer: LayerIndex, side: u32) -> Vec<TileKey> {
    let Ok(geometry) = extent.layer(layer) else {
        return Vec::new();
    };

    let width = side.min(geometry.x_tiles);
    let height = side.min(geometry.y_tiles);
    let x0 = (geometry.x_tiles - width) / 2;
    let y0 = (geometry.y_tiles - height) / 2;

    (y0..y0 + height)
        .flat_map(|y| (x0..x0 + width).map(move |x| (x, y)))
        .filter_map(|(x, y)| extent.tile_key(layer, x, y).ok())
        .collect()
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tile_plane=debug,wsi_tiles=debug"
    } else {
        "wsi_tile_plane=info,wsi_tiles=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Extent Command
// =============================================================================

fn run_extent(config: ExtentConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let extent = match config.pyramid.extent() {
        Ok(extent) => extent,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let json = if config.compact {
        serde_json::to_string(&extent)
    } else {
        serde_json::to_string_pretty(&extent)
    };

    match json {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
