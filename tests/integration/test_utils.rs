//! Test utilities for integration tests.
//!
//! This module provides a mock tile loader that records every call, and
//! helpers for building slides and waiting on tiles.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use wsi_tile_plane::error::LoadError;
use wsi_tile_plane::pyramid::{Extent, TileKey};
use wsi_tile_plane::slide::{Slide, SlideOpenConfig};
use wsi_tile_plane::tile::{LiveLayer, Notification, TileCache, TileLoader, WaitOutcome};
use wsi_tile_plane::Buffer;

// =============================================================================
// Mock Loader with Call Tracking
// =============================================================================

/// A mock tile loader that tracks all load calls.
///
/// Each tile decodes to [`tile_bytes`] for its key, so tests can check that
/// the right payload landed in the right entry.
#[derive(Default)]
pub struct MockLoader {
    calls: AtomicUsize,
    per_key: Mutex<HashMap<TileKey, usize>>,
    delay: Duration,
    failing: HashSet<TileKey>,
    gate: Option<Arc<Semaphore>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every load.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every load of `key`.
    pub fn with_failure(mut self, key: TileKey) -> Self {
        self.failing.insert(key);
        self
    }

    /// Block every load until a permit is added to `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, key: TileKey) -> usize {
        self.per_key.lock().get(&key).copied().unwrap_or(0)
    }

    /// Layers that reached the loader, sorted and deduplicated.
    pub fn layers_loaded(&self) -> Vec<u32> {
        let mut layers: Vec<u32> = self.per_key.lock().keys().map(|key| key.layer).collect();
        layers.sort_unstable();
        layers.dedup();
        layers
    }
}

#[async_trait]
impl TileLoader for MockLoader {
    async fn load_tile(&self, key: TileKey) -> Result<Buffer, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.per_key.lock().entry(key).or_insert(0) += 1;

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.contains(&key) {
            return Err(LoadError::Decode(format!("corrupt tile {}", key)));
        }
        Ok(Buffer::copy_from(&tile_bytes(key))?)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Payload the mock loader produces for `key`.
pub fn tile_bytes(key: TileKey) -> Vec<u8> {
    let mut bytes = key.layer.to_le_bytes().to_vec();
    bytes.extend_from_slice(&key.tile.to_le_bytes());
    bytes
}

/// A six-layer pyramid whose most detailed layer is 8192x8192 pixels.
pub fn test_extent() -> Extent {
    Extent::from_scales(256, 256, &[1.0, 2.0, 4.0, 8.0, 16.0, 32.0]).unwrap()
}

/// Open a slide over [`test_extent`] with a notification attached.
pub fn open_slide(
    loader: Arc<MockLoader>,
    capacity: usize,
    live: Option<Arc<LiveLayer>>,
) -> Slide<MockLoader> {
    let mut config = SlideOpenConfig {
        capacity,
        workers: 4,
        ..Default::default()
    }
    .with_notification(Arc::new(Notification::new()));
    config.live_layer = live;

    Slide::open(test_extent(), loader, config).unwrap()
}

/// Wait up to five seconds for `key` to become READY.
pub async fn wait_ready(cache: &TileCache, key: TileKey) -> Buffer {
    let outcome = tokio::time::timeout(Duration::from_secs(5), cache.wait_for_async(key))
        .await
        .expect("timed out waiting for tile")
        .expect("cache has no notification");

    match outcome {
        WaitOutcome::Ready(buffer) => buffer,
        other => panic!("expected ready tile, got {:?}", other),
    }
}

/// Poll until `predicate` holds or five seconds pass.
pub async fn eventually(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
