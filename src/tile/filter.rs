//! Stale-layer filtering.
//!
//! The viewport controller publishes the layer currently rendered at full
//! detail through a [`LiveLayer`]. The [`StaleFilter`] reads it on every
//! dispatch decision and accepts only that layer and the one just coarser
//! (used as a progressive fallback while the detailed tile is loading).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::pyramid::LayerIndex;

/// Externally owned pointer to the high-resolution layer (`HR_index`).
///
/// One writer (the viewport controller), many readers.
#[derive(Debug, Default)]
pub struct LiveLayer {
    index: AtomicU32,
}

impl LiveLayer {
    pub fn new(layer: LayerIndex) -> Self {
        Self {
            index: AtomicU32::new(layer),
        }
    }

    pub fn get(&self) -> LayerIndex {
        self.index.load(Ordering::Acquire)
    }

    pub fn set(&self, layer: LayerIndex) {
        self.index.store(layer, Ordering::Release);
    }
}

/// Decides whether a tile request is still worth decoding.
#[derive(Debug, Clone, Default)]
pub struct StaleFilter {
    live: Option<Arc<LiveLayer>>,
}

impl StaleFilter {
    /// Filter against `live`; `None` accepts every layer.
    pub fn new(live: Option<Arc<LiveLayer>>) -> Self {
        Self { live }
    }

    /// A filter that accepts every layer.
    pub fn disabled() -> Self {
        Self { live: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.live.is_some()
    }

    /// Current high-resolution layer, if the filter is enabled.
    pub fn live_layer(&self) -> Option<LayerIndex> {
        self.live.as_ref().map(|live| live.get())
    }

    /// `true` if `layer` is the live layer or the one directly below it.
    pub fn accepts(&self, layer: LayerIndex) -> bool {
        match self.live_layer() {
            None => true,
            Some(live) => layer == live || layer.checked_add(1) == Some(live),
        }
    }
}
