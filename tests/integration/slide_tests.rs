//! Slide session integration tests.
//!
//! Tests verify:
//! - Replacing the active slide wakes waiters of the old one
//! - Decodes finishing after a close are discarded
//! - The synthetic loader produces full RGBA tiles end to end

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use wsi_tile_plane::pyramid::{Extent, TileKey, RGBA_TILE_BYTES};
use wsi_tile_plane::slide::{Slide, SlideHost, SlideOpenConfig};
use wsi_tile_plane::tile::{LiveLayer, Lookup, Notification, SyntheticLoader, WaitOutcome};

use super::test_utils::{eventually, test_extent, wait_ready, MockLoader};

fn config() -> SlideOpenConfig {
    SlideOpenConfig::default().with_notification(Arc::new(Notification::new()))
}

#[tokio::test]
async fn test_replacing_slide_wakes_waiters() {
    let gate = Arc::new(Semaphore::new(0));
    let loader = Arc::new(MockLoader::new().with_gate(gate.clone()));
    let host = SlideHost::new();

    let old = host.open(test_extent(), loader.clone(), config()).unwrap();
    let key = TileKey::new(2, 5);
    old.request(key).unwrap();
    eventually(|| loader.calls() == 1).await;

    let waiter = {
        let old = old.clone();
        tokio::spawn(async move { old.wait_for_async(key).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let new = host
        .open(test_extent(), Arc::new(MockLoader::new()), config())
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, WaitOutcome::Cleared));

    // The decode for the old slide finishes after the close
    gate.add_permits(1);
    eventually(|| old.scheduler().outstanding() == 0).await;
    assert!(matches!(old.cache().peek(key), Lookup::Absent));
    assert_eq!(old.stats().discarded, 1);

    assert!(matches!(new.cache().peek(key), Lookup::Absent));
}

#[tokio::test]
async fn test_close_then_reopen() {
    let host = SlideHost::new();
    let loader = Arc::new(MockLoader::new());

    let slide = host.open(test_extent(), loader.clone(), config()).unwrap();
    let key = TileKey::new(0, 0);
    slide.request(key).unwrap();
    wait_ready(slide.cache(), key).await;

    assert!(host.close());
    assert!(host.active().is_none());
    assert!(slide.cache().is_empty());

    let reopened = host.open(test_extent(), loader.clone(), config()).unwrap();
    reopened.request(key).unwrap();
    wait_ready(reopened.cache(), key).await;
    assert_eq!(loader.calls_for(key), 2);
}

#[tokio::test]
async fn test_synthetic_zoom_session() {
    let extent = Extent::from_scales(256, 256, &[1.0, 2.0, 4.0]).unwrap();
    let loader = Arc::new(SyntheticLoader::new(Arc::new(extent.clone())).unwrap());
    let live = Arc::new(LiveLayer::new(0));
    let slide = Slide::open(extent, loader, config().with_live_layer(live.clone())).unwrap();

    for layer in 0..3u32 {
        live.set(layer);
        slide.prune_stale();

        let geometry = slide.extent().layer(layer).unwrap().clone();
        let mut keys = Vec::new();
        for y in 0..geometry.y_tiles {
            for x in 0..geometry.x_tiles {
                slide.request_tile(layer, x, y).unwrap();
                keys.push(slide.extent().tile_key(layer, x, y).unwrap());
            }
        }
        for key in keys {
            let buffer = wait_ready(slide.cache(), key).await;
            assert_eq!(buffer.size(), RGBA_TILE_BYTES);
        }
    }

    // 1 + 4 + 16 tiles decoded, all within capacity
    let stats = slide.stats();
    assert_eq!(stats.ready, 21);
    assert_eq!(stats.evictions, 0);
}
