//! Load scheduler integration tests.
//!
//! Tests verify:
//! - Requests for stale layers never reach the cache or the loader
//! - Zooming prunes queued work for layers left behind
//! - Failed decodes leave the tile retryable

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use wsi_tile_plane::pyramid::TileKey;
use wsi_tile_plane::tile::{LiveLayer, Lookup, Request, WaitOutcome};

use super::test_utils::{eventually, open_slide, tile_bytes, wait_ready, MockLoader};

#[tokio::test]
async fn test_stale_layer_never_begins_load() {
    let live = Arc::new(LiveLayer::new(5));
    let loader = Arc::new(MockLoader::new());
    let slide = open_slide(loader.clone(), 64, Some(live));

    let stale = slide.extent().tile_key(2, 1, 1).unwrap();
    assert!(matches!(slide.request(stale).unwrap(), Request::Stale));
    assert!(matches!(slide.cache().peek(stale), Lookup::Absent));
    assert!(slide.cache().pending_keys().is_empty());

    let coarse = slide.extent().tile_key(4, 3, 3).unwrap();
    let fine = slide.extent().tile_key(5, 6, 6).unwrap();
    assert!(matches!(slide.request(coarse).unwrap(), Request::Dispatched));
    assert!(matches!(slide.request(fine).unwrap(), Request::Dispatched));

    wait_ready(slide.cache(), coarse).await;
    wait_ready(slide.cache(), fine).await;
    assert_eq!(loader.layers_loaded(), vec![4, 5]);
}

#[tokio::test]
async fn test_finer_layer_than_live_is_stale() {
    let live = Arc::new(LiveLayer::new(2));
    let loader = Arc::new(MockLoader::new());
    let slide = open_slide(loader.clone(), 64, Some(live));

    assert!(matches!(slide.request_tile(3, 0, 0).unwrap(), Request::Stale));
    assert!(matches!(slide.request_tile(0, 0, 0).unwrap(), Request::Stale));
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn test_cached_stale_tile_still_served() {
    let live = Arc::new(LiveLayer::new(1));
    let loader = Arc::new(MockLoader::new());
    let slide = open_slide(loader.clone(), 64, Some(live.clone()));

    let key = slide.extent().tile_key(1, 1, 0).unwrap();
    slide.request(key).unwrap();
    wait_ready(slide.cache(), key).await;

    // Zoomed far in: the tile is stale but already decoded
    live.set(5);
    match slide.request(key).unwrap() {
        Request::Ready(buffer) => assert_eq!(&*buffer.read_view(), tile_bytes(key).as_slice()),
        other => panic!("expected cached tile, got {:?}", other),
    }
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_zoom_prunes_queued_loads() {
    let gate = Arc::new(Semaphore::new(0));
    let live = Arc::new(LiveLayer::new(3));
    let loader = Arc::new(MockLoader::new().with_gate(gate.clone()));
    let slide = open_slide(loader.clone(), 256, Some(live.clone()));

    // Layer 3 is 8x8; four workers block in the loader, the rest queue
    for x in 0..8 {
        slide.request_tile(3, x, 0).unwrap();
    }
    eventually(|| loader.calls() == 4).await;
    assert_eq!(slide.cache().pending_keys().len(), 8);

    live.set(5);
    let pruned = slide.prune_stale();
    assert_eq!(pruned, 8);
    assert!(slide.cache().pending_keys().is_empty());

    gate.add_permits(8);
    eventually(|| slide.scheduler().outstanding() == 0).await;

    // Queued loads were skipped; running ones still landed
    assert_eq!(loader.calls(), 4);
    assert_eq!(slide.cache().len(), 4);
}

#[tokio::test]
async fn test_failed_load_is_retryable() {
    let broken = TileKey::new(1, 0);
    let loader = Arc::new(MockLoader::new().with_failure(broken));
    let slide = open_slide(loader.clone(), 16, None);

    assert!(matches!(slide.request(broken).unwrap(), Request::Dispatched));
    eventually(|| slide.scheduler().outstanding() == 0).await;
    assert!(matches!(slide.cache().peek(broken), Lookup::Absent));
    assert_eq!(slide.stats().failures, 1);

    assert!(matches!(slide.request(broken).unwrap(), Request::Dispatched));
    eventually(|| slide.scheduler().outstanding() == 0).await;
    assert_eq!(loader.calls_for(broken), 2);
}

#[tokio::test]
async fn test_workers_bound_concurrency() {
    let gate = Arc::new(Semaphore::new(0));
    let loader = Arc::new(MockLoader::new().with_gate(gate.clone()));
    let slide = open_slide(loader.clone(), 64, None);

    for tile in 0..16 {
        slide.request(TileKey::new(2, tile)).unwrap();
    }
    eventually(|| loader.calls() == 4).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(loader.calls(), 4);

    gate.add_permits(16);
    eventually(|| slide.scheduler().outstanding() == 0).await;
    assert_eq!(loader.calls(), 16);
    assert_eq!(slide.cache().len(), 16);
}

#[tokio::test]
async fn test_wait_ends_after_failed_load() {
    let broken = TileKey::new(2, 3);
    let loader = Arc::new(
        MockLoader::new()
            .with_failure(broken)
            .with_delay(Duration::from_millis(20)),
    );
    let slide = open_slide(loader, 16, None);

    assert!(matches!(slide.request(broken).unwrap(), Request::Dispatched));
    let outcome = tokio::time::timeout(Duration::from_secs(5), slide.wait_for_async(broken))
        .await
        .expect("wait did not end after the decode failed")
        .unwrap();

    assert!(matches!(outcome, WaitOutcome::Abandoned));
    assert!(matches!(slide.cache().peek(broken), Lookup::Absent));
}

#[tokio::test]
async fn test_wait_ends_after_prune() {
    let gate = Arc::new(Semaphore::new(0));
    let live = Arc::new(LiveLayer::new(3));
    let loader = Arc::new(MockLoader::new().with_gate(gate.clone()));
    let slide = Arc::new(open_slide(loader, 16, Some(live.clone())));

    let key = slide.extent().tile_key(3, 2, 2).unwrap();
    slide.request(key).unwrap();

    let waiter = {
        let slide = slide.clone();
        tokio::spawn(async move { slide.wait_for_async(key).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    live.set(5);
    assert_eq!(slide.prune_stale(), 1);

    let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("wait did not end after the prune")
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, WaitOutcome::Abandoned));

    gate.add_permits(1);
}

#[test]
fn test_blocking_wait_without_deadline_on_ready_tile() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let loader = Arc::new(MockLoader::new());
    let slide = runtime.block_on(async { open_slide(loader, 16, None) });

    let key = TileKey::new(1, 2);
    slide.request(key).unwrap();
    runtime.block_on(wait_ready(slide.cache(), key));

    let outcome = slide.wait_for(key, Duration::MAX).unwrap();
    assert!(matches!(outcome, WaitOutcome::Ready(_)));
}
