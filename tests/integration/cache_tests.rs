//! Tile cache integration tests.
//!
//! Tests verify:
//! - LRU eviction order under lookups
//! - The READY bound holds while tiles stream in through the scheduler
//! - Concurrent requests never decode a tile twice
//! - Blocked consumers observe READY after a completion

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use wsi_tile_plane::pyramid::TileKey;
use wsi_tile_plane::tile::{
    BeginLoad, Lookup, Notification, Request, TileCache, WaitOutcome,
};
use wsi_tile_plane::Buffer;

use super::test_utils::{eventually, open_slide, tile_bytes, wait_ready, MockLoader};

fn load(cache: &TileCache, key: TileKey) {
    match cache.begin_load(key) {
        BeginLoad::Ticket(ticket) => {
            assert!(cache.complete_load(ticket, Buffer::copy_from(&tile_bytes(key)).unwrap()));
        }
        other => panic!("expected ticket for {}, got {:?}", key, other),
    }
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_touched_tile_survives_eviction() {
    let cache = TileCache::with_capacity(2);
    let (a, b, c) = (TileKey::new(0, 0), TileKey::new(0, 1), TileKey::new(0, 2));

    load(&cache, a);
    load(&cache, b);
    assert!(cache.lookup(a).is_ready());
    load(&cache, c);

    assert!(cache.lookup(a).is_ready());
    assert!(matches!(cache.lookup(b), Lookup::Evicted));
    assert!(cache.lookup(c).is_ready());
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_oldest_tiles_evicted_first() {
    let capacity = 5;
    let extra = 3;
    let cache = TileCache::with_capacity(capacity);

    for tile in 0..(capacity + extra) as u32 {
        load(&cache, TileKey::new(2, tile));
    }

    for tile in 0..extra as u32 {
        assert!(matches!(cache.peek(TileKey::new(2, tile)), Lookup::Evicted));
    }
    for tile in extra as u32..(capacity + extra) as u32 {
        assert!(cache.peek(TileKey::new(2, tile)).is_ready());
    }
    assert_eq!(cache.stats().evictions, extra as u64);
}

#[tokio::test]
async fn test_capacity_bound_through_scheduler() {
    let loader = Arc::new(MockLoader::new());
    let slide = open_slide(loader.clone(), 8, None);

    // Layer 3 has 8x8 tiles
    for y in 0..4 {
        for x in 0..8 {
            slide.request_tile(3, x, y).unwrap();
        }
    }
    eventually(|| slide.scheduler().outstanding() == 0).await;

    assert_eq!(loader.calls(), 32);
    assert_eq!(slide.cache().len(), 8);
    let stats = slide.stats();
    assert_eq!(stats.ready, 8);
    assert_eq!(stats.evictions, 24);
    assert_eq!(stats.pending, 0);
}

// =============================================================================
// At Most One In Flight
// =============================================================================

#[test]
fn test_begin_load_race_across_threads() {
    let cache = Arc::new(TileCache::with_capacity(16));
    let key = TileKey::new(4, 11);

    let racers: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.begin_load(key))
        })
        .collect();

    let mut tickets = Vec::new();
    let mut in_flight = 0;
    for racer in racers {
        match racer.join().unwrap() {
            BeginLoad::Ticket(ticket) => tickets.push(ticket),
            BeginLoad::InFlight => in_flight += 1,
            BeginLoad::Ready(_) => panic!("nothing was completed"),
        }
    }

    assert_eq!(tickets.len(), 1);
    assert_eq!(in_flight, 7);
    for ticket in tickets {
        cache.abort_ticket(ticket);
    }
}

#[tokio::test]
async fn test_concurrent_requests_decode_once() {
    let loader = Arc::new(MockLoader::new().with_delay(Duration::from_millis(20)));
    let slide = Arc::new(open_slide(loader.clone(), 16, None));
    let key = slide.extent().tile_key(5, 7, 9).unwrap();

    let requests: Vec<_> = (0..16)
        .map(|_| {
            let slide = slide.clone();
            tokio::spawn(async move { slide.request(key).unwrap() })
        })
        .collect();

    let mut dispatched = 0;
    for request in requests {
        if matches!(request.await.unwrap(), Request::Dispatched) {
            dispatched += 1;
        }
    }
    assert_eq!(dispatched, 1);

    let buffer = wait_ready(slide.cache(), key).await;
    assert_eq!(&*buffer.read_view(), tile_bytes(key).as_slice());
    assert_eq!(loader.calls_for(key), 1);
}

// =============================================================================
// Notification Liveness
// =============================================================================

#[test]
fn test_blocked_thread_sees_ready_tile() {
    let cache = Arc::new(TileCache::with_notification(
        4,
        Some(Arc::new(Notification::new())),
    ));
    let key = TileKey::new(1, 2);
    let BeginLoad::Ticket(ticket) = cache.begin_load(key) else {
        panic!("expected ticket");
    };

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.wait_for(key, Duration::from_secs(5)).unwrap())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    cache.complete_load(ticket, Buffer::copy_from(&tile_bytes(key)).unwrap());

    for waiter in waiters {
        match waiter.join().unwrap() {
            WaitOutcome::Ready(buffer) => {
                assert_eq!(&*buffer.read_view(), tile_bytes(key).as_slice())
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }
}

#[test]
fn test_unrelated_completion_does_not_satisfy_waiter() {
    let cache = Arc::new(TileCache::with_notification(
        4,
        Some(Arc::new(Notification::new())),
    ));
    let wanted = TileKey::new(1, 0);
    let other = TileKey::new(1, 1);
    let BeginLoad::Ticket(_pending) = cache.begin_load(wanted) else {
        panic!("expected ticket");
    };

    let waiter = {
        let cache = cache.clone();
        thread::spawn(move || cache.wait_for(wanted, Duration::from_millis(100)).unwrap())
    };

    thread::sleep(Duration::from_millis(10));
    load(&cache, other);

    assert!(matches!(waiter.join().unwrap(), WaitOutcome::TimedOut));
}
