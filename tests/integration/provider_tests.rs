//! Tile provider integration tests.
//!
//! Tests verify:
//! - Tiles of a finished pyramid are served through the cache
//! - Requests for unknown media resolve to nothing
//! - Removing media from the cache forces a reload

use std::sync::Arc;
use std::time::Duration;

use zoom_tiler::tile::{StoreTileSource, TileCache, TileId, TileProvider};

use super::test_utils::{gradient_pixel, TestStore};

fn provider_for(env: &TestStore) -> TileProvider {
    let source = Arc::new(StoreTileSource::new(Arc::clone(&env.store)));
    TileProvider::new(source, Arc::new(TileCache::new()))
}

#[tokio::test]
async fn test_requested_tiles_arrive_in_cache() {
    let env = TestStore::new();
    env.build_gradient("view", 100, 70, 32).unwrap();
    let provider = provider_for(&env);
    let mut loaded = provider.subscribe();

    let ids = [
        TileId::new("view", 2, 0, 0),
        TileId::new("view", 2, 2, 3),
        TileId::new("view", 0, 0, 0),
    ];
    for id in &ids {
        assert!(provider.request(id).await.is_none());
    }

    let mut arrived = Vec::new();
    while arrived.len() < ids.len() {
        let id = tokio::time::timeout(Duration::from_secs(10), loaded.recv())
            .await
            .unwrap()
            .unwrap();
        arrived.push(id);
    }
    arrived.sort();
    let mut expected = ids.to_vec();
    expected.sort();
    assert_eq!(arrived, expected);

    let corner = provider.request(&ids[1]).await.unwrap();
    assert_eq!(corner.size(), (4, 6));
    assert_eq!(corner.pixel(3, 5), gradient_pixel(99, 69));

    assert_eq!(provider.cache().len().await, 3);
    provider.shutdown().await;
}

#[tokio::test]
async fn test_unknown_media_is_absent() {
    let env = TestStore::new();
    let provider = provider_for(&env);

    let tile = provider.fetch(&TileId::new("nothing", 0, 0, 0)).await.unwrap();
    assert!(tile.is_none());
    assert!(provider.cache().is_empty().await);
    provider.shutdown().await;
}

#[tokio::test]
async fn test_cache_eviction_by_media() {
    let env = TestStore::new();
    env.build_gradient("one", 40, 40, 32).unwrap();
    env.build_gradient("two", 40, 40, 32).unwrap();
    let provider = provider_for(&env);

    for media in ["one", "two"] {
        provider.fetch(&TileId::new(media, 1, 0, 0)).await.unwrap().unwrap();
        provider.fetch(&TileId::new(media, 0, 0, 0)).await.unwrap().unwrap();
    }
    assert_eq!(provider.cache().len().await, 4);

    provider.cache().remove_media("one").await;
    assert_eq!(provider.cache().len().await, 2);
    assert!(!provider.cache().contains(&TileId::new("one", 0, 0, 0)).await);
    assert!(provider.cache().contains(&TileId::new("two", 0, 0, 0)).await);
    provider.shutdown().await;
}
