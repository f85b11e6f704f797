//! Tile store integration tests.
//!
//! Tests verify:
//! - Pyramid metadata round-trips through the on-disk record
//! - `tiled` reflects the committed record and root tile
//! - Eviction sweeps honour dry-run mode and report consistently

use std::time::Duration;

use zoom_tiler::store::{media_hash, MetaValue, Metadata, TileStore};
use zoom_tiler::tile::TileId;

use super::test_utils::TestStore;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_metadata_round_trip_after_build() {
    let env = TestStore::new();
    env.build_gradient("scan", 321, 123, 100).unwrap();

    // A fresh store has no cached record and must read it from disk
    let reopened = TileStore::new(env.store.root());
    let pyramid = reopened.pyramid_metadata("scan").unwrap().unwrap();
    assert_eq!(pyramid.width, 321);
    assert_eq!(pyramid.height, 123);
    assert_eq!(pyramid.tilesize, 100);
    assert_eq!(pyramid.maxtilelevel, 2);
    assert_eq!(pyramid.filext, "png");

    assert_eq!(
        reopened.get_metadata("scan", "width").unwrap(),
        Some(MetaValue::Int(321))
    );
    assert_eq!(reopened.get_metadata("scan", "missing").unwrap(), None);
}

#[test]
fn test_custom_metadata_survives_reload() {
    let env = TestStore::new();
    let record = Metadata::new()
        .with("title", "tab\tand\nnewline")
        .with("pages", 3_i64)
        .with("dpi", 150.5);
    env.store.write_metadata("doc", &record).unwrap();

    let reopened = TileStore::new(env.store.root());
    let loaded = reopened.metadata("doc").unwrap().unwrap();
    assert_eq!(*loaded, record);
}

#[test]
fn test_layout_is_content_addressed() {
    let env = TestStore::new();
    env.build_gradient("a/b c", 10, 10, 8).unwrap();

    let media_dir = env.store.root().join(media_hash("a/b c"));
    assert_eq!(env.store.media_path("a/b c"), media_dir);
    assert!(media_dir.join("metadata").is_file());
    assert!(media_dir.join("01").join("000000_000001.png").is_file());
    assert!(media_dir.join("00").join("000000_000000.png").is_file());
}

#[test]
fn test_tiled_requires_root_tile() {
    let env = TestStore::new();
    assert!(!env.store.tiled("scan"));

    env.build_gradient("scan", 40, 40, 16).unwrap();
    assert!(env.store.tiled("scan"));

    let root = env
        .store
        .tile_path(&TileId::new("scan", 0, 0, 0), false, "", "png")
        .unwrap();
    std::fs::remove_file(root).unwrap();
    assert!(!env.store.tiled("scan"));

    env.store.remove_media("scan").unwrap();
    assert!(!env.store.media_path("scan").exists());
    assert!(env.store.metadata("scan").unwrap().is_none());
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_dry_run_predicts_real_sweep() {
    let env = TestStore::new();
    env.build_gradient("old-1", 20, 20, 16).unwrap();
    env.build_gradient("old-2", 20, 20, 16).unwrap();
    env.build_gradient("fresh", 20, 20, 16).unwrap();
    env.age_media("old-1", 10 * DAY);
    env.age_media("old-2", 12 * DAY);

    let preview = env.store.sweep(3 * DAY, true);
    assert!(preview.dry_run);
    assert_eq!(preview.deleted.len(), 2);
    assert_eq!(preview.kept, 1);
    assert!(preview.errors.is_empty());
    for path in &preview.deleted {
        assert!(path.exists(), "dry run deleted {}", path.display());
    }

    // Running the preview again changes nothing
    let again = env.store.sweep(3 * DAY, true);
    assert_eq!(again.deleted, preview.deleted);

    let real = env.store.sweep(3 * DAY, false);
    assert!(!real.dry_run);
    let mut predicted = preview.deleted.clone();
    let mut deleted = real.deleted.clone();
    predicted.sort();
    deleted.sort();
    assert_eq!(deleted, predicted);
    assert_eq!(real.bytes_freed, preview.bytes_freed);
    assert_eq!(real.bytes_kept, preview.bytes_kept);

    assert!(!env.store.media_path("old-1").exists());
    assert!(!env.store.media_path("old-2").exists());
    assert!(env.store.tiled("fresh"));
}

#[test]
fn test_sweep_of_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    let store = TileStore::new(dir.path().join("never-created"));

    let report = store.sweep(DAY, false);
    assert!(report.deleted.is_empty());
    assert_eq!(report.kept, 0);
}
