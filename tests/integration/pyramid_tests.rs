//! Pyramid build integration tests.
//!
//! Tests verify:
//! - Level counts and tile counts for known image sizes
//! - Every tile implied by the grid exists with the right dimensions
//! - Tile pixels match the source at native and coarser levels
//! - Failed builds leave nothing behind

use zoom_tiler::error::{BuildError, RasterError};
use zoom_tiler::job::JobProgress;
use zoom_tiler::pyramid::{build_pyramid, max_tile_level, BuildOptions, PyramidGeometry};
use zoom_tiler::tile::{Tile, TileId};

use super::test_utils::{
    count_files, gradient_pixel, write_gradient_raster, write_truncated_raster, TestStore,
};

fn open_tile(env: &TestStore, id: &TileId) -> Tile {
    let path = env.store.tile_path(id, false, "", "png").unwrap();
    Tile::open(&path).unwrap()
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn test_square_two_by_two_pyramid() {
    let env = TestStore::new();
    let metadata = env.build_gradient("square", 512, 512, 256).unwrap();

    assert_eq!(metadata.maxtilelevel, 1);
    // 4 tiles at level 1, 1 at level 0, plus the metadata record
    assert_eq!(count_files(&env.store.media_path("square")), 5 + 1);
}

#[test]
fn test_wide_image_levels() {
    let env = TestStore::new();
    let metadata = env.build_gradient("wide", 1000, 500, 256).unwrap();
    assert_eq!(metadata.maxtilelevel, 2);

    let geometry = PyramidGeometry::from_metadata(&metadata).unwrap();
    assert_eq!(geometry.grid_size(2), (4, 2));
    assert_eq!(geometry.grid_size(1), (2, 1));
    assert_eq!(geometry.grid_size(0), (1, 1));

    let root = open_tile(&env, &TileId::new("wide", 0, 0, 0));
    assert_eq!(root.size(), (250, 125));
}

#[test]
fn test_single_tile_image() {
    let env = TestStore::new();
    let metadata = env.build_gradient("exact", 64, 64, 64).unwrap();

    assert_eq!(metadata.maxtilelevel, 0);
    assert_eq!(count_files(&env.store.media_path("exact")), 1 + 1);
    let tile = open_tile(&env, &TileId::new("exact", 0, 0, 0));
    assert_eq!(tile.size(), (64, 64));
}

#[test]
fn test_one_pixel_overhang() {
    let env = TestStore::new();
    let metadata = env.build_gradient("overhang", 65, 65, 64).unwrap();
    assert_eq!(metadata.maxtilelevel, 1);

    let corner = open_tile(&env, &TileId::new("overhang", 1, 1, 1));
    assert_eq!(corner.size(), (1, 1));
    assert_eq!(corner.pixel(0, 0), gradient_pixel(64, 64));

    let right = open_tile(&env, &TileId::new("overhang", 1, 0, 1));
    assert_eq!(right.size(), (1, 64));

    let root = open_tile(&env, &TileId::new("overhang", 0, 0, 0));
    assert_eq!(root.size(), (33, 33));
}

#[test]
fn test_every_grid_tile_is_stored() {
    let env = TestStore::new();
    let metadata = env.build_gradient("grid", 300, 130, 64).unwrap();
    assert_eq!(metadata.maxtilelevel, max_tile_level(300, 130, 64));

    let geometry = PyramidGeometry::from_metadata(&metadata).unwrap();
    let mut stored = 0;
    for id in geometry.tile_ids("grid") {
        let tile = open_tile(&env, &id);
        assert_eq!(
            tile.size(),
            geometry.tile_dimensions(id.level, id.row, id.column),
            "tile {}",
            id
        );
        stored += 1;
    }
    assert_eq!(stored as u64, geometry.total_tile_count());
    assert_eq!(count_files(&env.store.media_path("grid")), stored + 1);
}

// =============================================================================
// Content
// =============================================================================

#[test]
fn test_native_tiles_match_source() {
    let env = TestStore::new();
    env.build_gradient("content", 200, 150, 64).unwrap();

    // Level 2 is native for 200x150 at 64px tiles
    let tile = open_tile(&env, &TileId::new("content", 2, 1, 2));
    assert_eq!(tile.size(), (64, 64));
    assert_eq!(tile.pixel(0, 0), gradient_pixel(128, 64));
    assert_eq!(tile.pixel(5, 7), gradient_pixel(133, 71));

    let edge = open_tile(&env, &TileId::new("content", 2, 2, 3));
    assert_eq!(edge.size(), (8, 22));
    assert_eq!(edge.pixel(7, 21), gradient_pixel(199, 149));
}

#[test]
fn test_coarse_tiles_sample_source() {
    let env = TestStore::new();
    env.build_gradient("coarse", 128, 128, 64).unwrap();

    // Level 0 halves the merged 128x128 image with a nearest filter
    let root = open_tile(&env, &TileId::new("coarse", 0, 0, 0));
    assert_eq!(root.size(), (64, 64));
    let [r, g, _] = root.pixel(0, 0);
    assert!(r <= 1 && g <= 1);
    let [r, g, _] = root.pixel(40, 20);
    assert!((79..=81).contains(&r), "red {}", r);
    assert!((39..=41).contains(&g), "green {}", g);
}

// =============================================================================
// Failure Cleanup
// =============================================================================

#[test]
fn test_truncated_input_leaves_nothing() {
    let env = TestStore::new();
    let raster = write_truncated_raster(env.inputs(), "short.ppm", 100, 100, 70);

    let progress = JobProgress::new();
    let result = build_pyramid(
        &env.store,
        "short",
        &raster,
        &BuildOptions::new(32, "png"),
        progress.full(),
    );

    assert!(matches!(
        result,
        Err(BuildError::Raster(RasterError::Truncated { .. }))
    ));
    assert!(!env.store.tiled("short"));
    assert!(!env.store.media_path("short").exists());
}

#[test]
fn test_failed_rebuild_removes_previous_pyramid() {
    let env = TestStore::new();
    env.build_gradient("media", 50, 50, 32).unwrap();
    assert!(env.store.tiled("media"));

    let bad = env.inputs().join("bad.ppm");
    std::fs::write(&bad, b"P5\n50 50\n255\n").unwrap();
    let progress = JobProgress::new();
    let result = build_pyramid(
        &env.store,
        "media",
        &bad,
        &BuildOptions::new(32, "png"),
        progress.full(),
    );

    assert!(matches!(result, Err(BuildError::Raster(RasterError::Format { .. }))));
    assert!(!env.store.tiled("media"));
    assert!(!env.store.media_path("media").exists());
}

#[test]
fn test_progress_fills_its_range() {
    let env = TestStore::new();
    let raster = write_gradient_raster(env.inputs(), "p.ppm", 90, 40);
    let progress = JobProgress::new();
    build_pyramid(
        &env.store,
        "p",
        &raster,
        &BuildOptions::new(16, "png"),
        progress.range(0.25, 0.75),
    )
    .unwrap();
    assert_eq!(progress.progress(), 0.75);
}
