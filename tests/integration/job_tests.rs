//! Worker pool integration tests.
//!
//! Tests verify:
//! - Image inputs are converted and tiled through the pool
//! - Failed jobs surface an error and leave the store clean
//! - PDF inputs go through the external rasterizer and page merge

use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};

use zoom_tiler::convert::ConvertOptions;
use zoom_tiler::job::{JobState, TilingJob, WorkerPool};
use zoom_tiler::pyramid::BuildOptions;
use zoom_tiler::tile::{Tile, TileId};

use super::test_utils::{write_truncated_raster, TestStore};

const WAIT: Option<Duration> = Some(Duration::from_secs(30));

#[tokio::test]
async fn test_png_input_through_pool() {
    let env = TestStore::new();
    let input = env.inputs().join("photo.png");
    RgbImage::from_fn(90, 60, |x, y| Rgb([x as u8, y as u8, 200]))
        .save(&input)
        .unwrap();

    let pool = WorkerPool::new(2);
    let job = TilingJob::new(&input)
        .with_media_id("photo")
        .with_build_options(BuildOptions::new(32, "png"))
        .with_scratch_dir(env.inputs().join("scratch"));
    let handle = pool.submit_tiling(Arc::clone(&env.store), job);

    assert!(handle.wait(WAIT).await);
    assert_eq!(handle.state(), JobState::Complete, "{:?}", handle.error());
    assert_eq!(handle.progress(), 1.0);
    assert_eq!(handle.name(), "photo");

    let pyramid = env.store.pyramid_metadata("photo").unwrap().unwrap();
    assert_eq!((pyramid.width, pyramid.height), (90, 60));
    assert_eq!(pyramid.maxtilelevel, 2);

    let path = env
        .store
        .tile_path(&TileId::new("photo", 2, 1, 2), false, "", "png")
        .unwrap();
    let tile = Tile::open(&path).unwrap();
    assert_eq!(tile.size(), (26, 28));
    assert_eq!(tile.pixel(0, 0), [64, 32, 200]);
}

#[tokio::test]
async fn test_failed_jobs_are_isolated() {
    let env = TestStore::new();
    let good = env.inputs().join("good.png");
    RgbImage::from_pixel(10, 10, Rgb([1, 2, 3])).save(&good).unwrap();
    let bad = write_truncated_raster(env.inputs(), "bad.ppm", 40, 40, 3);

    let pool = WorkerPool::new(2);
    let options = BuildOptions::new(16, "png");
    let bad_handle = pool.submit_tiling(
        Arc::clone(&env.store),
        TilingJob::new(&bad)
            .with_media_id("bad")
            .with_build_options(options.clone()),
    );
    let good_handle = pool.submit_tiling(
        Arc::clone(&env.store),
        TilingJob::new(&good)
            .with_media_id("good")
            .with_build_options(options)
            .with_scratch_dir(env.inputs().join("scratch")),
    );

    assert!(bad_handle.wait(WAIT).await);
    assert!(good_handle.wait(WAIT).await);

    assert_eq!(bad_handle.state(), JobState::Failed);
    assert_eq!(bad_handle.progress(), 1.0);
    assert!(bad_handle.error().is_some());
    assert!(!env.store.tiled("bad"));
    assert!(!env.store.media_path("bad").exists());

    assert_eq!(good_handle.state(), JobState::Complete);
    assert!(env.store.tiled("good"));
}

#[tokio::test]
async fn test_missing_input_fails() {
    let env = TestStore::new();
    let pool = WorkerPool::default();
    let handle = pool.submit_tiling(
        Arc::clone(&env.store),
        TilingJob::new(env.inputs().join("gone.png"))
            .with_media_id("gone")
            .with_scratch_dir(env.inputs().join("scratch")),
    );

    assert!(handle.wait(WAIT).await);
    assert_eq!(handle.state(), JobState::Failed);
    assert!(!env.store.tiled("gone"));
    assert!(pool.shutdown(Duration::from_secs(5)).await);
}

/// Install a fake rasterizer that copies prepared page rasters.
#[cfg(unix)]
fn fake_rasterizer(env: &TestStore, pages: &[std::path::PathBuf]) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    // Invoked as: <tool> -r <dpi> <input> <output-prefix>
    let mut script = String::from("#!/bin/sh\n");
    for (index, page) in pages.iter().enumerate() {
        script.push_str(&format!("cp '{}' \"$4-{}.ppm\"\n", page.display(), index + 1));
    }

    let path = env.inputs().join("fake-pdftoppm");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn test_pdf_pages_are_stacked() {
    use zoom_tiler::raster::write_raster;

    let env = TestStore::new();
    let first = env.inputs().join("one.ppm");
    let second = env.inputs().join("two.ppm");
    write_raster(&first, 20, 10, &[10; 20 * 10 * 3]).unwrap();
    write_raster(&second, 12, 6, &[20; 12 * 6 * 3]).unwrap();
    let rasterizer = fake_rasterizer(&env, &[first, second]);

    let input = env.inputs().join("doc.pdf");
    std::fs::write(&input, b"%PDF-1.4\n").unwrap();

    let pool = WorkerPool::new(1);
    let job = TilingJob::new(&input)
        .with_media_id("doc")
        .with_build_options(BuildOptions::new(32, "png"))
        .with_convert_options(ConvertOptions {
            dpi: 72,
            rasterizer,
        })
        .with_scratch_dir(env.inputs().join("scratch"));
    let handle = pool.submit_tiling(Arc::clone(&env.store), job);

    assert!(handle.wait(WAIT).await);
    assert_eq!(handle.state(), JobState::Complete, "{:?}", handle.error());

    let pyramid = env.store.pyramid_metadata("doc").unwrap().unwrap();
    assert_eq!((pyramid.width, pyramid.height), (20, 16));
    assert_eq!(pyramid.maxtilelevel, 0);

    let path = env
        .store
        .tile_path(&TileId::new("doc", 0, 0, 0), false, "", "png")
        .unwrap();
    let tile = Tile::open(&path).unwrap();
    assert_eq!(tile.size(), (20, 16));
    assert_eq!(tile.pixel(0, 0), [10, 10, 10]);
    assert_eq!(tile.pixel(5, 12), [20, 20, 20]);
    assert_eq!(tile.pixel(15, 12), [255, 255, 255]);
}

/// Install a fake rasterizer that never finishes on its own.
#[cfg(unix)]
fn stalled_rasterizer(env: &TestStore) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = env.inputs().join("stalled-pdftoppm");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn test_shutdown_kills_stalled_rasterizer() {
    let env = TestStore::new();
    let input = env.inputs().join("doc.pdf");
    std::fs::write(&input, b"%PDF-1.4\n").unwrap();

    let pool = WorkerPool::new(1);
    let job = TilingJob::new(&input)
        .with_media_id("stalled")
        .with_convert_options(ConvertOptions {
            dpi: 72,
            rasterizer: stalled_rasterizer(&env),
        })
        .with_scratch_dir(env.inputs().join("scratch"));
    let handle = pool.submit_tiling(Arc::clone(&env.store), job);

    assert!(!handle.wait(Some(Duration::from_millis(300))).await);
    assert!(handle.is_running());

    let started = std::time::Instant::now();
    assert!(!pool.shutdown(Duration::from_millis(100)).await);
    assert!(handle.wait(Some(Duration::from_secs(5))).await);
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(handle.state(), JobState::Failed);
    assert!(handle.error().unwrap().contains("cancelled"));
    assert!(!env.store.media_path("stalled").exists());
}
