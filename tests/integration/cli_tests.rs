//! Command-line binary tests.
//!
//! Tests verify:
//! - A timed-out tile run cancels its jobs and the process exits promptly

use std::process::Command;
use std::time::{Duration, Instant};

use assert_cmd::cargo;

use super::test_utils::TestStore;

fn binary() -> Command {
    Command::new(cargo::cargo_bin!("zoom-tiler"))
}

#[cfg(unix)]
#[test]
fn test_tile_timeout_exits_promptly() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestStore::new();
    let rasterizer = env.inputs().join("stalled-pdftoppm");
    std::fs::write(&rasterizer, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&rasterizer, std::fs::Permissions::from_mode(0o755)).unwrap();
    let input = env.inputs().join("doc.pdf");
    std::fs::write(&input, b"%PDF-1.4\n").unwrap();

    let started = Instant::now();
    let output = binary()
        .arg("tile")
        .arg(&input)
        .arg("--rasterizer")
        .arg(&rasterizer)
        .arg("--timeout-secs")
        .arg("1")
        .arg("--scratch-dir")
        .arg(env.inputs().join("scratch"))
        .arg("--store-root")
        .arg(env.store.root())
        .output()
        .unwrap();
    let elapsed = started.elapsed();

    assert!(!output.status.success());
    assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("✗"), "stdout: {}", stdout);
    assert!(stdout.contains("cancelled"), "stdout: {}", stdout);
    assert!(!env.store.tiled(&input.display().to_string()));
}

#[test]
fn test_info_for_unknown_media() {
    let env = TestStore::new();
    let output = binary()
        .arg("info")
        .arg("never-tiled")
        .arg("--store-root")
        .arg(env.store.root())
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["media_id"], "never-tiled");
    assert_eq!(json["tiled"], false);
    assert!(json["metadata"].is_null());
}
