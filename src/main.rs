//! Zoom Tiler - builds tile pyramids for zooming image viewers.
//!
//! This binary wires the CLI to the tile store and the worker pool.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zoom_tiler::{
    config::{Cli, Command, EvictConfig, InfoConfig, TileConfig},
    job::{JobHandle, JobState, WorkerPool},
    store::TileStore,
};

/// How often job progress is printed.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Grace period for cancelled jobs after a timeout, and for leftover
/// blocking threads when the runtime shuts down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match cli.into_command() {
        Command::Tile(config) => runtime.block_on(run_tile(config)),
        Command::Info(config) => run_info(config),
        Command::Evict(config) => run_evict(config),
    };

    // Blocking work that ignored cancellation must not keep the process alive
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "zoom_tiler=debug"
    } else {
        "zoom_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> ExitCode {
    init_logging(config.store.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = Arc::new(TileStore::new(&config.store.store_root));
    let pool = WorkerPool::new(config.workers);

    info!("Configuration:");
    info!("  Store: {}", store.root().display());
    info!("  Tiles: {}px {}", config.tile_size, config.format);
    info!("  Workers: {}", pool.workers());

    let mut handles = Vec::new();
    for job in config.jobs() {
        if !config.force && store.tiled(&job.media_id) {
            info!("  Skipping {} (already tiled, use --force to rebuild)", job.media_id);
            continue;
        }
        handles.push(pool.submit_tiling(Arc::clone(&store), job));
    }

    if handles.is_empty() {
        return ExitCode::SUCCESS;
    }

    let finished = wait_with_progress(&handles, config.timeout()).await;
    if !finished {
        warn!("Timed out waiting for jobs, cancelling");
        pool.cancel_all();
    }
    pool.shutdown(SHUTDOWN_GRACE).await;

    let mut failures = 0;
    for handle in &handles {
        match handle.state() {
            JobState::Complete => println!("✓ {}", handle.name()),
            JobState::Failed => {
                failures += 1;
                println!(
                    "✗ {}: {}",
                    handle.name(),
                    handle.error().unwrap_or_else(|| "unknown error".to_string())
                );
            }
            JobState::Idle | JobState::Running => {
                failures += 1;
                println!("✗ {}: did not finish", handle.name());
            }
        }
    }

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Print progress until every job finishes or `timeout` elapses.
async fn wait_with_progress(handles: &[JobHandle], timeout: Option<Duration>) -> bool {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);

    loop {
        ticker.tick().await;

        if handles.iter().all(JobHandle::is_finished) {
            return true;
        }
        if timeout.is_some_and(|limit| started.elapsed() >= limit) {
            return false;
        }

        for handle in handles.iter().filter(|h| h.is_running()) {
            info!(
                job = %handle.name(),
                percent = (handle.progress() * 100.0).round(),
                "tiling"
            );
        }
    }
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig) -> ExitCode {
    if config.store.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = TileStore::new(&config.store.store_root);
    let metadata = match store.metadata(&config.media_id) {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let json = serde_json::json!({
        "media_id": config.media_id,
        "path": store.media_path(&config.media_id),
        "tiled": store.tiled(&config.media_id),
        "metadata": metadata.as_deref(),
    });

    match serde_json::to_string_pretty(&json) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Evict Command
// =============================================================================

fn run_evict(config: EvictConfig) -> ExitCode {
    init_logging(config.store.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let store = TileStore::new(&config.store.store_root);
    let report = store.sweep(config.max_age(), config.dry_run);

    let verb = if config.dry_run { "Would delete" } else { "Deleted" };
    for path in &report.deleted {
        println!("{} {}", verb, path.display());
    }
    for failure in &report.errors {
        println!("✗ {}: {}", failure.path.display(), failure.message);
    }

    println!();
    println!(
        "{} {} media ({:.2} MB), kept {} ({:.2} MB)",
        verb,
        report.deleted.len(),
        report.bytes_freed as f64 / (1024.0 * 1024.0),
        report.kept,
        report.bytes_kept as f64 / (1024.0 * 1024.0),
    );

    if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
