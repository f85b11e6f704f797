//! Configuration management for Zoom Tiler.
//!
//! This module provides the command-line interface:
//! - Command-line arguments via clap
//! - Environment variables with `ZOOM_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `ZOOM_STORE_ROOT` - Tile store directory (default: ./tiles)
//! - `ZOOM_TILE_SIZE` - Tile edge length in pixels (default: 256)
//! - `ZOOM_TILE_FORMAT` - Tile file extension (default: jpg)
//! - `ZOOM_PDF_DPI` - PDF rasterization resolution (default: 150)
//! - `ZOOM_RASTERIZER` - PDF rasterizer executable (default: pdftoppm)
//! - `ZOOM_WORKERS` - Concurrent tiling jobs (default: 2)
//! - `ZOOM_TIMEOUT_SECS` - Give up waiting for jobs after this many seconds
//! - `ZOOM_SCRATCH_DIR` - Directory for intermediate rasters
//! - `ZOOM_MAX_AGE_DAYS` - Eviction threshold in days

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::convert::{ConvertOptions, DEFAULT_PDF_DPI, DEFAULT_RASTERIZER};
use crate::job::{TilingJob, DEFAULT_WORKERS};
use crate::pyramid::{is_writable_format, BuildOptions, DEFAULT_TILE_FORMAT, DEFAULT_TILE_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile store directory.
pub const DEFAULT_STORE_ROOT: &str = "./tiles";

/// Seconds in a day, for the eviction threshold.
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Zoom Tiler - builds tile pyramids for zooming image viewers.
#[derive(Parser, Debug, Clone)]
#[command(name = "zoom-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert and tile one or more inputs.
    Tile(TileConfig),

    /// Print the stored metadata of a media item.
    Info(InfoConfig),

    /// Delete media not used within a number of days.
    Evict(EvictConfig),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Root directory of the tile store.
    #[arg(long, default_value = DEFAULT_STORE_ROOT, env = "ZOOM_STORE_ROOT")]
    pub store_root: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl StoreArgs {
    fn validate(&self) -> Result<(), String> {
        if self.store_root.as_os_str().is_empty() {
            return Err("Store root is required. Set --store-root or ZOOM_STORE_ROOT".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tile Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    /// Images or PDF documents to tile.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Identifier to store the pyramid under (single input only).
    ///
    /// Defaults to the input path.
    #[arg(long)]
    pub media_id: Option<String>,

    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "ZOOM_TILE_SIZE")]
    pub tile_size: u32,

    /// Tile file extension, which selects the encoding.
    #[arg(long, default_value = DEFAULT_TILE_FORMAT, env = "ZOOM_TILE_FORMAT")]
    pub format: String,

    /// Resolution PDF pages are rasterized at.
    #[arg(long, default_value_t = DEFAULT_PDF_DPI, env = "ZOOM_PDF_DPI")]
    pub dpi: u32,

    /// PDF rasterizer executable.
    #[arg(long, default_value = DEFAULT_RASTERIZER, env = "ZOOM_RASTERIZER")]
    pub rasterizer: PathBuf,

    /// Maximum number of jobs run at once.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "ZOOM_WORKERS")]
    pub workers: usize,

    /// Stop waiting for jobs after this many seconds.
    #[arg(long, env = "ZOOM_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Directory for intermediate rasters (default: system temp dir).
    #[arg(long, env = "ZOOM_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Re-tile inputs that are already tiled.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl TileConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;

        if self.inputs.is_empty() {
            return Err("At least one input is required".to_string());
        }
        if self.media_id.is_some() && self.inputs.len() > 1 {
            return Err("--media-id can only be used with a single input".to_string());
        }
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if !is_writable_format(&self.format) {
            return Err(format!("Unsupported tile format: {}", self.format));
        }
        if self.dpi == 0 {
            return Err("dpi must be greater than 0".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::new(self.tile_size, self.format.as_str())
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            dpi: self.dpi,
            rasterizer: self.rasterizer.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// One job per input, in input order.
    pub fn jobs(&self) -> Vec<TilingJob> {
        self.inputs
            .iter()
            .map(|input| {
                let mut job = TilingJob::new(input)
                    .with_build_options(self.build_options())
                    .with_convert_options(self.convert_options());
                if let Some(ref media_id) = self.media_id {
                    job = job.with_media_id(media_id.clone());
                }
                if let Some(ref scratch_dir) = self.scratch_dir {
                    job = job.with_scratch_dir(scratch_dir.clone());
                }
                job
            })
            .collect()
    }
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Media identifier to look up.
    pub media_id: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        if self.media_id.is_empty() {
            return Err("media_id must not be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Evict Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct EvictConfig {
    /// Delete media not used within this many days.
    #[arg(long, env = "ZOOM_MAX_AGE_DAYS")]
    pub max_age_days: u64,

    /// Report what would be deleted without deleting anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl EvictConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        if self.max_age_days.checked_mul(SECONDS_PER_DAY).is_none() {
            return Err("max_age_days is too large".to_string());
        }
        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days.saturating_mul(SECONDS_PER_DAY))
    }
}

// =============================================================================
// Tests
// =============================================================================
