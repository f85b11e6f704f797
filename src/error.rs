use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing the uncompressed raster format.
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// Header is malformed or describes an unsupported variant
    #[error("Raster format error: {reason}")]
    Format { reason: String },

    /// Fewer scanlines were available than the header declared
    #[error("Raster data truncated: expected {expected} scanlines, read {read}")]
    Truncated { expected: u32, read: u32 },

    /// Underlying file I/O failed
    #[error("Raster I/O error: {0}")]
    Io(String),
}

impl RasterError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        RasterError::Format {
            reason: reason.into(),
        }
    }
}

/// Errors raised by the on-disk tile store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("Store I/O error at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// Metadata file contains a line that cannot be decoded
    #[error("Invalid metadata in {} line {line}: {reason}", path.display())]
    Metadata {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by in-memory tile operations.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Encoding or decoding through the imaging library failed
    #[error("Image error: {0}")]
    Image(String),

    /// Pixel buffer does not match the declared dimensions
    #[error("Invalid tile buffer: {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// Crop rectangle is inverted or exceeds the tile bounds
    #[error("Invalid crop ({x}, {y})-({x2}, {y2}) for tile of {width}x{height}")]
    InvalidCrop {
        x: u32,
        y: u32,
        x2: u32,
        y2: u32,
        width: u32,
        height: u32,
    },

    /// Tile store lookup failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<image::ImageError> for TileError {
    fn from(err: image::ImageError) -> Self {
        TileError::Image(err.to_string())
    }
}

/// Errors that abort a pyramid build.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Reading the source raster failed
    #[error("{0}")]
    Raster(#[from] RasterError),

    /// Persisting tiles or metadata failed
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Cropping, merging, resizing or saving a tile failed
    #[error("{0}")]
    Tile(#[from] TileError),

    /// Finest-level rows were requested out of order
    #[error("Row {requested} requested at level {level}, expected row {expected}")]
    RowOrder {
        level: u32,
        expected: u32,
        requested: u32,
    },

    /// Tile size or image dimensions are unusable
    #[error("Invalid build parameters: {0}")]
    InvalidParameters(String),

    /// The job owning the build was cancelled
    #[error("Build cancelled")]
    Cancelled,
}

/// Errors raised by the external format converters.
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// External tool exited unsuccessfully
    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    /// External tool could not be started
    #[error("Failed to run {tool}: {message}")]
    Spawn { tool: String, message: String },

    /// Imaging library could not decode the input
    #[error("Decode error: {0}")]
    Decode(String),

    /// Produced raster is unreadable
    #[error("{0}")]
    Raster(#[from] RasterError),

    /// Filesystem operation failed
    #[error("Conversion I/O error: {0}")]
    Io(String),

    /// No converter handles this input
    #[error("Unsupported input format: {extension}")]
    Unsupported { extension: String },

    /// Every page of a multi-page document failed
    #[error("No readable pages in {}", path.display())]
    NoPages { path: PathBuf },

    /// The job was cancelled and the external tool killed
    #[error("{tool} cancelled")]
    Cancelled { tool: String },
}

/// Errors of a combined convert-and-tile job.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Tiling failed: {0}")]
    Build(#[from] BuildError),

    #[error("Tiling failed: {0}")]
    Store(#[from] StoreError),

    #[error("Job cancelled before it started")]
    Cancelled,
}

impl From<std::io::Error> for ConversionError {
    fn from(err: std::io::Error) -> Self {
        ConversionError::Io(err.to_string())
    }
}

impl From<image::ImageError> for ConversionError {
    fn from(err: image::ImageError) -> Self {
        ConversionError::Decode(err.to_string())
    }
}
