//! Format conversion to the raster input of the pyramid builder.
//!
//! # Contract
//!
//! A converter is given an input path and an output path and runs
//! synchronously. Afterwards either the output raster exists, or it does not
//! and a [`ConversionError`] explains why. [`run_conversion`] enforces the
//! cleanup half of that contract and drives progress to completion on both
//! outcomes.
//!
//! # Converters
//!
//! - [`ImageConverter`]: any raster format the imaging library decodes
//! - [`PdfConverter`]: rasterizes every page with an external tool and
//!   stacks the pages vertically via [`merge_pages`]
//! - `.ppm` inputs are already rasters and need no conversion

mod imaging;
mod pdf;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ConversionError;
use crate::job::ProgressRange;
use crate::store::DiskGuard;

pub use imaging::ImageConverter;
pub use pdf::{merge_pages, MergeSummary, PdfConverter, DEFAULT_PDF_DPI, DEFAULT_RASTERIZER};

/// Extension of inputs that are used as rasters directly.
pub const RASTER_EXTENSION: &str = "ppm";

/// Converts one input file into an uncompressed raster.
pub trait Converter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Write the raster form of `input` to `output`.
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressRange<'_>,
    ) -> Result<(), ConversionError>;
}

/// Options shared by all converters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Rasterization resolution of vector documents
    pub dpi: u32,

    /// External PDF rasterizer executable
    pub rasterizer: PathBuf,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_PDF_DPI,
            rasterizer: PathBuf::from(DEFAULT_RASTERIZER),
        }
    }
}

/// Lower-cased extension of `path`, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Pick the converter for `input`.
///
/// Returns `Ok(None)` when the input already is a raster.
pub fn converter_for(
    input: &Path,
    options: &ConvertOptions,
) -> Result<Option<Box<dyn Converter>>, ConversionError> {
    let extension = extension_of(input);
    match extension.as_str() {
        RASTER_EXTENSION => Ok(None),
        "pdf" => Ok(Some(Box::new(PdfConverter::new(
            options.dpi,
            options.rasterizer.clone(),
        )))),
        _ if ImageConverter::supports(&extension) => Ok(Some(Box::new(ImageConverter::new()))),
        _ => Err(ConversionError::Unsupported { extension }),
    }
}

/// Run `converter` under the disk lock, honouring the collaborator contract.
///
/// On failure any partial output is removed. Progress reaches the end of its
/// range either way.
pub fn run_conversion(
    converter: &dyn Converter,
    input: &Path,
    output: &Path,
    progress: ProgressRange<'_>,
    _guard: &DiskGuard,
) -> Result<(), ConversionError> {
    debug!(
        converter = converter.name(),
        input = %input.display(),
        output = %output.display(),
        "converting"
    );

    let result = converter.convert(input, output, progress);
    if let Err(ref e) = result {
        warn!(converter = converter.name(), input = %input.display(), error = %e, "conversion failed");
        if let Err(cleanup) = fs::remove_file(output) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(output = %output.display(), error = %cleanup, "failed to remove partial raster");
            }
        }
    }
    progress.finish();
    result
}
