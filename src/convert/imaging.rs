use std::path::Path;

use image::ImageFormat;
use tracing::debug;

use crate::error::ConversionError;
use crate::job::ProgressRange;
use crate::raster::write_raster;

use super::Converter;

/// Decodes common image formats and flattens them to 8-bit RGB.
///
/// Alpha is dropped and wider channels are truncated to 8 bits; colour
/// profiles are ignored.
#[derive(Debug, Clone, Default)]
pub struct ImageConverter {}

impl ImageConverter {
    pub fn new() -> Self {
        Self {}
    }

    /// Whether the imaging library can decode files with this extension.
    pub fn supports(extension: &str) -> bool {
        ImageFormat::from_extension(extension).is_some_and(|format| format.reading_enabled())
    }
}

impl Converter for ImageConverter {
    fn name(&self) -> &'static str {
        "image"
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressRange<'_>,
    ) -> Result<(), ConversionError> {
        let decoded = image::open(input)?;
        progress.set(0.6);

        let rgb = decoded.into_rgb8();
        debug!(
            input = %input.display(),
            width = rgb.width(),
            height = rgb.height(),
            "decoded image"
        );
        progress.set(0.7);

        write_raster(output, rgb.width(), rgb.height(), rgb.as_raw())?;
        progress.finish();
        Ok(())
    }
}
