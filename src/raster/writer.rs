//! Writer for the binary RGB raster format read by [`super::RasterReader`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::RasterError;

use super::reader::{BYTES_PER_PIXEL, RASTER_MAGIC, RASTER_MAXVAL};

/// Streaming raster writer.
///
/// The header is written on construction; callers then push exactly
/// `height` scanlines and call [`RasterWriter::finish`].
pub struct RasterWriter<W: Write> {
    inner: W,
    width: u32,
    height: u32,
    rows_written: u32,
}

impl RasterWriter<BufWriter<File>> {
    /// Create (or truncate) a raster file at `path`.
    pub fn create(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, RasterError> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| RasterError::Io(format!("{}: {}", path.display(), e)))?;
        Self::new(BufWriter::new(file), width, height)
    }
}

impl<W: Write> RasterWriter<W> {
    /// Write the header to `inner`.
    pub fn new(mut inner: W, width: u32, height: u32) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::format(format!(
                "cannot write a {}x{} raster",
                width, height
            )));
        }

        write!(
            inner,
            "{}\n{} {}\n{}\n",
            RASTER_MAGIC, width, height, RASTER_MAXVAL
        )
        .map_err(|e| RasterError::Io(e.to_string()))?;

        Ok(Self {
            inner,
            width,
            height,
            rows_written: 0,
        })
    }

    /// Expected byte length of one scanline.
    pub fn scanline_len(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Append one scanline.
    pub fn write_scanline(&mut self, row: &[u8]) -> Result<(), RasterError> {
        if row.len() != self.scanline_len() {
            return Err(RasterError::format(format!(
                "scanline has {} bytes, expected {}",
                row.len(),
                self.scanline_len()
            )));
        }
        if self.rows_written >= self.height {
            return Err(RasterError::format("more scanlines than declared height"));
        }

        self.inner
            .write_all(row)
            .map_err(|e| RasterError::Io(e.to_string()))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flush and verify that every declared row was written.
    pub fn finish(mut self) -> Result<W, RasterError> {
        if self.rows_written != self.height {
            return Err(RasterError::Truncated {
                expected: self.height,
                read: self.rows_written,
            });
        }
        self.inner
            .flush()
            .map_err(|e| RasterError::Io(e.to_string()))?;
        Ok(self.inner)
    }
}

/// Write a complete raster from a packed RGB buffer.
pub fn write_raster(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<(), RasterError> {
    let expected = width as usize * height as usize * BYTES_PER_PIXEL;
    if pixels.len() != expected {
        return Err(RasterError::format(format!(
            "pixel buffer has {} bytes, expected {}",
            pixels.len(),
            expected
        )));
    }

    let mut writer = RasterWriter::create(path, width, height)?;
    for row in pixels.chunks_exact(writer.scanline_len()) {
        writer.write_scanline(row)?;
    }
    writer.finish()?;
    Ok(())
}
