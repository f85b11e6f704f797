//! Sequential reader for uncompressed binary RGB rasters.
//!
//! The header is a run of whitespace separated tokens:
//!
//! ```text
//! P6
//! # optional comments
//! <width> <height>
//! 255
//! <width * height * 3 bytes of pixel data>
//! ```
//!
//! Only the 3-sample binary variant with 8-bit channels is accepted. Pixel
//! rows are handed out one at a time; there is no seeking, so callers must
//! consume scanlines in order.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::RasterError;

/// Magic token of the binary RGB variant.
pub const RASTER_MAGIC: &str = "P6";

/// The only supported maximum sample value.
pub const RASTER_MAXVAL: u32 = 255;

/// Bytes per pixel of the raster payload.
pub const BYTES_PER_PIXEL: usize = 3;

/// Longest header token we are willing to buffer.
const MAX_TOKEN_LEN: usize = 32;

/// Reader over a raster file that yields one scanline at a time.
///
/// The underlying handle is owned for the lifetime of the reader and is
/// released when the reader is dropped.
#[derive(Debug)]
pub struct RasterReader<R = BufReader<File>> {
    inner: R,
    width: u32,
    height: u32,
    rows_read: u32,
    scanline: Vec<u8>,
}

impl RasterReader<BufReader<File>> {
    /// Open a raster file and parse its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| RasterError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> RasterReader<R> {
    /// Wrap an already-open stream positioned at the start of the header.
    pub fn from_reader(mut inner: R) -> Result<Self, RasterError> {
        let (width, height) = parse_header(&mut inner)?;
        let row_len = width as usize * BYTES_PER_PIXEL;

        Ok(Self {
            inner,
            width,
            height,
            rows_read: 0,
            scanline: vec![0; row_len],
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of scanlines consumed so far.
    pub fn rows_read(&self) -> u32 {
        self.rows_read
    }

    /// Length in bytes of one scanline.
    pub fn scanline_len(&self) -> usize {
        self.scanline.len()
    }

    /// Read the next scanline.
    ///
    /// Returns `Ok(None)` once all `height` rows have been read. Running out
    /// of data before that point is a [`RasterError::Truncated`] error; the
    /// reader never pads missing rows.
    pub fn next_scanline(&mut self) -> Result<Option<&[u8]>, RasterError> {
        if self.rows_read >= self.height {
            return Ok(None);
        }

        match self.inner.read_exact(&mut self.scanline) {
            Ok(()) => {
                self.rows_read += 1;
                Ok(Some(&self.scanline))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(RasterError::Truncated {
                expected: self.height,
                read: self.rows_read,
            }),
            Err(e) => Err(RasterError::Io(e.to_string())),
        }
    }

    /// Release the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

// =============================================================================
// Header Parsing
// =============================================================================

/// Parse the textual header and leave `inner` positioned at the pixel data.
fn parse_header<R: BufRead>(inner: &mut R) -> Result<(u32, u32), RasterError> {
    let mut tokens = Vec::with_capacity(4);
    while tokens.len() < 4 {
        match next_token(inner)? {
            Some(token) => tokens.push(token),
            None => {
                return Err(RasterError::format(format!(
                    "expected 4 header fields, found {}",
                    tokens.len()
                )))
            }
        }
    }

    if tokens[0] != RASTER_MAGIC {
        return Err(RasterError::format(format!(
            "unsupported magic {:?}, only {} (binary RGB) is supported",
            tokens[0], RASTER_MAGIC
        )));
    }

    let width = parse_field("width", &tokens[1])?;
    let height = parse_field("height", &tokens[2])?;
    let maxval = parse_field("max value", &tokens[3])?;

    if maxval != RASTER_MAXVAL {
        return Err(RasterError::format(format!(
            "max value must be {}, got {}",
            RASTER_MAXVAL, maxval
        )));
    }
    if width == 0 || height == 0 {
        return Err(RasterError::format(format!(
            "image dimensions must be positive, got {}x{}",
            width, height
        )));
    }

    Ok((width, height))
}

fn parse_field(name: &str, token: &str) -> Result<u32, RasterError> {
    token
        .parse::<u32>()
        .map_err(|_| RasterError::format(format!("invalid {} field {:?}", name, token)))
}

/// Read one header token, skipping whitespace and `#` comments.
///
/// The single whitespace byte terminating the token is consumed, which for
/// the last token means the stream is left at the first pixel byte.
fn next_token<R: BufRead>(inner: &mut R) -> Result<Option<String>, RasterError> {
    let mut token = Vec::new();

    loop {
        let Some(byte) = read_byte(inner)? else {
            break;
        };

        if token.is_empty() {
            if byte.is_ascii_whitespace() {
                continue;
            }
            if byte == b'#' {
                skip_comment(inner)?;
                continue;
            }
        } else if byte.is_ascii_whitespace() {
            break;
        }

        if token.len() >= MAX_TOKEN_LEN {
            return Err(RasterError::format("header token too long"));
        }
        token.push(byte);
    }

    if token.is_empty() {
        return Ok(None);
    }

    String::from_utf8(token)
        .map(Some)
        .map_err(|_| RasterError::format("header is not valid ASCII"))
}

fn skip_comment<R: BufRead>(inner: &mut R) -> Result<(), RasterError> {
    while let Some(byte) = read_byte(inner)? {
        if byte == b'\n' || byte == b'\r' {
            break;
        }
    }
    Ok(())
}

fn read_byte<R: Read>(inner: &mut R) -> Result<Option<u8>, RasterError> {
    let mut buf = [0u8; 1];
    loop {
        match inner.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(RasterError::Io(e.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
