//! In-memory RGB tile buffer.
//!
//! A [`Tile`] is the unit of work of the pyramid builder and the unit of
//! caching of the tile provider. All operations except [`Tile::save`] are
//! pure: they return a new tile and leave the receiver untouched.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::TileError;
use crate::raster::BYTES_PER_PIXEL;

/// Filter used for every resize. Tiles are downsampled once per level, so
/// speed matters more than quality here.
pub const RESIZE_FILTER: FilterType = FilterType::Nearest;

/// An owned 8-bit RGB pixel buffer.
///
/// Tiles carry no identity of their own; see [`super::TileId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pixels: RgbImage,
}

impl Tile {
    /// Build a tile from packed RGB bytes (`width * height * 3` long).
    pub fn from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self, TileError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        let actual = bytes.len();
        RgbImage::from_raw(width, height, bytes)
            .filter(|_| actual == expected)
            .map(Self::from_image)
            .ok_or(TileError::InvalidBuffer {
                width,
                height,
                expected,
                actual,
            })
    }

    /// Wrap an existing image buffer.
    pub fn from_image(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// A tile of uniform colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// Decode a tile file, format inferred from the extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TileError> {
        let img = image::open(path.as_ref())?;
        Ok(Self::from_image(img.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// `(width, height)` in pixels.
    pub fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Packed RGB bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Memory footprint of the pixel data in bytes.
    pub fn byte_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// Colour of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbImage {
        self.pixels
    }

    /// Copy out the rectangle `[x, x2) x [y, y2)`.
    pub fn crop(&self, x: u32, y: u32, x2: u32, y2: u32) -> Result<Tile, TileError> {
        let (width, height) = self.size();
        if x > x2 || y > y2 || x2 > width || y2 > height {
            return Err(TileError::InvalidCrop {
                x,
                y,
                x2,
                y2,
                width,
                height,
            });
        }

        let view = imageops::crop_imm(&self.pixels, x, y, x2 - x, y2 - y);
        Ok(Self::from_image(view.to_image()))
    }

    /// Scale to `width x height` with the fast nearest-neighbour filter.
    pub fn resize(&self, width: u32, height: u32) -> Tile {
        if (width, height) == self.size() {
            return self.clone();
        }
        Self::from_image(imageops::resize(&self.pixels, width, height, RESIZE_FILTER))
    }

    /// Halve both dimensions, rounding up and never going below one pixel.
    ///
    /// Rounding up keeps an edge tile of odd size covering exactly its
    /// clipped region at the next coarser level.
    pub fn downsample_half(&self) -> Tile {
        let (width, height) = self.size();
        self.resize(width.div_ceil(2).max(1), height.div_ceil(2).max(1))
    }

    /// Compose up to four tiles into a 2x2 block.
    ///
    /// `top_left` sits at the origin, `top_right` to its right, `bottom_left`
    /// below it and `bottom_right` diagonally opposite. Missing quadrants add
    /// no pixels, so the result is only as large as the tiles present.
    pub fn merge(
        top_left: &Tile,
        top_right: Option<&Tile>,
        bottom_left: Option<&Tile>,
        bottom_right: Option<&Tile>,
    ) -> Tile {
        let right_width = top_right.or(bottom_right).map_or(0, Tile::width);
        let bottom_height = bottom_left.or(bottom_right).map_or(0, Tile::height);

        let left_width = top_left.width();
        let top_height = top_left.height();

        let mut canvas = RgbImage::new(left_width + right_width, top_height + bottom_height);

        let placements = [
            (Some(top_left), 0, 0),
            (top_right, left_width, 0),
            (bottom_left, 0, top_height),
            (bottom_right, left_width, top_height),
        ];
        for (tile, x, y) in placements {
            if let Some(tile) = tile {
                imageops::replace(&mut canvas, &tile.pixels, i64::from(x), i64::from(y));
            }
        }

        Self::from_image(canvas)
    }

    /// Encode to `path`, format chosen by the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TileError> {
        self.pixels.save(path.as_ref())?;
        Ok(())
    }
}
