//! Raster image types and container metadata

use imgref::{ImgRef, ImgVec};
use rgb::Rgba;

use crate::error::Error;

const BYTES_PER_PIXEL: usize = 4;

/// Borrowed 8-bit RGBA raster with an explicit row stride
///
/// `stride` is in bytes and may exceed `width * 4` for aligned buffers.
/// Zero-sized views are representable; encoding rejects them.
#[derive(Debug, Clone, Copy)]
pub struct RgbaRef<'a> {
    pixels: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl<'a> RgbaRef<'a> {
    /// Wrap a strided RGBA buffer
    ///
    /// Fails if `stride < width * 4` or the buffer cannot hold `height`
    /// rows. The final row only needs `width * 4` bytes.
    pub fn new(pixels: &'a [u8], width: u32, height: u32, stride: usize) -> Result<Self, Error> {
        let row_bytes = (width as usize)
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or(Error::InvalidBuffer("row size overflows"))?;
        if stride < row_bytes {
            return Err(Error::InvalidBuffer("stride is smaller than width * 4"));
        }
        if height > 0 {
            let needed = stride
                .checked_mul(height as usize - 1)
                .and_then(|n| n.checked_add(row_bytes))
                .ok_or(Error::InvalidBuffer("buffer size overflows"))?;
            if pixels.len() < needed {
                return Err(Error::InvalidBuffer("buffer is shorter than stride * height"));
            }
        }
        Ok(Self {
            pixels,
            width,
            height,
            stride,
        })
    }

    /// Wrap a tightly packed RGBA buffer (`stride = width * 4`)
    pub fn packed(pixels: &'a [u8], width: u32, height: u32) -> Result<Self, Error> {
        Self::new(pixels, width, height, width as usize * BYTES_PER_PIXEL)
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Underlying bytes, including any row padding
    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }
}

impl<'a> From<ImgRef<'a, Rgba<u8>>> for RgbaRef<'a> {
    fn from(img: ImgRef<'a, Rgba<u8>>) -> Self {
        // ImgRef already guarantees buf.len() >= stride * (height - 1) + width
        Self {
            pixels: bytemuck::cast_slice(img.buf()),
            width: img.width() as u32,
            height: img.height() as u32,
            stride: img.stride() * BYTES_PER_PIXEL,
        }
    }
}

/// Owned, tightly packed 8-bit RGBA raster (`stride = width * 4`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl RgbaImage {
    /// Take ownership of a packed RGBA buffer
    pub fn from_vec(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self, Error> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
            .ok_or(Error::InvalidBuffer("buffer size overflows"))?;
        if pixels.len() != expected {
            return Err(Error::InvalidBuffer("buffer length is not width * height * 4"));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes, always `width * 4`
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Packed pixel bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at (x, y)
    ///
    /// # Panics
    ///
    /// If the coordinates are outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel ({x},{y}) out of bounds");
        let at = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        [
            self.pixels[at],
            self.pixels[at + 1],
            self.pixels[at + 2],
            self.pixels[at + 3],
        ]
    }

    /// Borrow as a strided view suitable for encoding
    pub fn view(&self) -> RgbaRef<'_> {
        RgbaRef {
            pixels: &self.pixels,
            width: self.width,
            height: self.height,
            stride: self.stride(),
        }
    }

    /// Borrow as an `imgref` image
    pub fn as_imgref(&self) -> ImgRef<'_, Rgba<u8>> {
        ImgRef::new(
            bytemuck::cast_slice(&self.pixels),
            self.width as usize,
            self.height as usize,
        )
    }

    /// Convert into an `imgref` image
    pub fn into_imgvec(self) -> ImgVec<Rgba<u8>> {
        let buf: Vec<Rgba<u8>> = bytemuck::cast_slice(&self.pixels).to_vec();
        ImgVec::new(buf, self.width as usize, self.height as usize)
    }

    /// Return the packed bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.pixels
    }
}

/// Image metadata available from the container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct ImageInfo {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Bit depth of the color planes
    pub bit_depth: u8,
    /// Whether an alpha auxiliary image is present
    pub has_alpha: bool,
    /// Grid columns (1 for a non-grid image)
    pub tile_columns: u32,
    /// Grid rows (1 for a non-grid image)
    pub tile_rows: u32,
}

impl ImageInfo {
    /// Metadata for a single, non-grid image
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            has_alpha: false,
            tile_columns: 1,
            tile_rows: 1,
        }
    }

    /// Set the bit depth
    pub fn with_bit_depth(mut self, bit_depth: u8) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Mark alpha as present or absent
    pub fn with_alpha(mut self, has_alpha: bool) -> Self {
        self.has_alpha = has_alpha;
        self
    }

    /// Set the grid shape
    pub fn with_grid(mut self, columns: u32, rows: u32) -> Self {
        self.tile_columns = columns;
        self.tile_rows = rows;
        self
    }

    /// True when the image is stored as a grid of several tiles
    pub fn is_grid(&self) -> bool {
        self.tile_columns * self.tile_rows > 1
    }
}
