//! Interleaved RGBA ⇄ engine planar conversion

use crate::engine::{Engine, InterleavedRef, Owned, PixelLayout, RgbPixels};
use crate::error::{Error, Result};
use crate::geometry::{self, Rect};
use crate::image::RgbaImage;

/// Convert strided RGBA into a new 8-bit 4:2:0 planar image owned by the engine
///
/// The returned guard destroys the planar image when dropped, including
/// when conversion fails.
pub(crate) fn to_planar<'e, E: Engine>(
    engine: &'e E,
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: usize,
) -> Result<Owned<'e, E, E::Planar>> {
    let planar = engine
        .create_planar(width, height, 8, PixelLayout::Yuv420)
        .ok_or(Error::Allocation("planar image"))?;
    let mut planar = Owned::new(engine, planar, E::destroy_planar);
    let rgb = InterleavedRef {
        pixels,
        width,
        height,
        row_bytes: stride,
        depth: 8,
    };
    engine.rgb_to_yuv(&mut planar, &rgb).map_err(Error::Conversion)?;
    Ok(planar)
}

/// Convert the decoder's current image into a packed [`RgbaImage`]
///
/// The engine's buffer may use a wider row stride than `width * 4`; rows are
/// copied individually and the engine buffer is released afterwards.
pub(crate) fn to_interleaved<E: Engine>(engine: &E, decoder: &E::Decoder) -> Result<RgbaImage> {
    let rgb = engine.yuv_to_rgb(decoder).map_err(Error::Conversion)?;
    let rgb = Owned::new(engine, rgb, E::free_rgb);

    let (width, height) = (rgb.width(), rgb.height());
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let stride = width as usize * 4;
    let len = stride
        .checked_mul(height as usize)
        .ok_or(Error::Allocation("RGBA output"))?;
    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(len)
        .map_err(|_| Error::Allocation("RGBA output"))?;
    pixels.resize(len, 0);

    geometry::copy_rect(
        rgb.pixels(),
        rgb.row_bytes(),
        Rect::full(width, height),
        &mut pixels,
        stride,
    )?;
    RgbaImage::from_vec(pixels, width, height)
}
