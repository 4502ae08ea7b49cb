//! Planar YUV images and RGBA conversion
//!
//! Encoding converts RGBA to BT.601 full-range YUV here. Decoded images
//! carry the range and matrix their stream signals, and are converted back
//! with the `yuv` crate.

use log::warn;
use ::yuv::YUV;
use ::yuv::color::{MatrixCoefficients, Range};
use ::yuv::convert::RGBConvert;

use super::{InterleavedRef, PixelLayout, RgbPixels, Status};

// BT.601 luma coefficients
const KR: f32 = 0.299;
const KB: f32 = 0.114;
const KG: f32 = 1.0 - KR - KB;
const CB_SCALE: f32 = 2.0 * (1.0 - KB);
const CR_SCALE: f32 = 2.0 * (1.0 - KR);

impl PixelLayout {
    /// Horizontal and vertical chroma shift, `None` for luma-only
    fn chroma_shift(self) -> Option<(u32, u32)> {
        match self {
            PixelLayout::Yuv420 => Some((1, 1)),
            PixelLayout::Yuv444 => Some((0, 0)),
            PixelLayout::Yuv400 => None,
        }
    }
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = KR * r + KG * g + KB * b;
    let cb = (b - y) / CB_SCALE + 128.0;
    let cr = (r - y) / CR_SCALE + 128.0;
    (y, cb, cr)
}

fn try_zeroed(len: usize) -> Option<Vec<u8>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, 0);
    Some(v)
}

/// 8-bit planar image with an alpha plane
///
/// Planes are tightly packed. Chroma planes are `ceil(width / 2)` ×
/// `ceil(height / 2)` for 4:2:0 and absent for 4:0:0. New images are
/// BT.601 full range, the encoding this crate writes.
#[derive(Debug, Clone)]
pub struct PlanarImage {
    width: u32,
    height: u32,
    depth: u8,
    layout: PixelLayout,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
    alpha: Vec<u8>,
    opaque: bool,
    range: Range,
    matrix: MatrixCoefficients,
}

impl PlanarImage {
    /// Allocate zeroed planes; `None` if a dimension is zero or allocation fails
    pub fn new(width: u32, height: u32, depth: u8, layout: PixelLayout) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let luma = (width as usize).checked_mul(height as usize)?;
        let (cw, ch) = chroma_size(width, height, layout);
        let chroma = cw as usize * ch as usize;
        Some(Self {
            width,
            height,
            depth,
            layout,
            y: try_zeroed(luma)?,
            u: try_zeroed(chroma)?,
            v: try_zeroed(chroma)?,
            alpha: try_zeroed(luma)?,
            opaque: true,
            range: Range::Full,
            matrix: MatrixCoefficients::BT601,
        })
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Chroma layout
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Bits per sample
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Chroma plane dimensions (zero for 4:0:0)
    pub fn chroma_size(&self) -> (u32, u32) {
        chroma_size(self.width, self.height, self.layout)
    }

    /// Luma plane, `width` bytes per row
    pub fn luma(&self) -> &[u8] {
        &self.y
    }

    /// Cb plane
    pub fn cb(&self) -> &[u8] {
        &self.u
    }

    /// Cr plane
    pub fn cr(&self) -> &[u8] {
        &self.v
    }

    /// Alpha plane, or `None` when every pixel is opaque
    pub fn alpha(&self) -> Option<&[u8]> {
        (!self.opaque).then_some(self.alpha.as_slice())
    }

    /// Alpha plane regardless of opacity
    pub(crate) fn alpha_plane(&self) -> &[u8] {
        &self.alpha
    }

    /// True when no pixel has alpha below 255
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    /// Luma, Cb and Cr planes for writing
    pub(crate) fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        (&mut self.y, &mut self.u, &mut self.v)
    }

    /// Range and matrix the samples are coded with
    pub(crate) fn color_signal(&self) -> (Range, MatrixCoefficients) {
        (self.range, self.matrix)
    }

    /// Record the range and matrix the samples are coded with
    pub(crate) fn set_color_signal(&mut self, range: Range, matrix: MatrixCoefficients) {
        self.range = range;
        self.matrix = matrix;
    }

    /// Copy `tile` into this image with its top-left corner at (`x`, `y`)
    ///
    /// Parts of the tile beyond the right or bottom edge are dropped. The
    /// corner must fall on a chroma sample.
    pub(crate) fn place(&mut self, tile: &PlanarImage, x: u32, y: u32) -> Result<(), Status> {
        if tile.layout != self.layout || tile.depth != self.depth {
            return Err(Status::InvalidImageGrid);
        }
        if x >= self.width || y >= self.height {
            return Err(Status::InvalidImageGrid);
        }
        let shift = self.layout.chroma_shift();
        if shift.is_some_and(|(sx, sy)| x % (1 << sx) != 0 || y % (1 << sy) != 0) {
            return Err(Status::InvalidImageGrid);
        }
        let w = tile.width.min(self.width - x);
        let h = tile.height.min(self.height - y);
        blit(&tile.y, tile.width, &mut self.y, self.width, (x, y), (w, h));

        if let Some((sx, sy)) = shift {
            let (cw, ch) = self.chroma_size();
            let (tcw, tch) = tile.chroma_size();
            let (cx, cy) = (x >> sx, y >> sy);
            let size = (tcw.min(cw - cx), tch.min(ch - cy));
            blit(&tile.u, tcw, &mut self.u, cw, (cx, cy), size);
            blit(&tile.v, tcw, &mut self.v, cw, (cx, cy), size);
        }
        Ok(())
    }

    /// Take the alpha plane from the luma of `alpha`, expanding limited range
    pub(crate) fn set_alpha(&mut self, alpha: &PlanarImage) -> Result<(), Status> {
        if (alpha.width, alpha.height) != (self.width, self.height) {
            return Err(Status::ReformatFailed);
        }
        let conv = RGBConvert::<u8>::new(alpha.range, MatrixCoefficients::Identity).map_err(|e| {
            warn!("alpha conversion: {e}");
            Status::ReformatFailed
        })?;
        let mut opaque = true;
        for (dst, &a) in self.alpha.iter_mut().zip(&alpha.y) {
            *dst = conv.to_luma(a);
            opaque &= *dst == 255;
        }
        self.opaque = opaque;
        Ok(())
    }

    /// Convert interleaved RGBA of the same size into this image
    pub fn fill_from_rgba(&mut self, rgb: &InterleavedRef<'_>) -> Result<(), Status> {
        if rgb.depth != 8 || self.depth != 8 {
            return Err(Status::UnsupportedDepth);
        }
        if rgb.width != self.width || rgb.height != self.height || rgb.row_bytes < rgb.width as usize * 4 {
            return Err(Status::ReformatFailed);
        }
        let w = self.width as usize;
        let mut opaque = true;
        for y in 0..self.height {
            let row = rgb.row(y).ok_or(Status::ReformatFailed)?;
            let base = y as usize * w;
            for (x, px) in row.chunks_exact(4).enumerate() {
                let (luma, _, _) = rgb_to_ycbcr(px[0], px[1], px[2]);
                self.y[base + x] = clamp_u8(luma);
                self.alpha[base + x] = px[3];
                opaque &= px[3] == 255;
            }
        }
        self.opaque = opaque;

        let Some((sx, sy)) = self.layout.chroma_shift() else {
            return Ok(());
        };
        let (cw, ch) = self.chroma_size();
        for cy in 0..ch {
            let y0 = cy << sy;
            let y1 = ((cy + 1) << sy).min(self.height);
            for cx in 0..cw {
                let x0 = cx << sx;
                let x1 = ((cx + 1) << sx).min(self.width);
                let (mut sum_cb, mut sum_cr, mut n) = (0.0f32, 0.0f32, 0.0f32);
                for y in y0..y1 {
                    let row = rgb.row(y).ok_or(Status::ReformatFailed)?;
                    for x in x0..x1 {
                        let px = &row[x as usize * 4..x as usize * 4 + 3];
                        let (_, cb, cr) = rgb_to_ycbcr(px[0], px[1], px[2]);
                        sum_cb += cb;
                        sum_cr += cr;
                        n += 1.0;
                    }
                }
                let at = (cy * cw + cx) as usize;
                self.u[at] = clamp_u8(sum_cb / n);
                self.v[at] = clamp_u8(sum_cr / n);
            }
        }
        Ok(())
    }

    /// Convert to packed RGBA with nearest-neighbour chroma upsampling
    pub fn to_rgba(&self) -> Result<RgbBuffer, Status> {
        if self.depth != 8 {
            return Err(Status::UnsupportedDepth);
        }
        let matrix = match (self.layout, self.matrix) {
            (PixelLayout::Yuv400, MatrixCoefficients::BT601) => MatrixCoefficients::Identity,
            (_, matrix) => matrix,
        };
        let conv = RGBConvert::<u8>::new(self.range, matrix).map_err(|e| {
            warn!("color conversion: {e}");
            Status::ReformatFailed
        })?;

        let w = self.width as usize;
        let row_bytes = w * 4;
        let mut pixels = try_zeroed(row_bytes * self.height as usize).ok_or(Status::OutOfMemory)?;
        let shift = self.layout.chroma_shift();
        let (cw, _) = self.chroma_size();
        for (y, out) in pixels.chunks_exact_mut(row_bytes).enumerate() {
            let y = y as u32;
            for (x, px) in out.chunks_exact_mut(4).enumerate() {
                let i = y as usize * w + x;
                let luma = self.y[i];
                let rgb = match shift {
                    Some((sx, sy)) => {
                        let c = ((y >> sy) * cw + (x as u32 >> sx)) as usize;
                        conv.to_rgb(YUV {
                            y: luma,
                            u: self.u[c],
                            v: self.v[c],
                        })
                    }
                    None => {
                        let g = conv.to_luma(luma);
                        rgb::RGB8::new(g, g, g)
                    }
                };
                let a = if self.opaque { 255 } else { self.alpha[i] };
                px.copy_from_slice(&[rgb.r, rgb.g, rgb.b, a]);
            }
        }
        Ok(RgbBuffer {
            pixels,
            width: self.width,
            height: self.height,
            row_bytes,
        })
    }

    /// Copy of this image grown to `width × height` by repeating the last
    /// column and row
    pub(crate) fn padded_to(&self, width: u32, height: u32) -> Option<Self> {
        if width < self.width || height < self.height {
            return None;
        }
        let (cw, ch) = chroma_size(width, height, self.layout);
        let (scw, sch) = self.chroma_size();
        Some(Self {
            width,
            height,
            depth: self.depth,
            layout: self.layout,
            y: pad_plane(&self.y, self.width, self.height, width, height)?,
            u: pad_plane(&self.u, scw, sch, cw, ch)?,
            v: pad_plane(&self.v, scw, sch, cw, ch)?,
            alpha: pad_plane(&self.alpha, self.width, self.height, width, height)?,
            opaque: self.opaque,
            range: self.range,
            matrix: self.matrix,
        })
    }
}

fn chroma_size(width: u32, height: u32, layout: PixelLayout) -> (u32, u32) {
    match layout.chroma_shift() {
        Some((sx, sy)) => (width.div_ceil(1 << sx), height.div_ceil(1 << sy)),
        None => (0, 0),
    }
}

/// Copy a `size` block from the top-left of `src` to `at` in `dst`
fn blit(src: &[u8], src_w: u32, dst: &mut [u8], dst_w: u32, at: (u32, u32), size: (u32, u32)) {
    let (w, h) = (size.0 as usize, size.1 as usize);
    for row in 0..h {
        let from = &src[row * src_w as usize..][..w];
        let to = (at.1 as usize + row) * dst_w as usize + at.0 as usize;
        dst[to..to + w].copy_from_slice(from);
    }
}

fn pad_plane(src: &[u8], w: u32, h: u32, new_w: u32, new_h: u32) -> Option<Vec<u8>> {
    let (w, h, new_w, new_h) = (w as usize, h as usize, new_w as usize, new_h as usize);
    let mut out = try_zeroed(new_w * new_h)?;
    if w == 0 || h == 0 {
        return Some(out);
    }
    for y in 0..new_h {
        let src_row = &src[y.min(h - 1) * w..][..w];
        let dst_row = &mut out[y * new_w..][..new_w];
        dst_row[..w].copy_from_slice(src_row);
        let edge = src_row[w - 1];
        dst_row[w..].fill(edge);
    }
    Some(out)
}

/// Packed RGBA produced by [`PlanarImage::to_rgba`]
#[derive(Debug, Clone)]
pub struct RgbBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    row_bytes: usize,
}

impl RgbPixels for RgbBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
