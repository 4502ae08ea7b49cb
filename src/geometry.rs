//! Pixel rectangles and stride-aware row copies
//!
//! Both tile extraction and the decode-side RGBA copy go through
//! [`copy_rect`], so source and destination strides are handled in one place.

use crate::error::Error;

const BYTES_PER_PIXEL: usize = 4;

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge (inclusive)
    pub x0: u32,
    /// Top edge (inclusive)
    pub y0: u32,
    /// Right edge (exclusive)
    pub x1: u32,
    /// Bottom edge (exclusive)
    pub y1: u32,
}

impl Rect {
    /// Rectangle covering a whole `width × height` image
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// Bytes in one row of 4-byte pixels
    pub fn row_bytes(&self) -> usize {
        self.width() as usize * BYTES_PER_PIXEL
    }

    /// True when the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Copy `rect` of an RGBA buffer into the top-left of `dst`
///
/// Each of the `rect.height()` rows moves `rect.width() * 4` bytes. Reads
/// advance by `src_stride`, writes by `dst_stride`; padding bytes in `dst`
/// are left untouched.
pub(crate) fn copy_rect(
    src: &[u8],
    src_stride: usize,
    rect: Rect,
    dst: &mut [u8],
    dst_stride: usize,
) -> Result<(), Error> {
    let row_bytes = rect.row_bytes();
    let rows = rect.height() as usize;
    if rows == 0 || row_bytes == 0 {
        return Ok(());
    }
    if src_stride < row_bytes + rect.x0 as usize * BYTES_PER_PIXEL || dst_stride < row_bytes {
        return Err(Error::InvalidBuffer("stride is smaller than the copied row"));
    }

    let src_start = rect.y0 as usize * src_stride + rect.x0 as usize * BYTES_PER_PIXEL;
    let src_end = src_start + (rows - 1) * src_stride + row_bytes;
    let dst_end = (rows - 1) * dst_stride + row_bytes;
    if src.len() < src_end {
        return Err(Error::InvalidBuffer("source is shorter than the copied rectangle"));
    }
    if dst.len() < dst_end {
        return Err(Error::InvalidBuffer("destination is shorter than the copied rectangle"));
    }

    let src_rows = src[src_start..].chunks(src_stride);
    let dst_rows = dst[..dst_end].chunks_mut(dst_stride);
    for (dst_row, src_row) in dst_rows.zip(src_rows) {
        dst_row[..row_bytes].copy_from_slice(&src_row[..row_bytes]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Image where every byte encodes its own (x, y, channel)
    fn labelled(width: usize, height: usize, stride: usize) -> Vec<u8> {
        let mut buf = vec![0xEEu8; stride * height];
        for y in 0..height {
            for x in 0..width {
                let at = y * stride + x * 4;
                buf[at..at + 4].copy_from_slice(&[x as u8, y as u8, 0xC0, 0xFF]);
            }
        }
        buf
    }

    #[test]
    fn rect_dimensions() {
        let r = Rect { x0: 3, y0: 4, x1: 10, y1: 6 };
        assert_eq!((r.width(), r.height(), r.row_bytes()), (7, 2, 28));
        assert!(!r.is_empty());
        assert!(Rect { x0: 5, y0: 0, x1: 5, y1: 9 }.is_empty());
    }

    #[test]
    fn sub_rect_with_padded_strides() {
        // 7x5 source with 40 bytes stride (12 bytes padding)
        let src = labelled(7, 5, 40);
        let rect = Rect { x0: 2, y0: 1, x1: 6, y1: 4 };
        // destination padded too: 4 px wide, stride 20
        let mut dst = vec![0u8; 20 * 3];
        copy_rect(&src, 40, rect, &mut dst, 20).unwrap();

        for row in 0..3 {
            for col in 0..4 {
                let at = row * 20 + col * 4;
                assert_eq!(
                    &dst[at..at + 4],
                    &[2 + col as u8, 1 + row as u8, 0xC0, 0xFF],
                    "pixel ({col},{row})"
                );
            }
            // padding untouched
            assert_eq!(&dst[row * 20 + 16..row * 20 + 20], &[0, 0, 0, 0]);
        }
    }

    #[test]
    fn boundary_rect_touching_last_byte() {
        // last row has no padding after it
        let mut src = labelled(6, 3, 32);
        src.truncate(32 * 2 + 24);
        let rect = Rect { x0: 4, y0: 2, x1: 6, y1: 3 };
        let mut dst = vec![0u8; 8];
        copy_rect(&src, 32, rect, &mut dst, 8).unwrap();
        assert_eq!(dst, [4, 2, 0xC0, 0xFF, 5, 2, 0xC0, 0xFF]);
    }

    #[test]
    fn wider_source_stride_than_destination() {
        let src = labelled(3, 2, 64);
        let mut dst = vec![0u8; 12 * 2];
        copy_rect(&src, 64, Rect::full(3, 2), &mut dst, 12).unwrap();
        assert_eq!(&dst[12..16], &[0, 1, 0xC0, 0xFF]);
        assert_eq!(&dst[20..24], &[2, 1, 0xC0, 0xFF]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let src = labelled(4, 4, 16);
        let mut dst = vec![0u8; 16 * 4 - 1];
        assert!(copy_rect(&src, 16, Rect::full(4, 4), &mut dst, 16).is_err());
        let mut dst = vec![0u8; 16 * 4];
        assert!(copy_rect(&src[..60], 16, Rect::full(4, 4), &mut dst, 16).is_err());
        assert!(copy_rect(&src, 12, Rect::full(4, 4), &mut dst, 16).is_err());
    }

    #[test]
    fn empty_rect_is_noop() {
        let mut dst = [7u8; 4];
        copy_rect(&[], 0, Rect::full(0, 3), &mut dst, 0).unwrap();
        assert_eq!(dst, [7; 4]);
    }
}
