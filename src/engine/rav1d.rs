//! AV1 still-picture decoding with rav1d

use std::ffi::{c_int, c_void};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use ::rav1d::include::dav1d::data::Dav1dData;
use ::rav1d::include::dav1d::dav1d::{Dav1dContext, Dav1dSettings};
use ::rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I444,
    Rav1dMatrixCoefficients, Rav1dSequenceHeader,
};
use ::rav1d::include::dav1d::picture::Dav1dPicture;
use ::rav1d::src::lib::{
    dav1d_close, dav1d_data_wrap, dav1d_default_settings, dav1d_get_picture, dav1d_open,
    dav1d_picture_unref, dav1d_send_data,
};
use ::rav1d::src::send_sync_non_null::SendSyncNonNull;
use ::yuv::color::{MatrixCoefficients, Range};

use super::yuv::PlanarImage;
use super::{PixelLayout, Status};

// rav1d reports "try again" as -EAGAIN
#[cfg(target_os = "macos")]
const EAGAIN: c_int = -35;
#[cfg(not(target_os = "macos"))]
const EAGAIN: c_int = -11;

/// Failure reported by rav1d
#[derive(Debug, thiserror::Error)]
#[error("{msg} (code {code})")]
pub(super) struct Av1Error {
    code: c_int,
    msg: &'static str,
}

impl Av1Error {
    fn new(code: c_int, msg: &'static str) -> Self {
        Self { code, msg }
    }
}

/// rav1d decoder context, closed on drop
///
/// Decoding runs on the calling thread, so every payload either yields its
/// picture or fails before [`Av1Decoder::decode`] returns.
pub(super) struct Av1Decoder {
    ctx: Option<Dav1dContext>,
}

impl Av1Decoder {
    pub(super) fn new() -> Result<Self, Av1Error> {
        let mut settings = MaybeUninit::<Dav1dSettings>::uninit();

        // SAFETY: dav1d_default_settings initializes every field
        unsafe {
            dav1d_default_settings(NonNull::from(&mut settings).cast());
        }
        let mut settings = unsafe { settings.assume_init() };
        settings.n_threads = 1;
        settings.max_frame_delay = 1;

        let mut ctx: Option<Dav1dContext> = None;
        // SAFETY: both pointers are valid for the duration of the call
        let result = unsafe {
            dav1d_open(
                NonNull::new(&mut ctx),
                NonNull::new(&mut settings).map(|p| p.cast()),
            )
        };
        if result.0 < 0 {
            return Err(Av1Error::new(result.0, "failed to open decoder"));
        }
        Ok(Self { ctx })
    }

    /// Decode one AV1 still picture
    ///
    /// `data` must stay alive until the returned picture is dropped.
    pub(super) fn decode(&mut self, data: &[u8]) -> Result<Picture, Av1Error> {
        let ctx = self
            .ctx
            .ok_or_else(|| Av1Error::new(-1, "decoder context is null"))?;

        // The caller owns the bytes; rav1d only borrows them
        unsafe extern "C" fn null_free(_data: *const u8, _cookie: Option<SendSyncNonNull<c_void>>) {}

        let mut dav1d_data = Dav1dData::default();
        // SAFETY: data outlives every use of dav1d_data
        let result = unsafe {
            dav1d_data_wrap(
                NonNull::new(&mut dav1d_data),
                NonNull::new(data.as_ptr() as *mut u8),
                data.len(),
                Some(null_free),
                None,
            )
        };
        if result.0 < 0 {
            return Err(Av1Error::new(result.0, "failed to wrap data"));
        }

        let mut left = dav1d_data.sz;
        loop {
            // SAFETY: ctx is open and dav1d_data was initialized above
            let sent = unsafe { dav1d_send_data(Some(ctx), NonNull::new(&mut dav1d_data)) };
            if sent.0 < 0 && sent.0 != EAGAIN {
                return Err(Av1Error::new(sent.0, "failed to send data to decoder"));
            }

            let mut picture = Dav1dPicture::default();
            // SAFETY: ctx is open and picture is default-initialized
            let got = unsafe { dav1d_get_picture(Some(ctx), NonNull::new(&mut picture)) };
            if got.0 == 0 {
                return Ok(Picture { picture });
            }
            if got.0 != EAGAIN {
                return Err(Av1Error::new(got.0, "failed to get picture"));
            }
            if dav1d_data.sz == 0 || dav1d_data.sz == left {
                return Err(Av1Error::new(got.0, "payload holds no picture"));
            }
            left = dav1d_data.sz;
        }
    }
}

impl Drop for Av1Decoder {
    fn drop(&mut self) {
        if self.ctx.is_some() {
            // SAFETY: ctx was opened by dav1d_open and is closed once
            unsafe {
                dav1d_close(NonNull::new(&mut self.ctx));
            }
        }
    }
}

/// Decoded picture, unreferenced on drop
pub(super) struct Picture {
    picture: Dav1dPicture,
}

impl Picture {
    fn dimensions(&self) -> (u32, u32) {
        (self.picture.p.w as u32, self.picture.p.h as u32)
    }

    fn seq_hdr(&self) -> Option<&Rav1dSequenceHeader> {
        // SAFETY: the sequence header lives as long as the picture holds its reference
        self.picture
            .seq_hdr_ref
            .as_ref()
            .map(|arc| unsafe { &**arc.as_ref() })
    }

    /// Range and matrix signalled by the sequence header
    fn color_signal(&self) -> (Range, MatrixCoefficients) {
        let header = self.seq_hdr();
        let range = match header {
            Some(h) if h.color_range != 0 => Range::Full,
            _ => Range::Limited,
        };
        let matrix = header.map_or(MatrixCoefficients::BT601, |h| to_yuv_matrix(h.mtrx));
        (range, matrix)
    }

    fn copy_plane(&self, index: usize, width: u32, height: u32, dst: &mut [u8]) -> Result<(), Status> {
        let ptr = self.picture.data[index].ok_or(Status::ReformatFailed)?;
        let stride = self.picture.stride[index.min(1)] as usize;
        let width = width as usize;
        if width == 0 {
            return Ok(());
        }
        for (row, out) in dst.chunks_exact_mut(width).take(height as usize).enumerate() {
            // SAFETY: the plane holds `height` rows of `stride` bytes while the picture is referenced
            let src = unsafe {
                std::slice::from_raw_parts(ptr.as_ptr().cast::<u8>().add(row * stride), width)
            };
            out.copy_from_slice(src);
        }
        Ok(())
    }

    /// Copy the picture into an 8-bit planar image
    pub(super) fn to_planar(&self) -> Result<PlanarImage, Status> {
        if self.picture.p.bpc != 8 {
            return Err(Status::UnsupportedDepth);
        }
        let layout = match self.picture.p.layout {
            DAV1D_PIXEL_LAYOUT_I420 => PixelLayout::Yuv420,
            DAV1D_PIXEL_LAYOUT_I444 => PixelLayout::Yuv444,
            DAV1D_PIXEL_LAYOUT_I400 => PixelLayout::Yuv400,
            _ => return Err(Status::NotImplemented),
        };
        let (width, height) = self.dimensions();
        let mut planar = PlanarImage::new(width, height, 8, layout).ok_or(Status::OutOfMemory)?;
        let (cw, ch) = planar.chroma_size();
        let (y, u, v) = planar.planes_mut();
        self.copy_plane(0, width, height, y)?;
        if layout != PixelLayout::Yuv400 {
            self.copy_plane(1, cw, ch, u)?;
            self.copy_plane(2, cw, ch, v)?;
        }
        let (range, matrix) = self.color_signal();
        planar.set_color_signal(range, matrix);
        Ok(planar)
    }
}

impl Drop for Picture {
    fn drop(&mut self) {
        // SAFETY: picture was filled by dav1d_get_picture
        unsafe {
            dav1d_picture_unref(NonNull::new(&mut self.picture));
        }
    }
}

fn to_yuv_matrix(mc: Rav1dMatrixCoefficients) -> MatrixCoefficients {
    match mc {
        Rav1dMatrixCoefficients::IDENTITY => MatrixCoefficients::Identity,
        Rav1dMatrixCoefficients::BT709 => MatrixCoefficients::BT709,
        Rav1dMatrixCoefficients::FCC => MatrixCoefficients::FCC,
        Rav1dMatrixCoefficients::BT470BG => MatrixCoefficients::BT470BG,
        Rav1dMatrixCoefficients::BT601 => MatrixCoefficients::BT601,
        Rav1dMatrixCoefficients::SMPTE240 => MatrixCoefficients::SMPTE240,
        Rav1dMatrixCoefficients::SMPTE_YCGCO => MatrixCoefficients::YCgCo,
        Rav1dMatrixCoefficients::BT2020_NCL => MatrixCoefficients::BT2020NCL,
        Rav1dMatrixCoefficients::BT2020_CL => MatrixCoefficients::BT2020CL,
        _ => MatrixCoefficients::BT601,
    }
}
