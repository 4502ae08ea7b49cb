//! Compression engine interface
//!
//! The encode and decode pipelines never touch AV1 or the container format
//! directly. They drive an [`Engine`], which hands out opaque handles
//! (planar images, encoder and decoder contexts, output buffers) and reports
//! failures as [`Status`] codes. [`Rav1eEngine`] is the built-in engine;
//! tests substitute their own.
//!
//! Every handle obtained from an engine is wrapped in an [`Owned`] guard,
//! which returns it to the engine exactly once.

mod rav1d;
mod rav1e;
pub(crate) mod yuv;

use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::config::CodecChoice;
use crate::image::ImageInfo;

pub use self::rav1e::{Rav1eDecoder, Rav1eEncoder, Rav1eEngine};
pub use self::yuv::{PlanarImage, RgbBuffer};

/// Failure code reported by an [`Engine`]
///
/// Success is `Ok(_)`; every variant here is a failure with a fixed
/// diagnostic string (see [`Status::as_str`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Status {
    /// Unclassified failure
    UnknownError,
    /// Missing or unrecognized `ftyp` brand
    InvalidFtyp,
    /// Nothing to encode or decode yet
    NoContent,
    /// Planar layout was not set
    NoYuvFormatSelected,
    /// Color transform could not be performed
    ReformatFailed,
    /// Bit depth is not supported
    UnsupportedDepth,
    /// AV1 encoding of the color planes failed
    EncodeColorFailed,
    /// AV1 encoding of the alpha plane failed
    EncodeAlphaFailed,
    /// Box structure is malformed
    BmffParseFailed,
    /// Primary item is missing or empty
    MissingImageItem,
    /// AV1 decoding of the color planes failed
    DecodeColorFailed,
    /// AV1 decoding of the alpha plane failed
    DecodeAlphaFailed,
    /// No codec can serve the request
    NoCodecAvailable,
    /// All images have already been decoded
    NoImagesRemaining,
    /// Grid shape or cell geometry is invalid
    InvalidImageGrid,
    /// Codec rejected its configuration
    InvalidCodecSpecificOption,
    /// Input ended inside a box
    TruncatedData,
    /// No input was attached
    IoNotSet,
    /// Argument out of range
    InvalidArgument,
    /// Feature is not implemented by this engine
    NotImplemented,
    /// Allocation failed
    OutOfMemory,
}

impl Status {
    /// Human-readable diagnostic for this status
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::UnknownError => "unknown error",
            Status::InvalidFtyp => "invalid ftyp",
            Status::NoContent => "no content",
            Status::NoYuvFormatSelected => "no YUV format selected",
            Status::ReformatFailed => "reformat failed",
            Status::UnsupportedDepth => "unsupported depth",
            Status::EncodeColorFailed => "encoding of color planes failed",
            Status::EncodeAlphaFailed => "encoding of alpha plane failed",
            Status::BmffParseFailed => "BMFF parsing failed",
            Status::MissingImageItem => "missing or empty image item",
            Status::DecodeColorFailed => "decoding of color planes failed",
            Status::DecodeAlphaFailed => "decoding of alpha plane failed",
            Status::NoCodecAvailable => "no codec available",
            Status::NoImagesRemaining => "no images remaining",
            Status::InvalidImageGrid => "invalid image grid",
            Status::InvalidCodecSpecificOption => "invalid codec-specific option",
            Status::TruncatedData => "truncated data",
            Status::IoNotSet => "IO not set",
            Status::InvalidArgument => "invalid argument",
            Status::NotImplemented => "not implemented",
            Status::OutOfMemory => "out of memory",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Status {}

/// Chroma layout of a planar image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PixelLayout {
    /// 4:2:0, chroma at half resolution both ways
    Yuv420,
    /// 4:4:4, no chroma subsampling
    Yuv444,
    /// Luma only
    Yuv400,
}

/// Flags for [`Engine::add_image_grid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddImageFlags(u32);

impl AddImageFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Force a keyframe
    pub const FORCE_KEYFRAME: Self = Self(1);
    /// The grid is the only image; no sequence follows
    pub const SINGLE: Self = Self(1 << 1);

    /// True if every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for AddImageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Settings copied into a new encoder context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct EncoderSettings {
    /// Requested AV1 backend
    pub codec: CodecChoice,
    /// 0 (slowest) to 10 (fastest)
    pub speed: u8,
    /// 0 (worst) to 100 (lossless)
    pub color_quality: u8,
    /// 0 (worst) to 100 (lossless)
    pub alpha_quality: u8,
    /// Worker threads, `None` for the codec default
    pub threads: Option<usize>,
}

impl From<&crate::config::EncoderConfig> for EncoderSettings {
    fn from(config: &crate::config::EncoderConfig) -> Self {
        Self {
            codec: config.codec,
            speed: config.speed,
            color_quality: config.color_quality,
            alpha_quality: config.alpha_quality,
            threads: config.threads,
        }
    }
}

/// Borrowed interleaved RGBA input for [`Engine::rgb_to_yuv`]
///
/// Channel order is always R, G, B, A.
#[derive(Debug, Clone, Copy)]
pub struct InterleavedRef<'a> {
    /// Pixel rows, `row_bytes` apart
    pub pixels: &'a [u8],
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes between the starts of consecutive rows
    pub row_bytes: usize,
    /// Bits per channel
    pub depth: u8,
}

impl InterleavedRef<'_> {
    /// Bytes of the `y`th row that hold pixels
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let start = y as usize * self.row_bytes;
        let len = self.width as usize * 4;
        self.pixels.get(start..start + len)
    }
}

/// Engine-owned interleaved RGBA output
pub trait RgbPixels {
    /// Width in pixels
    fn width(&self) -> u32;
    /// Height in pixels
    fn height(&self) -> u32;
    /// Bytes between the starts of consecutive rows, at least `width * 4`
    fn row_bytes(&self) -> usize;
    /// Pixel rows
    fn pixels(&self) -> &[u8];
}

/// AVIF compression engine
///
/// Handles are plain values owned by the caller; the `destroy_*`/`free_*`
/// methods give them back. The pipelines wrap each handle in an [`Owned`]
/// guard so every handle is released exactly once on every path.
pub trait Engine {
    /// Planar (YUV) image, one per tile
    type Planar;
    /// Encoder context
    type Encoder;
    /// Decoder context together with the image it produced
    type Decoder;
    /// Interleaved output of [`Engine::yuv_to_rgb`]
    type Rgb: RgbPixels;
    /// Encoded file returned by [`Engine::finish`]
    type Output: AsRef<[u8]>;

    /// Create an encoder context
    fn create_encoder(&self, settings: &EncoderSettings) -> Option<Self::Encoder>;

    /// Release an encoder context
    fn destroy_encoder(&self, encoder: Self::Encoder) {
        drop(encoder);
    }

    /// Allocate a planar image
    fn create_planar(
        &self,
        width: u32,
        height: u32,
        depth: u8,
        layout: PixelLayout,
    ) -> Option<Self::Planar>;

    /// Release a planar image
    fn destroy_planar(&self, planar: Self::Planar) {
        drop(planar);
    }

    /// Fill `planar` from interleaved RGBA of the same dimensions
    fn rgb_to_yuv(&self, planar: &mut Self::Planar, rgb: &InterleavedRef<'_>) -> Result<(), Status>;

    /// Encode `cells` as one `columns × rows` grid image
    ///
    /// `cells` are in row-major order. The engine only reads them.
    fn add_image_grid(
        &self,
        encoder: &mut Self::Encoder,
        columns: u32,
        rows: u32,
        cells: &[&Self::Planar],
        flags: AddImageFlags,
    ) -> Result<(), Status>;

    /// Produce the finished file
    fn finish(&self, encoder: &mut Self::Encoder) -> Result<Self::Output, Status>;

    /// Release an encoded file
    fn free_output(&self, output: Self::Output) {
        drop(output);
    }

    /// Create a decoder context
    fn create_decoder(&self, codec: CodecChoice) -> Option<Self::Decoder>;

    /// Release a decoder context and any image it holds
    fn destroy_decoder(&self, decoder: Self::Decoder) {
        drop(decoder);
    }

    /// Attach compressed input
    fn set_io_memory(&self, decoder: &mut Self::Decoder, data: &[u8]) -> Result<(), Status>;

    /// Parse the container header
    fn parse(&self, decoder: &mut Self::Decoder) -> Result<ImageInfo, Status>;

    /// Decode the next (for still images, the only) image
    fn next_image(&self, decoder: &mut Self::Decoder) -> Result<(), Status>;

    /// Convert the decoded image to 8-bit interleaved RGBA
    fn yuv_to_rgb(&self, decoder: &Self::Decoder) -> Result<Self::Rgb, Status>;

    /// Release an RGBA buffer
    fn free_rgb(&self, rgb: Self::Rgb) {
        drop(rgb);
    }
}

/// Scoped owner of an engine handle
///
/// Dereferences to the handle and passes it to its release function exactly
/// once, when dropped.
pub struct Owned<'e, E, H> {
    engine: &'e E,
    handle: Option<H>,
    release: fn(&E, H),
}

impl<'e, E, H> Owned<'e, E, H> {
    /// Take ownership of `handle`, to be released with `release`
    pub fn new(engine: &'e E, handle: H, release: fn(&E, H)) -> Self {
        Self {
            engine,
            handle: Some(handle),
            release,
        }
    }

    /// Engine the handle came from
    pub fn engine(&self) -> &'e E {
        self.engine
    }
}

impl<E, H> Deref for Owned<'_, E, H> {
    type Target = H;

    fn deref(&self) -> &H {
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("handle is only taken in drop"),
        }
    }
}

impl<E, H> DerefMut for Owned<'_, E, H> {
    fn deref_mut(&mut self) -> &mut H {
        match &mut self.handle {
            Some(handle) => handle,
            None => unreachable!("handle is only taken in drop"),
        }
    }
}

impl<E, H> Drop for Owned<'_, E, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            (self.release)(self.engine, handle);
        }
    }
}

impl<E, H: fmt::Debug> fmt::Debug for Owned<'_, E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}
