//! Encoder and decoder configuration

use crate::error::Error;
use crate::grid::{MAX_TILE_HEIGHT, MAX_TILE_WIDTH};

/// AV1 codec backend requested from the engine
///
/// Engines report [`Status::NoCodecAvailable`](crate::Status::NoCodecAvailable)
/// for choices they cannot serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum CodecChoice {
    /// Let the engine pick
    #[default]
    Auto,
    /// rav1e (encode only)
    Rav1e,
    /// dav1d (decode only)
    Dav1d,
    /// libaom
    Aom,
    /// SVT-AV1 (encode only)
    Svt,
}

/// Configuration for AVIF encoding
///
/// Uses a builder pattern matching [`DecoderConfig`]. Values are checked
/// when an encode starts, before any pixel data is touched.
///
/// # Example
///
/// ```
/// use zenavif_grid::EncoderConfig;
///
/// let config = EncoderConfig::new()
///     .color_quality(80)
///     .alpha_quality(90)
///     .speed(8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub(crate) speed: u8,
    pub(crate) color_quality: u8,
    pub(crate) alpha_quality: u8,
    pub(crate) threads: Option<usize>,
    pub(crate) codec: CodecChoice,
    pub(crate) max_tile_width: u32,
    pub(crate) max_tile_height: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            speed: Self::DEFAULT_SPEED,
            color_quality: Self::DEFAULT_QUALITY,
            alpha_quality: Self::DEFAULT_QUALITY,
            threads: None,
            codec: CodecChoice::Auto,
            max_tile_width: MAX_TILE_WIDTH,
            max_tile_height: MAX_TILE_HEIGHT,
        }
    }
}

impl EncoderConfig {
    /// Default encoder speed
    pub const DEFAULT_SPEED: u8 = 6;
    /// Default color and alpha quality
    pub const DEFAULT_QUALITY: u8 = 60;
    /// Fastest speed setting
    pub const MAX_SPEED: u8 = 10;
    /// Lossless quality setting
    pub const MAX_QUALITY: u8 = 100;

    /// Create a new encoder configuration with default settings
    ///
    /// Defaults: speed 6, color quality 60, alpha quality 60
    pub fn new() -> Self {
        Self::default()
    }

    /// Set encoding speed (0 = slowest/best, 10 = fastest/worst)
    pub fn speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }

    /// Set color quality (0 = worst, 100 = lossless)
    pub fn color_quality(mut self, quality: u8) -> Self {
        self.color_quality = quality;
        self
    }

    /// Set alpha quality (0 = worst, 100 = lossless)
    pub fn alpha_quality(mut self, quality: u8) -> Self {
        self.alpha_quality = quality;
        self
    }

    /// Set encoder thread count (`None` = codec default)
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Select the AV1 encoder backend
    pub fn codec(mut self, codec: CodecChoice) -> Self {
        self.codec = codec;
        self
    }

    /// Override the maximum tile size used when splitting large images
    ///
    /// Images larger than this in either dimension are encoded as a grid.
    /// Both values must be even and no larger than 16384×8704.
    pub fn tile_limits(mut self, max_width: u32, max_height: u32) -> Self {
        self.max_tile_width = max_width;
        self.max_tile_height = max_height;
        self
    }

    /// Encoding speed
    pub fn get_speed(&self) -> u8 {
        self.speed
    }

    /// Color quality
    pub fn get_color_quality(&self) -> u8 {
        self.color_quality
    }

    /// Alpha quality
    pub fn get_alpha_quality(&self) -> u8 {
        self.alpha_quality
    }

    /// Maximum tile width and height
    pub fn get_tile_limits(&self) -> (u32, u32) {
        (self.max_tile_width, self.max_tile_height)
    }

    /// Check every option against its allowed range
    ///
    /// Fields are checked in order (speed, color quality, alpha quality,
    /// tile limits) and the first violation is reported.
    pub fn validate(&self) -> Result<(), Error> {
        check_range("speed", self.speed.into(), 0, Self::MAX_SPEED.into())?;
        check_range(
            "color quality",
            self.color_quality.into(),
            0,
            Self::MAX_QUALITY.into(),
        )?;
        check_range(
            "alpha quality",
            self.alpha_quality.into(),
            0,
            Self::MAX_QUALITY.into(),
        )?;
        check_range("max tile width", self.max_tile_width, 2, MAX_TILE_WIDTH)?;
        check_range("max tile height", self.max_tile_height, 2, MAX_TILE_HEIGHT)?;
        if self.max_tile_width % 2 != 0 || self.max_tile_height % 2 != 0 {
            return Err(Error::InvalidBuffer("tile limits must be even"));
        }
        Ok(())
    }
}

fn check_range(option: &'static str, value: u32, min: u32, max: u32) -> Result<(), Error> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidOption {
            option,
            value,
            min,
            max,
        })
    }
}

/// Configuration for AVIF decoding
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// Maximum frame size limit in pixels (0 = no limit)
    pub(crate) frame_size_limit: u64,
    pub(crate) codec: CodecChoice,
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum frame size limit in total pixels
    ///
    /// If width * height exceeds this limit, decoding fails with
    /// [`Error::ImageTooLarge`] before any pixel work. 0 means no limit.
    pub fn frame_size_limit(mut self, limit: u64) -> Self {
        self.frame_size_limit = limit;
        self
    }

    /// Select the AV1 decoder backend
    pub fn codec(mut self, codec: CodecChoice) -> Self {
        self.codec = codec;
        self
    }

    pub(crate) fn check_size(&self, width: u32, height: u32) -> Result<(), Error> {
        let pixels = u64::from(width) * u64::from(height);
        if self.frame_size_limit != 0 && pixels > self.frame_size_limit {
            return Err(Error::ImageTooLarge { width, height });
        }
        Ok(())
    }
}
