//! # zenavif-grid
//!
//! AVIF encoding for RGBA images of any size, powered by
//! [rav1e](https://github.com/xiph/rav1e), and AVIF decoding back to RGBA.
//!
//! AV1 limits a single coded frame to 16384×8704 pixels in a grid. Larger
//! images are split into a grid of tiles, each tile is converted to 4:2:0
//! YUV and coded independently, and the tiles are stored as one HEIF `grid`
//! image that decoders reassemble.
//!
//! ## Quick Start
//!
//! ```no_run
//! use zenavif_grid::{encode, RgbaRef};
//!
//! let width = 20000;
//! let height = 1000;
//! let pixels = vec![255u8; width * height * 4];
//! let image = RgbaRef::packed(&pixels, width as u32, height as u32).unwrap();
//!
//! let avif = encode(image).unwrap();
//! let info = zenavif_grid::probe(&avif).unwrap();
//! assert_eq!((info.width, info.height), (20000, 1000));
//! assert_eq!(info.tile_columns, 2);
//! ```
//!
//! ## Configuration
//!
//! ```no_run
//! use zenavif_grid::{encode_with, EncoderConfig, RgbaRef};
//!
//! let config = EncoderConfig::new()
//!     .speed(8)
//!     .color_quality(80)
//!     .alpha_quality(90);
//!
//! let pixels = vec![0u8; 64 * 64 * 4];
//! let image = RgbaRef::packed(&pixels, 64, 64).unwrap();
//! let avif = encode_with(image, &config).unwrap();
//! ```
//!
//! ## Engines
//!
//! The pipelines are generic over [`Engine`], the capability that owns AV1
//! coding and the container format. [`Rav1eEngine`] is used by the free
//! functions; [`GridEncoder`] and [`ImageDecoder`] accept any engine.
//! `Rav1eEngine` decodes with rav1d and reads containers with zenavif-parse.
//! Only 8-bit images are decoded; the alpha plane of a grid image is not
//! reassembled, so grid images decode opaque.

mod config;
mod container;
mod convert;
mod decoder;
mod encoder;
pub mod engine;
mod error;
mod geometry;
pub mod grid;
mod image;
mod tile;

pub use config::{CodecChoice, DecoderConfig, EncoderConfig};
pub use decoder::ImageDecoder;
pub use encoder::GridEncoder;
pub use engine::{Engine, Rav1eEngine, Status};
pub use error::{Error, Result};
pub use geometry::Rect;
pub use grid::{MAX_TILE_HEIGHT, MAX_TILE_WIDTH, TileDescriptor, TileGrid, partition};
pub use image::{ImageInfo, RgbaImage, RgbaRef};

/// Encode an RGBA image to AVIF with default settings
///
/// Defaults: speed 6, color quality 60, alpha quality 60.
pub fn encode(image: RgbaRef<'_>) -> Result<Vec<u8>> {
    encode_with(image, &EncoderConfig::default())
}

/// Encode an RGBA image to AVIF with custom settings
///
/// # Example
///
/// ```no_run
/// use zenavif_grid::{encode_with, EncoderConfig, RgbaRef};
///
/// let pixels = [255, 0, 0, 255].repeat(10 * 10);
/// let image = RgbaRef::new(&pixels, 10, 10, 40).unwrap();
/// let avif = encode_with(image, &EncoderConfig::new().speed(10)).unwrap();
/// assert!(!avif.is_empty());
/// ```
pub fn encode_with(image: RgbaRef<'_>, config: &EncoderConfig) -> Result<Vec<u8>> {
    let engine = Rav1eEngine::new();
    GridEncoder::new(&engine, config.clone()).encode(image)
}

/// Decode an AVIF file to RGBA with default settings
pub fn decode(data: &[u8]) -> Result<RgbaImage> {
    decode_with(data, &DecoderConfig::default())
}

/// Decode an AVIF file to RGBA with custom settings
pub fn decode_with(data: &[u8], config: &DecoderConfig) -> Result<RgbaImage> {
    let engine = Rav1eEngine::new();
    ImageDecoder::new(&engine, config.clone()).decode(data)
}

/// Read image dimensions and layout from an AVIF header without decoding pixels
///
/// # Example
///
/// ```no_run
/// let avif_data = std::fs::read("image.avif").unwrap();
/// let info = zenavif_grid::probe(&avif_data).unwrap();
/// println!("{}x{}", info.width, info.height);
/// ```
pub fn probe(data: &[u8]) -> Result<ImageInfo> {
    let engine = Rav1eEngine::new();
    ImageDecoder::new(&engine, DecoderConfig::default()).probe(data)
}
