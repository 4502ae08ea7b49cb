//! Single-image decoding and header probing

use log::debug;

use crate::config::DecoderConfig;
use crate::convert;
use crate::engine::{Engine, Owned};
use crate::error::{Error, Result};
use crate::image::{ImageInfo, RgbaImage};

/// Decodes AVIF files through an [`Engine`]
///
/// Only the primary image is decoded; image sequences are not exposed.
#[derive(Debug)]
pub struct ImageDecoder<'e, E> {
    engine: &'e E,
    config: DecoderConfig,
}

impl<'e, E: Engine> ImageDecoder<'e, E> {
    /// Create a decoder using `engine`
    pub fn new(engine: &'e E, config: DecoderConfig) -> Self {
        Self { engine, config }
    }

    /// Decode `data` to packed RGBA
    pub fn decode(&self, data: &[u8]) -> Result<RgbaImage> {
        let (mut decoder, info) = self.open(data)?;
        self.config.check_size(info.width, info.height)?;
        self.engine
            .next_image(&mut decoder)
            .map_err(Error::DecodeImage)?;
        convert::to_interleaved(self.engine, &decoder)
    }

    /// Parse only the container header
    ///
    /// No pixel data is decoded.
    pub fn probe(&self, data: &[u8]) -> Result<ImageInfo> {
        let (_decoder, info) = self.open(data)?;
        Ok(info)
    }

    fn open(&self, data: &[u8]) -> Result<(Owned<'e, E, E::Decoder>, ImageInfo)> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        let engine = self.engine;
        let decoder = engine
            .create_decoder(self.config.codec)
            .ok_or(Error::Allocation("decoder context"))?;
        let mut decoder = Owned::new(engine, decoder, E::destroy_decoder);
        engine
            .set_io_memory(&mut decoder, data)
            .map_err(Error::DecodeParse)?;
        let info = engine.parse(&mut decoder).map_err(Error::DecodeParse)?;
        if info.width == 0 || info.height == 0 {
            return Err(Error::InvalidDimensions {
                width: info.width,
                height: info.height,
            });
        }
        debug!("parsed header: {}x{}", info.width, info.height);
        Ok((decoder, info))
    }
}
