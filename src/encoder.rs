//! Grid encoding pipeline
//!
//! [`GridEncoder`] splits the source into tiles no larger than the
//! configured tile limits, converts each tile to a planar unit, and hands
//! the complete row-major list to the engine as a single grid image.

use log::debug;

use crate::config::EncoderConfig;
use crate::engine::{AddImageFlags, EncoderSettings, Engine, Owned};
use crate::error::{Error, Result};
use crate::grid::TileGrid;
use crate::image::RgbaRef;
use crate::tile::TileBuilder;

/// Encodes RGBA images to AVIF through an [`Engine`]
///
/// # Example
///
/// ```no_run
/// use zenavif_grid::{EncoderConfig, GridEncoder, Rav1eEngine, RgbaRef};
///
/// let pixels = vec![255u8; 64 * 64 * 4];
/// let image = RgbaRef::packed(&pixels, 64, 64).unwrap();
/// let engine = Rav1eEngine::new();
/// let avif = GridEncoder::new(&engine, EncoderConfig::new().speed(8))
///     .encode(image)
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct GridEncoder<'e, E> {
    engine: &'e E,
    config: EncoderConfig,
}

impl<'e, E: Engine> GridEncoder<'e, E> {
    /// Create an encoder using `engine`
    pub fn new(engine: &'e E, config: EncoderConfig) -> Self {
        Self { engine, config }
    }

    /// Configuration in use
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode `image` into a complete AVIF file
    ///
    /// Options are validated before any buffer work. Every planar unit, the
    /// encoder context and the engine's output buffer are released before
    /// this returns, whether it succeeds or not.
    pub fn encode(&self, image: RgbaRef<'_>) -> Result<Vec<u8>> {
        self.config.validate()?;
        let (width, height) = (image.width(), image.height());
        let (max_w, max_h) = self.config.get_tile_limits();
        let grid = TileGrid::new(width, height, max_w, max_h)
            .ok_or(Error::InvalidDimensions { width, height })?;
        debug!(
            "encoding {width}x{height} as {}x{} tiles of up to {}x{}",
            grid.columns(),
            grid.rows(),
            grid.tile_size().0,
            grid.tile_size().1
        );

        let engine = self.engine;
        let mut builder = TileBuilder::new(engine, image, grid.max_tile_bytes())?;
        let mut cells: Vec<Owned<'e, E, E::Planar>> = Vec::with_capacity(grid.len());
        for tile in grid.tiles() {
            // on error, `cells` drops and releases everything built so far
            cells.push(builder.build(&tile)?);
        }
        drop(builder);

        let settings = EncoderSettings::from(&self.config);
        let encoder = engine
            .create_encoder(&settings)
            .ok_or(Error::Allocation("encoder context"))?;
        let mut encoder = Owned::new(engine, encoder, E::destroy_encoder);

        let refs: Vec<&E::Planar> = cells.iter().map(|cell| &**cell).collect();
        engine
            .add_image_grid(
                &mut encoder,
                grid.columns(),
                grid.rows(),
                &refs,
                AddImageFlags::SINGLE,
            )
            .map_err(Error::EncodeAssembly)?;
        drop(refs);

        let output = engine.finish(&mut encoder).map_err(Error::EncodeFinish)?;
        let output = Owned::new(engine, output, E::free_output);
        drop(encoder);
        drop(cells);

        let bytes = output.as_ref().to_vec();
        debug!("encoded {width}x{height} into {} bytes", bytes.len());
        Ok(bytes)
    }
}
