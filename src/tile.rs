//! Per-tile extraction and conversion

use log::trace;

use crate::convert;
use crate::engine::{Engine, Owned};
use crate::error::{Error, Result};
use crate::geometry;
use crate::grid::TileDescriptor;
use crate::image::RgbaRef;

/// Builds one planar unit per tile, reusing a single scratch buffer
///
/// Each tile is copied out of the source (honouring its stride) into the
/// scratch buffer with a packed `tile_width * 4` stride, then converted.
pub(crate) struct TileBuilder<'e, 'i, E> {
    engine: &'e E,
    source: RgbaRef<'i>,
    scratch: Vec<u8>,
}

impl<'e, 'i, E: Engine> TileBuilder<'e, 'i, E> {
    /// Allocate a scratch buffer of `max_tile_bytes` up front
    pub(crate) fn new(engine: &'e E, source: RgbaRef<'i>, max_tile_bytes: usize) -> Result<Self> {
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(max_tile_bytes)
            .map_err(|_| Error::Allocation("tile scratch buffer"))?;
        scratch.resize(max_tile_bytes, 0);
        Ok(Self {
            engine,
            source,
            scratch,
        })
    }

    /// Extract and convert one tile
    ///
    /// Failures are reported as [`Error::TileBuild`] carrying the tile's
    /// column and row. Nothing built by this call outlives a failure.
    pub(crate) fn build(&mut self, tile: &TileDescriptor) -> Result<Owned<'e, E, E::Planar>> {
        self.build_inner(tile).map_err(|source| Error::TileBuild {
            column: tile.column,
            row: tile.row,
            source: Box::new(source),
        })
    }

    fn build_inner(&mut self, tile: &TileDescriptor) -> Result<Owned<'e, E, E::Planar>> {
        let rect = tile.rect;
        let stride = rect.row_bytes();
        let len = stride * rect.height() as usize;
        let scratch = self
            .scratch
            .get_mut(..len)
            .ok_or(Error::InvalidBuffer("tile is larger than the scratch buffer"))?;
        geometry::copy_rect(self.source.pixels(), self.source.stride(), rect, scratch, stride)?;
        trace!(
            "tile ({},{}): {}x{} at ({},{})",
            tile.column,
            tile.row,
            rect.width(),
            rect.height(),
            rect.x0,
            rect.y0
        );
        convert::to_planar(self.engine, scratch, rect.width(), rect.height(), stride)
    }
}
