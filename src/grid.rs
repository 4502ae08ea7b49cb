//! Tile partitioning for images larger than one AV1 frame

use crate::geometry::Rect;

/// Largest tile width an AV1 still picture in a grid may use
pub const MAX_TILE_WIDTH: u32 = 16384;
/// Largest tile height an AV1 still picture in a grid may use
pub const MAX_TILE_HEIGHT: u32 = 8704;

/// One cell of a [`TileGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDescriptor {
    /// Column index, 0-based
    pub column: u32,
    /// Row index, 0-based
    pub row: u32,
    /// Pixels covered by this tile, clipped to the image
    pub rect: Rect,
}

/// Row-major partition of an image into tiles of at most `max_tile_width × max_tile_height`
///
/// Tile `(column, row)` sits at index `row * columns + column`, which is the
/// order grid assembly expects its cells in. Only the last column and the
/// last row can be smaller than the nominal tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    columns: u32,
    rows: u32,
}

impl TileGrid {
    /// Partition a `width × height` image
    ///
    /// Returns `None` if any argument is zero.
    pub fn new(width: u32, height: u32, max_tile_width: u32, max_tile_height: u32) -> Option<Self> {
        if width == 0 || height == 0 || max_tile_width == 0 || max_tile_height == 0 {
            return None;
        }
        let tile_width = max_tile_width.min(width);
        let tile_height = max_tile_height.min(height);
        Some(Self {
            width,
            height,
            tile_width,
            tile_height,
            columns: width.div_ceil(tile_width),
            rows: height.div_ceil(tile_height),
        })
    }

    /// Number of tile columns
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of tile rows
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of tiles
    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Always false; a grid has at least one tile
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Nominal tile size (the size of every tile not on the right or bottom edge)
    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    /// Bytes needed to hold the largest tile as packed RGBA
    pub fn max_tile_bytes(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * 4
    }

    /// Descriptor for the tile at `(column, row)`
    pub fn tile(&self, column: u32, row: u32) -> Option<TileDescriptor> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        let x0 = column * self.tile_width;
        let y0 = row * self.tile_height;
        Some(TileDescriptor {
            column,
            row,
            rect: Rect {
                x0,
                y0,
                x1: x0.saturating_add(self.tile_width).min(self.width),
                y1: y0.saturating_add(self.tile_height).min(self.height),
            },
        })
    }

    /// All tiles, row by row
    pub fn tiles(&self) -> impl Iterator<Item = TileDescriptor> + '_ {
        (0..self.rows).flat_map(move |row| {
            (0..self.columns).filter_map(move |column| self.tile(column, row))
        })
    }
}

/// Partition `width × height` into row-major tile descriptors
///
/// Empty when any argument is zero.
pub fn partition(
    width: u32,
    height: u32,
    max_tile_width: u32,
    max_tile_height: u32,
) -> Vec<TileDescriptor> {
    TileGrid::new(width, height, max_tile_width, max_tile_height)
        .map(|grid| grid.tiles().collect())
        .unwrap_or_default()
}
