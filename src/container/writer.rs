//! AVIF grid file writer

use super::{ALPHA_URN, GridDescriptor};
use crate::engine::Status;

const ESSENTIAL: u8 = 0x80;
const HIDDEN: u32 = 1;

// colr nclx values: BT.709 primaries, sRGB transfer, BT.601 matrix
const COLOR_PRIMARIES: u16 = 1;
const TRANSFER_CHARACTERISTICS: u16 = 13;
const MATRIX_COEFFICIENTS: u16 = 6;

/// Everything needed to write one grid image
#[derive(Debug)]
pub(crate) struct GridFile<'a> {
    pub grid: GridDescriptor,
    pub tile_width: u32,
    pub tile_height: u32,
    /// av1C body of the color tiles
    pub color_config: &'a [u8],
    /// Row-major AV1 payloads
    pub color_tiles: &'a [Vec<u8>],
    /// av1C body and payloads of the alpha tiles
    pub alpha: Option<(&'a [u8], &'a [Vec<u8>])>,
}

fn write_box(out: &mut Vec<u8>, typ: &[u8; 4], body: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(typ);
    body(out);
    let size = (out.len() - start) as u32;
    out[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn write_full_box(out: &mut Vec<u8>, typ: &[u8; 4], version: u8, flags: u32, body: impl FnOnce(&mut Vec<u8>)) {
    write_box(out, typ, |out| {
        out.push(version);
        out.extend_from_slice(&flags.to_be_bytes()[1..]);
        body(out);
    });
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

struct Location {
    id: u16,
    in_idat: bool,
    offset: u32,
    length: u32,
}

struct Item {
    id: u16,
    typ: &'static [u8; 4],
    hidden: bool,
    props: Vec<u8>,
}

/// Item ids and payload placement, independent of the final mdat offset
struct Plan<'a> {
    file: &'a GridFile<'a>,
    items: Vec<Item>,
    idat: Vec<u8>,
    color_grid: u16,
    color_tile_ids: Vec<u16>,
    alpha_grid: Option<u16>,
    alpha_tile_ids: Vec<u16>,
}

impl<'a> Plan<'a> {
    fn new(file: &'a GridFile<'a>) -> Result<Self, Status> {
        let n = file.color_tiles.len();
        let cells = file.grid.columns as usize * file.grid.rows as usize;
        if n == 0 || n != cells || file.alpha.is_some_and(|(_, a)| a.len() != n) {
            return Err(Status::InvalidImageGrid);
        }
        let item_count = if file.alpha.is_some() { 2 * n + 2 } else { n + 1 };
        if item_count > usize::from(u16::MAX) {
            return Err(Status::InvalidImageGrid);
        }

        // ipco indices, 1-based
        const GRID_ISPE: u8 = 1;
        const PIXI_COLOR: u8 = 2;
        const COLR: u8 = 3;
        const TILE_ISPE: u8 = 4;
        const AV1C_COLOR: u8 = 5;
        const PIXI_ALPHA: u8 = 6;
        const AV1C_ALPHA: u8 = 7;
        const AUXC_ALPHA: u8 = 8;

        let descriptor = file.grid.to_bytes();
        let mut idat = descriptor.clone();
        let mut items = vec![Item {
            id: 1,
            typ: b"grid",
            hidden: false,
            props: vec![GRID_ISPE, PIXI_COLOR, COLR],
        }];
        let color_tile_ids: Vec<u16> = (2..2 + n as u16).collect();
        for &id in &color_tile_ids {
            items.push(Item {
                id,
                typ: b"av01",
                hidden: true,
                props: vec![TILE_ISPE, AV1C_COLOR | ESSENTIAL, PIXI_COLOR, COLR],
            });
        }

        let (alpha_grid, alpha_tile_ids) = if file.alpha.is_some() {
            let grid_id = n as u16 + 2;
            idat.extend_from_slice(&descriptor);
            items.push(Item {
                id: grid_id,
                typ: b"grid",
                hidden: false,
                props: vec![GRID_ISPE, PIXI_ALPHA, AUXC_ALPHA | ESSENTIAL],
            });
            let ids: Vec<u16> = (grid_id + 1..grid_id + 1 + n as u16).collect();
            for &id in &ids {
                items.push(Item {
                    id,
                    typ: b"av01",
                    hidden: true,
                    props: vec![TILE_ISPE, AV1C_ALPHA | ESSENTIAL, PIXI_ALPHA, AUXC_ALPHA | ESSENTIAL],
                });
            }
            (Some(grid_id), ids)
        } else {
            (None, Vec::new())
        };

        Ok(Self {
            file,
            items,
            idat,
            color_grid: 1,
            color_tile_ids,
            alpha_grid,
            alpha_tile_ids,
        })
    }

    fn payloads(&self) -> impl Iterator<Item = &'a Vec<u8>> {
        let alpha = self.file.alpha.map(|(_, tiles)| tiles).unwrap_or(&[]);
        self.file.color_tiles.iter().chain(alpha.iter())
    }

    fn locations(&self, mdat_data_start: u64) -> Result<Vec<Location>, Status> {
        let descriptor_len = self.idat.len() as u32 / if self.alpha_grid.is_some() { 2 } else { 1 };
        let mut locations = vec![Location {
            id: self.color_grid,
            in_idat: true,
            offset: 0,
            length: descriptor_len,
        }];
        if let Some(id) = self.alpha_grid {
            locations.push(Location {
                id,
                in_idat: true,
                offset: descriptor_len,
                length: descriptor_len,
            });
        }
        let mut offset = mdat_data_start;
        let ids = self.color_tile_ids.iter().chain(&self.alpha_tile_ids);
        for (&id, payload) in ids.zip(self.payloads()) {
            let start = u32::try_from(offset).map_err(|_| Status::NotImplemented)?;
            let length = u32::try_from(payload.len()).map_err(|_| Status::NotImplemented)?;
            locations.push(Location {
                id,
                in_idat: false,
                offset: start,
                length,
            });
            offset += payload.len() as u64;
        }
        u32::try_from(offset).map_err(|_| Status::NotImplemented)?;
        Ok(locations)
    }

    fn write_meta(&self, out: &mut Vec<u8>, mdat_data_start: u64) -> Result<(), Status> {
        let mut locations = self.locations(mdat_data_start)?;
        locations.sort_by_key(|l| l.id);
        let file = self.file;

        write_full_box(out, b"meta", 0, 0, |out| {
            write_full_box(out, b"hdlr", 0, 0, |out| {
                put_u32(out, 0);
                out.extend_from_slice(b"pict");
                out.extend_from_slice(&[0; 12]);
                out.push(0);
            });
            write_full_box(out, b"pitm", 0, 0, |out| put_u16(out, self.color_grid));
            write_full_box(out, b"iloc", 1, 0, |out| {
                out.push(0x44); // offset_size 4, length_size 4
                out.push(0x00); // base_offset_size 0, index_size 0
                put_u16(out, locations.len() as u16);
                for loc in &locations {
                    put_u16(out, loc.id);
                    put_u16(out, u16::from(loc.in_idat));
                    put_u16(out, 0);
                    put_u16(out, 1);
                    put_u32(out, loc.offset);
                    put_u32(out, loc.length);
                }
            });
            write_full_box(out, b"iinf", 0, 0, |out| {
                put_u16(out, self.items.len() as u16);
                for item in &self.items {
                    let flags = if item.hidden { HIDDEN } else { 0 };
                    write_full_box(out, b"infe", 2, flags, |out| {
                        put_u16(out, item.id);
                        put_u16(out, 0);
                        out.extend_from_slice(item.typ);
                        out.push(0);
                    });
                }
            });
            write_full_box(out, b"iref", 0, 0, |out| {
                write_reference(out, b"dimg", self.color_grid, &self.color_tile_ids);
                if let Some(alpha_grid) = self.alpha_grid {
                    write_reference(out, b"dimg", alpha_grid, &self.alpha_tile_ids);
                    write_reference(out, b"auxl", alpha_grid, &[self.color_grid]);
                }
            });
            write_box(out, b"iprp", |out| {
                write_box(out, b"ipco", |out| {
                    write_ispe(out, file.grid.output_width, file.grid.output_height);
                    write_pixi(out, 3);
                    write_box(out, b"colr", |out| {
                        out.extend_from_slice(b"nclx");
                        put_u16(out, COLOR_PRIMARIES);
                        put_u16(out, TRANSFER_CHARACTERISTICS);
                        put_u16(out, MATRIX_COEFFICIENTS);
                        out.push(0x80); // full range
                    });
                    write_ispe(out, file.tile_width, file.tile_height);
                    write_box(out, b"av1C", |out| out.extend_from_slice(file.color_config));
                    if let Some((alpha_config, _)) = file.alpha {
                        write_pixi(out, 1);
                        write_box(out, b"av1C", |out| out.extend_from_slice(alpha_config));
                        write_full_box(out, b"auxC", 0, 0, |out| {
                            out.extend_from_slice(ALPHA_URN.as_bytes());
                            out.push(0);
                        });
                    }
                });
                write_full_box(out, b"ipma", 0, 0, |out| {
                    put_u32(out, self.items.len() as u32);
                    for item in &self.items {
                        put_u16(out, item.id);
                        out.push(item.props.len() as u8);
                        out.extend_from_slice(&item.props);
                    }
                });
            });
            write_box(out, b"idat", |out| out.extend_from_slice(&self.idat));
        });
        Ok(())
    }
}

fn write_reference(out: &mut Vec<u8>, typ: &[u8; 4], from: u16, to: &[u16]) {
    write_box(out, typ, |out| {
        put_u16(out, from);
        put_u16(out, to.len() as u16);
        for &id in to {
            put_u16(out, id);
        }
    });
}

fn write_ispe(out: &mut Vec<u8>, width: u32, height: u32) {
    write_full_box(out, b"ispe", 0, 0, |out| {
        put_u32(out, width);
        put_u32(out, height);
    });
}

fn write_pixi(out: &mut Vec<u8>, channels: u8) {
    write_full_box(out, b"pixi", 0, 0, |out| {
        out.push(channels);
        out.extend(std::iter::repeat_n(8u8, channels.into()));
    });
}

/// Serialize a grid image into a complete AVIF file
pub(crate) fn write_grid(file: &GridFile<'_>) -> Result<Vec<u8>, Status> {
    let plan = Plan::new(file)?;

    let mut out = Vec::new();
    write_box(&mut out, b"ftyp", |out| {
        out.extend_from_slice(b"avif");
        put_u32(out, 0);
        out.extend_from_slice(b"avifmif1miaf");
    });

    // Field widths are fixed, so the meta size does not depend on the offsets
    let mut sizing = Vec::new();
    plan.write_meta(&mut sizing, 0)?;
    let mdat_data_start = (out.len() + sizing.len() + 8) as u64;
    plan.write_meta(&mut out, mdat_data_start)?;
    debug_assert_eq!(out.len() as u64 + 8, mdat_data_start);

    let payload_len: usize = plan.payloads().map(Vec::len).sum();
    out.try_reserve(payload_len + 8).map_err(|_| Status::OutOfMemory)?;
    write_box(&mut out, b"mdat", |out| {
        for payload in plan.payloads() {
            out.extend_from_slice(payload);
        }
    });
    Ok(out)
}
