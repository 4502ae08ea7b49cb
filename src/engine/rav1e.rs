//! Built-in engine: rav1e encodes, rav1d decodes, zenavif-parse reads the container

use core::fmt;

use ::rav1e::prelude::*;
use zenavif_parse::{AV1Metadata, AvifParser, DecodeConfig, Unstoppable};
use log::{debug, trace, warn};

use super::rav1d::Av1Decoder;
use super::yuv::{PlanarImage, RgbBuffer};
use super::{AddImageFlags, Engine, EncoderSettings, InterleavedRef, PixelLayout, Status};
use crate::config::CodecChoice;
use crate::container::GridDescriptor;
use crate::container::writer::{self, GridFile};
use crate::image::ImageInfo;

/// HEIF grids store `rows - 1` and `columns - 1` in one byte each
const MAX_GRID_DIMENSION: u32 = 256;

/// Engine backed by the rav1e AV1 encoder and the rav1d AV1 decoder
///
/// Encodes 8-bit 4:2:0 still images, with alpha as a separate monochrome
/// item, and writes single images or grids. Decodes 8-bit single images and
/// grids, including the alpha of single images.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rav1eEngine;

impl Rav1eEngine {
    /// Create the engine
    pub fn new() -> Self {
        Self
    }
}

/// One AV1 still picture and its `av1C` configuration record
#[derive(Debug)]
struct Av1Still {
    data: Vec<u8>,
    config: Vec<u8>,
}

#[derive(Debug)]
enum Encoded {
    Single {
        width: u32,
        height: u32,
        color: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
    Grid {
        descriptor: GridDescriptor,
        tile_width: u32,
        tile_height: u32,
        color: Vec<Av1Still>,
        alpha: Option<Vec<Av1Still>>,
    },
}

/// Encoder context of [`Rav1eEngine`]
#[derive(Debug)]
pub struct Rav1eEncoder {
    settings: EncoderSettings,
    encoded: Option<Encoded>,
}

/// Decoder context of [`Rav1eEngine`]
pub struct Rav1eDecoder {
    codec: CodecChoice,
    data: Option<Vec<u8>>,
    parsed: Option<Parsed>,
    image: Option<PlanarImage>,
}

impl fmt::Debug for Rav1eDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rav1eDecoder")
            .field("codec", &self.codec)
            .field("input_len", &self.data.as_ref().map(Vec::len))
            .field("info", &self.parsed.as_ref().map(|p| p.info))
            .field("decoded", &self.image.is_some())
            .finish()
    }
}

/// Container header of the attached input
struct Parsed {
    parser: AvifParser<'static>,
    info: ImageInfo,
    grid: Option<GridDescriptor>,
}

/// Map 0–100 quality onto rav1e's 0–255 quantizer; 100 is lossless
fn quantizer(quality: u8) -> usize {
    let quality = usize::from(quality.min(100));
    ((100 - quality) * 255 + 50) / 100
}

fn encode_still(
    width: u32,
    height: u32,
    chroma_sampling: ChromaSampling,
    planes: &[(&[u8], usize)],
    quality: u8,
    settings: &EncoderSettings,
) -> Result<Av1Still, String> {
    let q = quantizer(quality);
    let color_description = (chroma_sampling != ChromaSampling::Cs400).then_some(ColorDescription {
        color_primaries: ColorPrimaries::BT709,
        transfer_characteristics: TransferCharacteristics::SRGB,
        matrix_coefficients: MatrixCoefficients::BT601,
    });
    let enc = EncoderConfig {
        width: width as usize,
        height: height as usize,
        bit_depth: 8,
        chroma_sampling,
        chroma_sample_position: ChromaSamplePosition::Unknown,
        pixel_range: PixelRange::Full,
        color_description,
        still_picture: true,
        quantizer: q,
        min_quantizer: q as u8,
        speed_settings: SpeedSettings::from_preset(settings.speed),
        ..Default::default()
    };
    let cfg = Config::new()
        .with_encoder_config(enc)
        .with_threads(settings.threads.unwrap_or(0));
    let mut ctx: Context<u8> = cfg.new_context().map_err(|e| e.to_string())?;

    let mut frame = ctx.new_frame();
    for (dst, &(src, stride)) in frame.planes.iter_mut().zip(planes) {
        dst.copy_from_raw_u8(src, stride, 1);
    }
    ctx.send_frame(frame).map_err(|e| e.to_string())?;
    ctx.flush();

    let mut data = Vec::new();
    loop {
        match ctx.receive_packet() {
            Ok(mut packet) => {
                if packet.frame_type == FrameType::KEY {
                    data.append(&mut packet.data);
                }
            }
            Err(EncoderStatus::Encoded) => {}
            Err(EncoderStatus::LimitReached) => break,
            Err(err) => return Err(err.to_string()),
        }
    }
    Ok(Av1Still {
        data,
        config: ctx.container_sequence_header(),
    })
}

fn encode_color(cell: &PlanarImage, settings: &EncoderSettings) -> Result<Av1Still, Status> {
    let (w, cw) = (cell.width() as usize, cell.chroma_size().0 as usize);
    let planes = [(cell.luma(), w), (cell.cb(), cw), (cell.cr(), cw)];
    encode_still(
        cell.width(),
        cell.height(),
        ChromaSampling::Cs420,
        &planes,
        settings.color_quality,
        settings,
    )
    .map_err(|e| {
        warn!("rav1e color encode failed: {e}");
        Status::EncodeColorFailed
    })
}

fn encode_alpha(cell: &PlanarImage, settings: &EncoderSettings) -> Result<Av1Still, Status> {
    let planes = [(cell.alpha_plane(), cell.width() as usize)];
    encode_still(
        cell.width(),
        cell.height(),
        ChromaSampling::Cs400,
        &planes,
        settings.alpha_quality,
        settings,
    )
    .map_err(|e| {
        warn!("rav1e alpha encode failed: {e}");
        Status::EncodeAlphaFailed
    })
}

/// Check cell geometry and return (tile width, tile height, output width, output height)
fn grid_geometry(columns: u32, rows: u32, cells: &[&PlanarImage]) -> Result<(u32, u32, u32, u32), Status> {
    if !(1..=MAX_GRID_DIMENSION).contains(&columns) || !(1..=MAX_GRID_DIMENSION).contains(&rows) {
        return Err(Status::InvalidImageGrid);
    }
    if cells.len() != (columns * rows) as usize {
        return Err(Status::InvalidImageGrid);
    }
    let cols = columns as usize;
    let (tile_w, tile_h) = (cells[0].width(), cells[0].height());
    let last_w = cells[cols - 1].width();
    let last_h = cells[cells.len() - cols].height();
    for (i, cell) in cells.iter().enumerate() {
        if cell.layout() != PixelLayout::Yuv420 {
            return Err(Status::NoYuvFormatSelected);
        }
        if cell.depth() != 8 {
            return Err(Status::UnsupportedDepth);
        }
        let (col, row) = (i % cols, i / cols);
        let want_w = if col + 1 == cols { last_w } else { tile_w };
        let want_h = if row + 1 == rows as usize { last_h } else { tile_h };
        if cell.width() != want_w || cell.height() != want_h || want_w > tile_w || want_h > tile_h {
            return Err(Status::InvalidImageGrid);
        }
    }
    // 4:2:0 cells must split the output on chroma sample boundaries
    if (columns > 1 && tile_w % 2 != 0) || (rows > 1 && tile_h % 2 != 0) {
        return Err(Status::InvalidImageGrid);
    }
    Ok((
        tile_w,
        tile_h,
        (columns - 1) * tile_w + last_w,
        (rows - 1) * tile_h + last_h,
    ))
}

impl Engine for Rav1eEngine {
    type Planar = PlanarImage;
    type Encoder = Rav1eEncoder;
    type Decoder = Rav1eDecoder;
    type Rgb = RgbBuffer;
    type Output = Vec<u8>;

    fn create_encoder(&self, settings: &EncoderSettings) -> Option<Rav1eEncoder> {
        Some(Rav1eEncoder {
            settings: *settings,
            encoded: None,
        })
    }

    fn create_planar(&self, width: u32, height: u32, depth: u8, layout: PixelLayout) -> Option<PlanarImage> {
        PlanarImage::new(width, height, depth, layout)
    }

    fn rgb_to_yuv(&self, planar: &mut PlanarImage, rgb: &InterleavedRef<'_>) -> Result<(), Status> {
        planar.fill_from_rgba(rgb)
    }

    fn add_image_grid(
        &self,
        encoder: &mut Rav1eEncoder,
        columns: u32,
        rows: u32,
        cells: &[&PlanarImage],
        flags: AddImageFlags,
    ) -> Result<(), Status> {
        if !flags.contains(AddImageFlags::SINGLE) {
            return Err(Status::NotImplemented);
        }
        if encoder.encoded.is_some() {
            return Err(Status::InvalidArgument);
        }
        if !matches!(encoder.settings.codec, CodecChoice::Auto | CodecChoice::Rav1e) {
            return Err(Status::NoCodecAvailable);
        }
        let (tile_width, tile_height, width, height) = grid_geometry(columns, rows, cells)?;
        let has_alpha = cells.iter().any(|c| !c.is_opaque());
        let settings = &encoder.settings;
        debug!(
            "rav1e: {width}x{height} as {columns}x{rows} grid of {tile_width}x{tile_height}, alpha: {has_alpha}, speed {}",
            settings.speed
        );

        if let [cell] = cells {
            let color = encode_color(cell, settings)?;
            let alpha = has_alpha.then(|| encode_alpha(cell, settings)).transpose()?;
            encoder.encoded = Some(Encoded::Single {
                width,
                height,
                color: color.data,
                alpha: alpha.map(|a| a.data),
            });
            return Ok(());
        }

        let mut color = Vec::with_capacity(cells.len());
        let mut alpha = Vec::with_capacity(if has_alpha { cells.len() } else { 0 });
        for (i, cell) in cells.iter().enumerate() {
            let padded;
            let cell = if (cell.width(), cell.height()) == (tile_width, tile_height) {
                *cell
            } else {
                padded = cell.padded_to(tile_width, tile_height).ok_or(Status::OutOfMemory)?;
                &padded
            };
            let c = encode_color(cell, settings)?;
            trace!("rav1e: cell {i} color {} bytes", c.data.len());
            color.push(c);
            if has_alpha {
                let a = encode_alpha(cell, settings)?;
                trace!("rav1e: cell {i} alpha {} bytes", a.data.len());
                alpha.push(a);
            }
        }
        encoder.encoded = Some(Encoded::Grid {
            descriptor: GridDescriptor {
                columns,
                rows,
                output_width: width,
                output_height: height,
            },
            tile_width,
            tile_height,
            color,
            alpha: has_alpha.then_some(alpha),
        });
        Ok(())
    }

    fn finish(&self, encoder: &mut Rav1eEncoder) -> Result<Vec<u8>, Status> {
        match encoder.encoded.take().ok_or(Status::NoContent)? {
            Encoded::Single {
                width,
                height,
                color,
                alpha,
            } => {
                let mut out = Vec::new();
                avif_serialize::Aviffy::new()
                    .set_chroma_subsampling((true, true))
                    .set_seq_profile(0)
                    .set_full_color_range(true)
                    .set_matrix_coefficients(avif_serialize::constants::MatrixCoefficients::Bt601)
                    .write(&mut out, &color, alpha.as_deref(), width, height, 8)
                    .map_err(|e| {
                        warn!("avif-serialize failed: {e}");
                        Status::InvalidArgument
                    })?;
                Ok(out)
            }
            Encoded::Grid {
                descriptor,
                tile_width,
                tile_height,
                color,
                alpha,
            } => {
                let color_config = color.first().map(|c| c.config.clone()).unwrap_or_default();
                let color_tiles: Vec<Vec<u8>> = color.into_iter().map(|c| c.data).collect();
                let alpha = alpha.map(|tiles| {
                    let config = tiles.first().map(|a| a.config.clone()).unwrap_or_default();
                    let data: Vec<Vec<u8>> = tiles.into_iter().map(|a| a.data).collect();
                    (config, data)
                });
                writer::write_grid(&GridFile {
                    grid: descriptor,
                    tile_width,
                    tile_height,
                    color_config: &color_config,
                    color_tiles: &color_tiles,
                    alpha: alpha.as_ref().map(|(c, d)| (c.as_slice(), d.as_slice())),
                })
            }
        }
    }

    fn create_decoder(&self, codec: CodecChoice) -> Option<Rav1eDecoder> {
        Some(Rav1eDecoder {
            codec,
            data: None,
            parsed: None,
            image: None,
        })
    }

    fn set_io_memory(&self, decoder: &mut Rav1eDecoder, data: &[u8]) -> Result<(), Status> {
        let mut copy = Vec::new();
        copy.try_reserve_exact(data.len()).map_err(|_| Status::OutOfMemory)?;
        copy.extend_from_slice(data);
        decoder.data = Some(copy);
        decoder.parsed = None;
        decoder.image = None;
        Ok(())
    }

    fn parse(&self, decoder: &mut Rav1eDecoder) -> Result<ImageInfo, Status> {
        let data = decoder.data.take().ok_or(Status::IoNotSet)?;
        let config = DecodeConfig::unlimited()
            .with_max_grid_tiles(MAX_GRID_DIMENSION * MAX_GRID_DIMENSION)
            .lenient(true);
        let parser = AvifParser::from_owned_with_config(data, &config, &Unstoppable).map_err(parse_status)?;
        let (info, grid) = read_header(&parser)?;
        debug!(
            "parsed {}x{} AVIF, {}x{} tiles, alpha: {}",
            info.width, info.height, info.tile_columns, info.tile_rows, info.has_alpha
        );
        decoder.parsed = Some(Parsed { parser, info, grid });
        Ok(info)
    }

    fn next_image(&self, decoder: &mut Rav1eDecoder) -> Result<(), Status> {
        let parsed = decoder.parsed.as_ref().ok_or(Status::NoContent)?;
        if decoder.image.is_some() {
            return Err(Status::NoImagesRemaining);
        }
        if !matches!(decoder.codec, CodecChoice::Auto | CodecChoice::Dav1d) {
            return Err(Status::NoCodecAvailable);
        }
        let mut av1 = Av1Decoder::new().map_err(|e| {
            warn!("rav1d: {e}");
            Status::DecodeColorFailed
        })?;

        let mut image = match parsed.grid {
            None => {
                let payload = parsed.parser.primary_data().map_err(parse_status)?;
                decode_payload(&mut av1, &payload, Status::DecodeColorFailed)?
            }
            Some(grid) => decode_grid(&mut av1, &parsed.parser, grid)?,
        };
        if (image.width(), image.height()) != (parsed.info.width, parsed.info.height) {
            warn!(
                "decoded {}x{}, header says {}x{}",
                image.width(),
                image.height(),
                parsed.info.width,
                parsed.info.height
            );
            return Err(Status::DecodeColorFailed);
        }

        match parsed.parser.alpha_data() {
            Some(_) if parsed.grid.is_some() => {
                // the parser exposes the cells of the primary grid only
                warn!("alpha of a grid image is not decoded");
            }
            Some(payload) => {
                let payload = payload.map_err(parse_status)?;
                let alpha = decode_payload(&mut av1, &payload, Status::DecodeAlphaFailed)?;
                image.set_alpha(&alpha).map_err(|_| Status::DecodeAlphaFailed)?;
            }
            None => {}
        }
        decoder.image = Some(image);
        Ok(())
    }

    fn yuv_to_rgb(&self, decoder: &Rav1eDecoder) -> Result<RgbBuffer, Status> {
        decoder.image.as_ref().ok_or(Status::NoContent)?.to_rgba()
    }
}

fn parse_status(err: zenavif_parse::Error) -> Status {
    debug!("container: {err}");
    match err {
        zenavif_parse::Error::UnexpectedEOF => Status::TruncatedData,
        zenavif_parse::Error::OutOfMemory => Status::OutOfMemory,
        zenavif_parse::Error::Unsupported(_) => Status::NotImplemented,
        _ => Status::BmffParseFailed,
    }
}

/// Image header and grid layout of a parsed file
fn read_header(parser: &AvifParser<'_>) -> Result<(ImageInfo, Option<GridDescriptor>), Status> {
    let has_alpha = parser.alpha_data().is_some();
    if parser.grid_config().is_none() {
        let meta = parser.primary_metadata().map_err(parse_status)?;
        let info = ImageInfo::new(meta.max_frame_width.get(), meta.max_frame_height.get())
            .with_bit_depth(meta.bit_depth)
            .with_alpha(has_alpha);
        return Ok((info, None));
    }

    let payload = parser.primary_data().map_err(parse_status)?;
    let grid = GridDescriptor::from_bytes(&payload).ok_or(Status::InvalidImageGrid)?;
    if parser.grid_tile_count() != (grid.columns * grid.rows) as usize {
        return Err(Status::InvalidImageGrid);
    }
    let first = parser.tile_data(0).map_err(parse_status)?;
    let meta = AV1Metadata::parse_av1_bitstream(&first).map_err(parse_status)?;
    let info = ImageInfo::new(grid.output_width, grid.output_height)
        .with_bit_depth(meta.bit_depth)
        .with_alpha(has_alpha)
        .with_grid(grid.columns, grid.rows);
    Ok((info, Some(grid)))
}

fn decode_payload(av1: &mut Av1Decoder, payload: &[u8], failure: Status) -> Result<PlanarImage, Status> {
    let picture = av1.decode(payload).map_err(|e| {
        warn!("rav1d: {e}");
        failure
    })?;
    picture.to_planar()
}

/// Decode every cell and assemble them into the grid's output image
fn decode_grid(av1: &mut Av1Decoder, parser: &AvifParser<'_>, grid: GridDescriptor) -> Result<PlanarImage, Status> {
    let cols = grid.columns as usize;
    let mut out: Option<PlanarImage> = None;
    let mut tile_size = (0, 0);
    for i in 0..(grid.columns * grid.rows) as usize {
        let payload = parser.tile_data(i).map_err(parse_status)?;
        let tile = decode_payload(av1, &payload, Status::DecodeColorFailed)?;
        trace!("rav1d: cell {i} is {}x{}", tile.width(), tile.height());

        if i == 0 {
            tile_size = (tile.width(), tile.height());
            check_cell_size(grid, tile_size)?;
            let mut image = PlanarImage::new(grid.output_width, grid.output_height, 8, tile.layout())
                .ok_or(Status::OutOfMemory)?;
            let (range, matrix) = tile.color_signal();
            image.set_color_signal(range, matrix);
            out = Some(image);
        } else if (tile.width(), tile.height()) != tile_size {
            return Err(Status::InvalidImageGrid);
        }
        let image = out.as_mut().ok_or(Status::InvalidImageGrid)?;
        let (col, row) = ((i % cols) as u32, (i / cols) as u32);
        image.place(&tile, col * tile_size.0, row * tile_size.1)?;
    }
    out.ok_or(Status::InvalidImageGrid)
}

/// Cells must cover the output, and the last row and column must reach into it
fn check_cell_size(grid: GridDescriptor, (width, height): (u32, u32)) -> Result<(), Status> {
    let covers = |cells: u32, size: u32, output: u32| {
        let size = u64::from(size);
        u64::from(cells) * size >= u64::from(output) && u64::from(cells - 1) * size < u64::from(output)
    };
    if covers(grid.columns, width, grid.output_width) && covers(grid.rows, height, grid.output_height) {
        Ok(())
    } else {
        Err(Status::InvalidImageGrid)
    }
}
