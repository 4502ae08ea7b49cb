//! In-memory engine that stores raw RGBA instead of AV1 and keeps a ledger
//! of every handle it hands out.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use zenavif_grid::engine::{AddImageFlags, EncoderSettings, InterleavedRef, PixelLayout, RgbPixels};
use zenavif_grid::{CodecChoice, Engine, ImageInfo, Status};

const MAGIC: &[u8; 4] = b"FAKE";
const HEADER_LEN: usize = 20;
/// Extra bytes at the end of every row returned by `yuv_to_rgb`
pub const RGB_ROW_PADDING: usize = 12;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Step at which the engine reports a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fail {
    /// The nth (0-based) planar allocation returns nothing
    CreatePlanar(usize),
    /// The nth (0-based) RGB to YUV conversion fails
    Convert(usize),
    CreateEncoder,
    AddGrid,
    Finish,
    CreateDecoder,
    Parse,
    NextImage,
    ToRgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Planar,
    Encoder,
    Output,
    Decoder,
    Rgb,
}

#[derive(Debug, Default)]
pub struct Ledger {
    live: BTreeSet<(Kind, u32)>,
    created: Vec<(Kind, u32)>,
    released: Vec<(Kind, u32)>,
    double_released: usize,
}

impl Ledger {
    pub fn created(&self, kind: Kind) -> usize {
        self.created.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn released(&self, kind: Kind) -> usize {
        self.released.iter().filter(|(k, _)| *k == kind).count()
    }
}

/// What `add_image_grid` was called with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCall {
    pub columns: u32,
    pub rows: u32,
    pub cell_sizes: Vec<(u32, u32)>,
    pub flags: AddImageFlags,
}

#[derive(Debug)]
pub struct FakePlanar {
    id: u32,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

#[derive(Debug)]
pub struct FakeEncoder {
    id: u32,
    settings: EncoderSettings,
    image: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct FakeOutput {
    id: u32,
    bytes: Vec<u8>,
}

impl AsRef<[u8]> for FakeOutput {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug)]
pub struct FakeDecoder {
    id: u32,
    data: Option<Vec<u8>>,
    info: Option<ImageInfo>,
    decoded: bool,
}

#[derive(Debug)]
pub struct FakeRgb {
    id: u32,
    width: u32,
    height: u32,
    row_bytes: usize,
    pixels: Vec<u8>,
}

impl RgbPixels for FakeRgb {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[derive(Debug, Default)]
pub struct FakeEngine {
    fail: Option<Fail>,
    next_id: Cell<u32>,
    planar_calls: Cell<usize>,
    convert_calls: Cell<usize>,
    ledger: RefCell<Ledger>,
    grid_calls: RefCell<Vec<GridCall>>,
    settings: Cell<Option<EncoderSettings>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(fail: Fail) -> Self {
        Self {
            fail: Some(fail),
            ..Self::default()
        }
    }

    pub fn ledger(&self) -> std::cell::Ref<'_, Ledger> {
        self.ledger.borrow()
    }

    pub fn grid_calls(&self) -> Vec<GridCall> {
        self.grid_calls.borrow().clone()
    }

    pub fn last_settings(&self) -> Option<EncoderSettings> {
        self.settings.get()
    }

    /// Every handle was released exactly once
    pub fn assert_balanced(&self) {
        let ledger = self.ledger.borrow();
        assert!(ledger.live.is_empty(), "leaked handles: {:?}", ledger.live);
        assert_eq!(ledger.double_released, 0, "handles released twice");
        assert_eq!(ledger.created.len(), ledger.released.len());
    }

    fn fails(&self, step: Fail) -> bool {
        self.fail == Some(step)
    }

    fn acquire(&self, kind: Kind) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let mut ledger = self.ledger.borrow_mut();
        ledger.live.insert((kind, id));
        ledger.created.push((kind, id));
        id
    }

    fn release(&self, kind: Kind, id: u32) {
        let mut ledger = self.ledger.borrow_mut();
        if !ledger.live.remove(&(kind, id)) {
            ledger.double_released += 1;
        }
        ledger.released.push((kind, id));
    }
}

impl Engine for FakeEngine {
    type Planar = FakePlanar;
    type Encoder = FakeEncoder;
    type Decoder = FakeDecoder;
    type Rgb = FakeRgb;
    type Output = FakeOutput;

    fn create_encoder(&self, settings: &EncoderSettings) -> Option<FakeEncoder> {
        if self.fails(Fail::CreateEncoder) {
            return None;
        }
        self.settings.set(Some(*settings));
        Some(FakeEncoder {
            id: self.acquire(Kind::Encoder),
            settings: *settings,
            image: None,
        })
    }

    fn destroy_encoder(&self, encoder: FakeEncoder) {
        self.release(Kind::Encoder, encoder.id);
    }

    fn create_planar(&self, width: u32, height: u32, depth: u8, layout: PixelLayout) -> Option<FakePlanar> {
        let n = self.planar_calls.get();
        self.planar_calls.set(n + 1);
        if self.fails(Fail::CreatePlanar(n)) || depth != 8 || layout != PixelLayout::Yuv420 {
            return None;
        }
        Some(FakePlanar {
            id: self.acquire(Kind::Planar),
            width,
            height,
            rgba: Vec::new(),
        })
    }

    fn destroy_planar(&self, planar: FakePlanar) {
        self.release(Kind::Planar, planar.id);
    }

    fn rgb_to_yuv(&self, planar: &mut FakePlanar, rgb: &InterleavedRef<'_>) -> Result<(), Status> {
        let n = self.convert_calls.get();
        self.convert_calls.set(n + 1);
        if self.fails(Fail::Convert(n)) {
            return Err(Status::ReformatFailed);
        }
        if (rgb.width, rgb.height) != (planar.width, planar.height) {
            return Err(Status::ReformatFailed);
        }
        planar.rgba.clear();
        for y in 0..rgb.height {
            planar.rgba.extend_from_slice(rgb.row(y).ok_or(Status::ReformatFailed)?);
        }
        Ok(())
    }

    fn add_image_grid(
        &self,
        encoder: &mut FakeEncoder,
        columns: u32,
        rows: u32,
        cells: &[&FakePlanar],
        flags: AddImageFlags,
    ) -> Result<(), Status> {
        self.grid_calls.borrow_mut().push(GridCall {
            columns,
            rows,
            cell_sizes: cells.iter().map(|c| (c.width, c.height)).collect(),
            flags,
        });
        if self.fails(Fail::AddGrid) {
            return Err(Status::EncodeColorFailed);
        }
        if cells.len() != (columns * rows) as usize || cells.is_empty() {
            return Err(Status::InvalidImageGrid);
        }
        let cols = columns as usize;
        let (tile_w, tile_h) = (cells[0].width as usize, cells[0].height as usize);
        let width: u32 = cells[..cols].iter().map(|c| c.width).sum();
        let height: u32 = cells.iter().step_by(cols).map(|c| c.height).sum();
        let stride = width as usize * 4;
        let mut pixels = vec![0u8; stride * height as usize];
        for (i, cell) in cells.iter().enumerate() {
            let (x0, y0) = ((i % cols) * tile_w, (i / cols) * tile_h);
            let row_len = cell.width as usize * 4;
            for (y, row) in cell.rgba.chunks_exact(row_len).enumerate() {
                let start = (y0 + y) * stride + x0 * 4;
                pixels[start..start + row_len].copy_from_slice(row);
            }
        }

        let mut file = Vec::with_capacity(HEADER_LEN + pixels.len());
        file.extend_from_slice(MAGIC);
        for v in [width, height, columns, rows] {
            file.extend_from_slice(&v.to_le_bytes());
        }
        file.extend_from_slice(&pixels);
        encoder.image = Some(file);
        Ok(())
    }

    fn finish(&self, encoder: &mut FakeEncoder) -> Result<FakeOutput, Status> {
        if self.fails(Fail::Finish) {
            return Err(Status::UnknownError);
        }
        let bytes = encoder.image.take().ok_or(Status::NoContent)?;
        Ok(FakeOutput {
            id: self.acquire(Kind::Output),
            bytes,
        })
    }

    fn free_output(&self, output: FakeOutput) {
        self.release(Kind::Output, output.id);
    }

    fn create_decoder(&self, _codec: CodecChoice) -> Option<FakeDecoder> {
        if self.fails(Fail::CreateDecoder) {
            return None;
        }
        Some(FakeDecoder {
            id: self.acquire(Kind::Decoder),
            data: None,
            info: None,
            decoded: false,
        })
    }

    fn destroy_decoder(&self, decoder: FakeDecoder) {
        self.release(Kind::Decoder, decoder.id);
    }

    fn set_io_memory(&self, decoder: &mut FakeDecoder, data: &[u8]) -> Result<(), Status> {
        decoder.data = Some(data.to_vec());
        Ok(())
    }

    fn parse(&self, decoder: &mut FakeDecoder) -> Result<ImageInfo, Status> {
        if self.fails(Fail::Parse) {
            return Err(Status::BmffParseFailed);
        }
        let data = decoder.data.as_deref().ok_or(Status::IoNotSet)?;
        if data.len() < HEADER_LEN || &data[..4] != MAGIC {
            return Err(Status::InvalidFtyp);
        }
        let field = |i: usize| {
            let at = 4 + i * 4;
            u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };
        let (width, height) = (field(0), field(1));
        let pixels = &data[HEADER_LEN..];
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(Status::TruncatedData);
        }
        let has_alpha = pixels.chunks_exact(4).any(|p| p[3] < 255);
        let info = ImageInfo::new(width, height)
            .with_alpha(has_alpha)
            .with_grid(field(2), field(3));
        decoder.info = Some(info);
        Ok(info)
    }

    fn next_image(&self, decoder: &mut FakeDecoder) -> Result<(), Status> {
        if self.fails(Fail::NextImage) {
            return Err(Status::DecodeColorFailed);
        }
        if decoder.info.is_none() {
            return Err(Status::NoContent);
        }
        if decoder.decoded {
            return Err(Status::NoImagesRemaining);
        }
        decoder.decoded = true;
        Ok(())
    }

    fn yuv_to_rgb(&self, decoder: &FakeDecoder) -> Result<FakeRgb, Status> {
        if self.fails(Fail::ToRgb) {
            return Err(Status::ReformatFailed);
        }
        let (info, data) = match (&decoder.info, &decoder.data) {
            (Some(info), Some(data)) if decoder.decoded => (info, data),
            _ => return Err(Status::NoContent),
        };
        let packed = info.width as usize * 4;
        let row_bytes = packed + RGB_ROW_PADDING;
        let mut pixels = vec![0xEE; row_bytes * info.height as usize];
        for (dst, src) in pixels
            .chunks_exact_mut(row_bytes)
            .zip(data[HEADER_LEN..].chunks_exact(packed))
        {
            dst[..packed].copy_from_slice(src);
        }
        Ok(FakeRgb {
            id: self.acquire(Kind::Rgb),
            width: info.width,
            height: info.height,
            row_bytes,
            pixels,
        })
    }

    fn free_rgb(&self, rgb: FakeRgb) {
        self.release(Kind::Rgb, rgb.id);
    }
}

/// Packed RGBA filled with one color
pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.repeat(width as usize * height as usize)
}

/// Packed RGBA where every pixel encodes its own position
pub fn positional(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[x as u8, (x >> 8) as u8, y as u8, 255]);
        }
    }
    pixels
}

/// Header-only fake file, for dimension checks
pub fn fake_header(width: u32, height: u32) -> Vec<u8> {
    let mut file = MAGIC.to_vec();
    for v in [width, height, 1, 1] {
        file.extend_from_slice(&v.to_le_bytes());
    }
    file
}
