//! End-to-end tests with the built-in rav1e engine

use zenavif_grid::{
    CodecChoice, DecoderConfig, EncoderConfig, Error, RgbaRef, Status, decode, decode_with,
    encode_with, probe,
};

fn fast() -> EncoderConfig {
    EncoderConfig::new().speed(10)
}

fn gradient(width: u32, height: u32, alpha: u8) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x * 7) as u8, (y * 5) as u8, 90, alpha]);
        }
    }
    pixels
}

fn assert_ftyp(file: &[u8]) {
    assert_eq!(&file[4..8], b"ftyp");
    assert_eq!(&file[8..12], b"avif");
}

#[test]
fn single_image() {
    let pixels = [255, 0, 0, 255].repeat(10 * 10);
    let file = encode_with(RgbaRef::packed(&pixels, 10, 10).unwrap(), &fast()).unwrap();
    assert_ftyp(&file);

    let info = probe(&file).unwrap();
    assert_eq!((info.width, info.height), (10, 10));
    assert_eq!((info.tile_columns, info.tile_rows), (1, 1));
    assert_eq!(info.bit_depth, 8);
    assert!(!info.has_alpha);
}

#[test]
fn grid_image() {
    let pixels = gradient(100, 40, 255);
    let config = fast().tile_limits(64, 32);
    let file = encode_with(RgbaRef::packed(&pixels, 100, 40).unwrap(), &config).unwrap();
    assert_ftyp(&file);

    let info = probe(&file).unwrap();
    assert_eq!((info.width, info.height), (100, 40));
    assert_eq!((info.tile_columns, info.tile_rows), (2, 2));
    assert!(info.is_grid());
    assert!(!info.has_alpha);
}

#[test]
fn single_row_grid_with_odd_height() {
    let pixels = gradient(40, 15, 255);
    let config = fast().tile_limits(32, 16);
    let file = encode_with(RgbaRef::packed(&pixels, 40, 15).unwrap(), &config).unwrap();
    let info = probe(&file).unwrap();
    assert_eq!((info.width, info.height), (40, 15));
    assert_eq!((info.tile_columns, info.tile_rows), (2, 1));
}

#[test]
fn alpha_in_one_tile_gives_the_grid_alpha() {
    let mut pixels = gradient(32, 16, 255);
    pixels[3] = 0;
    let config = fast().tile_limits(16, 16);
    let file = encode_with(RgbaRef::packed(&pixels, 32, 16).unwrap(), &config).unwrap();
    let info = probe(&file).unwrap();
    assert_eq!(info.tile_columns, 2);
    assert!(info.has_alpha);
}

#[test]
fn translucent_single_image_has_alpha() {
    let pixels = gradient(12, 12, 128);
    let file = encode_with(RgbaRef::packed(&pixels, 12, 12).unwrap(), &fast()).unwrap();
    assert!(probe(&file).unwrap().has_alpha);
}

#[test]
fn lossless_quality_encodes() {
    let pixels = gradient(16, 16, 255);
    let config = fast().color_quality(100).alpha_quality(100);
    let file = encode_with(RgbaRef::packed(&pixels, 16, 16).unwrap(), &config).unwrap();
    assert_eq!(probe(&file).unwrap().width, 16);
}

fn assert_close(actual: [u8; 4], expected: [u8; 4], tolerance: u8) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            a.abs_diff(e) <= tolerance,
            "{actual:?} differs from {expected:?} by more than {tolerance}"
        );
    }
}

/// Four flat quadrants split at (`split_x`, `split_y`)
fn quadrants(width: u32, height: u32, split_x: u32, split_y: u32) -> Vec<u8> {
    const COLORS: [[u8; 4]; 4] = [
        [200, 40, 40, 255],
        [40, 200, 40, 255],
        [40, 40, 200, 255],
        [220, 220, 60, 255],
    ];
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let index = usize::from(x >= split_x) + 2 * usize::from(y >= split_y);
            pixels.extend_from_slice(&COLORS[index]);
        }
    }
    pixels
}

#[test]
fn red_square_round_trip() {
    let pixels = [255, 0, 0, 255].repeat(10 * 10);
    let image = RgbaRef::new(&pixels, 10, 10, 40).unwrap();
    let config = EncoderConfig::new()
        .speed(6)
        .color_quality(60)
        .alpha_quality(60);
    let file = encode_with(image, &config).unwrap();

    let decoded = decode(&file).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (10, 10));
    assert_eq!(decoded.pixels().len(), 10 * 10 * 4);
    for y in 0..10 {
        for x in 0..10 {
            assert_close(decoded.pixel(x, y), [255, 0, 0, 255], 24);
        }
    }
}

#[test]
fn decoded_size_matches_at_every_quality() {
    let pixels = gradient(30, 18, 255);
    for quality in [0, 60, 100] {
        let config = fast().color_quality(quality).alpha_quality(quality);
        let file = encode_with(RgbaRef::packed(&pixels, 30, 18).unwrap(), &config).unwrap();
        let info = probe(&file).unwrap();
        let decoded = decode(&file).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 18), "quality {quality}");
        assert_eq!((info.width, info.height), (decoded.width(), decoded.height()));
    }
}

#[test]
fn top_quality_keeps_flat_blocks() {
    let pixels = quadrants(32, 32, 16, 16);
    let config = fast().color_quality(100).alpha_quality(100);
    let file = encode_with(RgbaRef::packed(&pixels, 32, 32).unwrap(), &config).unwrap();
    let decoded = decode(&file).unwrap();
    let source = RgbaRef::packed(&pixels, 32, 32).unwrap();
    for y in 0..32 {
        for x in 0..32 {
            let i = (y * 32 + x) as usize * 4;
            let mut expected = [0; 4];
            expected.copy_from_slice(&source.pixels()[i..i + 4]);
            assert_close(decoded.pixel(x, y), expected, 4);
        }
    }
}

#[test]
fn translucent_alpha_survives_decoding() {
    let pixels = gradient(12, 12, 128);
    let config = fast().alpha_quality(100);
    let file = encode_with(RgbaRef::packed(&pixels, 12, 12).unwrap(), &config).unwrap();
    let decoded = decode(&file).unwrap();
    for y in 0..12 {
        for x in 0..12 {
            assert!(decoded.pixel(x, y)[3].abs_diff(128) <= 4);
        }
    }
}

#[test]
fn grid_decodes_to_the_full_canvas() {
    let pixels = quadrants(100, 40, 50, 20);
    let config = fast().color_quality(90).tile_limits(64, 32);
    let file = encode_with(RgbaRef::packed(&pixels, 100, 40).unwrap(), &config).unwrap();
    let info = probe(&file).unwrap();
    assert_eq!((info.tile_columns, info.tile_rows), (2, 2));

    let decoded = decode(&file).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (100, 40));
    assert_close(decoded.pixel(20, 8), [200, 40, 40, 255], 16);
    assert_close(decoded.pixel(80, 8), [40, 200, 40, 255], 16);
    assert_close(decoded.pixel(20, 32), [40, 40, 200, 255], 16);
    assert_close(decoded.pixel(80, 32), [220, 220, 60, 255], 16);
    assert_close(decoded.pixel(99, 39), [220, 220, 60, 255], 16);
}

#[test]
fn oversized_image_decodes_at_full_size() {
    let pixels = [30, 120, 210, 255].repeat(20000 * 1000);
    let file = encode_with(RgbaRef::packed(&pixels, 20000, 1000).unwrap(), &fast()).unwrap();
    let info = probe(&file).unwrap();
    assert_eq!(info.tile_columns, 2);

    let decoded = decode(&file).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (20000, 1000));
    assert_eq!((info.width, info.height), (decoded.width(), decoded.height()));
    assert_close(decoded.pixel(19999, 999), [30, 120, 210, 255], 16);
}

#[test]
fn frame_size_limit_is_checked_before_decoding() {
    let pixels = gradient(8, 8, 255);
    let file = encode_with(RgbaRef::packed(&pixels, 8, 8).unwrap(), &fast()).unwrap();
    let config = DecoderConfig::new().frame_size_limit(10);
    assert!(matches!(
        decode_with(&file, &config),
        Err(Error::ImageTooLarge { width: 8, height: 8 })
    ));
    assert!(decode_with(&file, &DecoderConfig::new().frame_size_limit(64)).is_ok());
}

#[test]
fn unavailable_codec_is_reported() {
    let pixels = gradient(8, 8, 255);
    let config = fast().codec(CodecChoice::Aom);
    let err = encode_with(RgbaRef::packed(&pixels, 8, 8).unwrap(), &config).unwrap_err();
    assert!(matches!(err, Error::EncodeAssembly(Status::NoCodecAvailable)));
    assert_eq!(err.status(), Some(Status::NoCodecAvailable));
}

#[test]
fn bad_input() {
    assert!(matches!(decode(&[]), Err(Error::EmptyInput)));
    assert!(matches!(probe(&[]), Err(Error::EmptyInput)));
    assert!(matches!(
        decode(b"definitely not an avif file"),
        Err(Error::DecodeParse(_))
    ));
    assert!(matches!(probe(&[0u8; 64]), Err(Error::DecodeParse(_))));
}

#[test]
fn option_errors_name_the_option() {
    let pixels = gradient(8, 8, 255);
    let image = RgbaRef::packed(&pixels, 8, 8).unwrap();
    let err = encode_with(image, &EncoderConfig::new().color_quality(150)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "color quality must be between 0 and 100, got 150"
    );
}
