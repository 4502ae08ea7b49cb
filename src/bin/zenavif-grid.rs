//! Command-line AVIF encoder and decoder

use std::error::Error;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use zenavif_grid::{EncoderConfig, RgbaImage, RgbaRef};

#[derive(Debug, Parser)]
#[command(name = "zenavif-grid", version, about = "Encode and decode AVIF images of any size")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encode an image (PNG, JPEG) to AVIF
    #[command(visible_alias = "enc")]
    Encode {
        input: PathBuf,
        output: PathBuf,
        /// 0 (slowest, best) to 10 (fastest)
        #[arg(short, long, default_value_t = EncoderConfig::DEFAULT_SPEED)]
        speed: u8,
        /// 0 (worst) to 100 (lossless)
        #[arg(short, long, default_value_t = EncoderConfig::DEFAULT_QUALITY)]
        alpha_quality: u8,
        /// 0 (worst) to 100 (lossless)
        #[arg(short, long, default_value_t = EncoderConfig::DEFAULT_QUALITY)]
        color_quality: u8,
    },
    /// Decode an AVIF file to PNG
    #[command(visible_alias = "dec")]
    Decode { input: PathBuf, output: PathBuf },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    let result = match cli.command {
        Command::Encode {
            input,
            output,
            speed,
            alpha_quality,
            color_quality,
        } => {
            let config = EncoderConfig::new()
                .speed(speed)
                .alpha_quality(alpha_quality)
                .color_quality(color_quality);
            encode_file(&input, &output, &config)
        }
        Command::Decode { input, output } => decode_file(&input, &output),
    };

    match result {
        Ok((width, height, bytes)) => {
            println!(
                "{width}x{height}, {bytes} bytes written in {:.2?}",
                start.elapsed()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(u32, u32, usize), Box<dyn Error>>;

fn encode_file(input: &Path, output: &Path, config: &EncoderConfig) -> CliResult {
    let rgba = image::open(input)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let image = RgbaRef::packed(rgba.as_raw(), width, height)?;
    let avif = zenavif_grid::encode_with(image, config)?;
    fs::write(output, &avif).map_err(zenavif_grid::Error::from)?;
    Ok((width, height, avif.len()))
}

fn decode_file(input: &Path, output: &Path) -> CliResult {
    let data = fs::read(input).map_err(zenavif_grid::Error::from)?;
    let decoded: RgbaImage = zenavif_grid::decode(&data)?;
    let (width, height) = (decoded.width(), decoded.height());
    let png = image::RgbaImage::from_raw(width, height, decoded.into_vec())
        .ok_or("decoded buffer does not match its dimensions")?;
    let mut encoded = Vec::new();
    png.write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)?;
    fs::write(output, &encoded).map_err(zenavif_grid::Error::from)?;
    Ok((width, height, encoded.len()))
}
