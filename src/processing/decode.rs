use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use image::{RgbaImage, imageops};
use tracing::debug;

/// Decode an image file into RGBA8, rotated/flipped upright per its EXIF orientation.
pub fn decode_upright(path: &Path) -> Result<RgbaImage> {
    let decoded = image::ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to sniff format of {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;

    let orientation = exif_orientation(path).unwrap_or(1);
    Ok(apply_orientation(decoded.to_rgba8(), orientation))
}

/// EXIF orientation values 2-8; anything else leaves the image untouched.
fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

fn exif_orientation(path: &Path) -> Option<u16> {
    let mut reader = BufReader::new(File::open(path).ok()?);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let value = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)?;
    let orientation = u16::try_from(value).ok()?;
    debug!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}
