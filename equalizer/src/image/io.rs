use std::path::Path;

use ::image as image_lib;
use image_lib::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};

use super::{ChannelLayout, IntensityImage, RawImage};
use crate::common::{Error, Result};

/// File extensions the decoder adapter reads and writes.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "pgm", "ppm", "pnm", "pam", "tiff", "tif"];

/// Decodes an image file into samples plus its source range.
///
/// 8-bit color types report a maximum sample value of 255, 16-bit ones 65535.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RawImage> {
    let path = path.as_ref();
    let malformed = |reason: String| {
        Error::MalformedInput(format!("{}: {}", path.display(), reason))
    };

    let img = image_lib::ImageReader::open(path)
        .map_err(|e| malformed(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| malformed(e.to_string()))?
        .decode()
        .map_err(|e| malformed(e.to_string()))?;

    let (width, height) = (img.width(), img.height());

    let (channels, max_value, samples) = match img {
        DynamicImage::ImageLuma8(buf) => (1, 255, widen(buf.into_raw())),
        DynamicImage::ImageLumaA8(buf) => (2, 255, widen(buf.into_raw())),
        DynamicImage::ImageRgb8(buf) => (3, 255, widen(buf.into_raw())),
        DynamicImage::ImageRgba8(buf) => (4, 255, widen(buf.into_raw())),
        DynamicImage::ImageLuma16(buf) => (1, u16::MAX, buf.into_raw()),
        DynamicImage::ImageLumaA16(buf) => (2, u16::MAX, buf.into_raw()),
        DynamicImage::ImageRgb16(buf) => (3, u16::MAX, buf.into_raw()),
        DynamicImage::ImageRgba16(buf) => (4, u16::MAX, buf.into_raw()),
        other => {
            return Err(Error::MalformedInput(format!(
                "{}: unsupported sample type {:?}",
                path.display(),
                other.color()
            )));
        }
    };

    tracing::debug!(
        path = %path.display(),
        width,
        height,
        channels,
        max_value,
        "Decoded image"
    );

    RawImage::new(width, height, channels, max_value, samples)
}

fn widen(bytes: Vec<u8>) -> Vec<u16> {
    bytes.into_iter().map(u16::from).collect()
}

/// Writes a 16-bit image; the container is chosen by the file extension.
pub fn save_image<P: AsRef<Path>>(image: &IntensityImage, path: P) -> Result<()> {
    let path = path.as_ref();
    let (width, height) = (image.width(), image.height());
    let samples = image.samples().to_vec();

    let dynamic = match image.layout() {
        ChannelLayout::Gray => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma16),
        ChannelLayout::GrayAlpha => {
            ImageBuffer::<LumaA<u16>, _>::from_raw(width, height, samples)
                .map(DynamicImage::ImageLumaA16)
        }
        ChannelLayout::Rgb => ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb16),
        ChannelLayout::Rgba => ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgba16),
    }
    .ok_or_else(|| Error::Encoding(format!("sample buffer does not fit {}", image)))?;

    dynamic
        .save(path)
        .map_err(|e| Error::Encoding(format!("{}: {}", path.display(), e)))?;

    tracing::debug!(path = %path.display(), %image, "Saved image");

    Ok(())
}
