use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ChannelLayout, IntensityImage};
use crate::common::{Error, Result};

/// One plane of 16-bit samples, one per pixel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelBuffer {
    samples: Vec<u16>,
}

impl ChannelBuffer {
    pub fn new(samples: Vec<u16>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<u16> {
        self.samples
    }
}

impl From<Vec<u16>> for ChannelBuffer {
    fn from(samples: Vec<u16>) -> Self {
        Self::new(samples)
    }
}

/// How a multi-channel image is broken into equalization planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelMode {
    /// Every color channel is equalized on its own.
    #[default]
    PerChannel,
    /// Color channels are reduced to one luminance plane; the output is grayscale.
    Luminance,
}

impl FromStr for ChannelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "per-channel" | "channels" => Ok(Self::PerChannel),
            "luminance" | "luma" => Ok(Self::Luminance),
            _ => Err(Error::InvalidParameter(format!(
                "unknown channel mode '{}', expected per-channel or luminance",
                s
            ))),
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerChannel => f.write_str("per-channel"),
            Self::Luminance => f.write_str("luminance"),
        }
    }
}

/// Planes of an image ready for independent equalization.
#[derive(Debug, Clone)]
pub struct SplitImage {
    pub width: u32,
    pub height: u32,
    /// Layout the planes merge back into.
    pub layout: ChannelLayout,
    pub planes: Vec<ChannelBuffer>,
}

impl SplitImage {
    /// True if plane `index` carries alpha and must be passed through untouched.
    pub fn is_alpha(&self, index: usize) -> bool {
        self.layout.alpha_index() == Some(index)
    }
}

/// Separates `image` into planes according to `mode`.
pub fn split(image: &IntensityImage, mode: ChannelMode) -> SplitImage {
    let layout = image.layout();
    let channels = layout.channel_count();

    let (layout, planes) = match (mode, layout) {
        (ChannelMode::PerChannel, _) | (ChannelMode::Luminance, ChannelLayout::Gray) => {
            let planes = (0..channels)
                .map(|c| deinterleave(image.samples(), channels, c))
                .collect();
            (layout, planes)
        }
        (ChannelMode::Luminance, ChannelLayout::GrayAlpha) => (
            ChannelLayout::Gray,
            vec![deinterleave(image.samples(), channels, 0)],
        ),
        (ChannelMode::Luminance, ChannelLayout::Rgb | ChannelLayout::Rgba) => {
            let plane = image
                .samples()
                .chunks_exact(channels)
                .map(|px| luminance(px[0], px[1], px[2]))
                .collect::<Vec<_>>();
            (ChannelLayout::Gray, vec![ChannelBuffer::new(plane)])
        }
    };

    SplitImage {
        width: image.width(),
        height: image.height(),
        layout,
        planes,
    }
}

/// Rec. 601 luma of one RGB pixel, rounded to the nearest intensity.
pub fn luminance(r: u16, g: u16, b: u16) -> u16 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().min(u16::MAX as f32) as u16
}

fn deinterleave(samples: &[u16], channels: usize, channel: usize) -> ChannelBuffer {
    samples
        .iter()
        .skip(channel)
        .step_by(channels)
        .copied()
        .collect::<Vec<_>>()
        .into()
}

/// Interleaves `planes` in channel order into an image of `layout`.
pub fn merge(
    width: u32,
    height: u32,
    layout: ChannelLayout,
    planes: &[ChannelBuffer],
) -> Result<IntensityImage> {
    let channels = layout.channel_count();
    if planes.len() != channels {
        return Err(Error::ChannelMismatch(format!(
            "{} planes for a {} layout",
            planes.len(),
            layout
        )));
    }

    let pixel_count = width as usize * height as usize;
    if let Some((index, plane)) = planes
        .iter()
        .enumerate()
        .find(|(_, plane)| plane.len() != pixel_count)
    {
        return Err(Error::ChannelMismatch(format!(
            "channel {} has {} samples, expected {}",
            index,
            plane.len(),
            pixel_count
        )));
    }

    let mut samples = Vec::with_capacity(pixel_count * channels);
    for pixel in 0..pixel_count {
        samples.extend(planes.iter().map(|plane| plane.samples[pixel]));
    }

    IntensityImage::new(width, height, layout, samples)
}
