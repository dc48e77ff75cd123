mod channels;
mod depth;
mod io;

#[cfg(test)]
mod tests;

pub use channels::{luminance, merge, split, ChannelBuffer, ChannelMode, SplitImage};
pub use depth::{normalize_depth, SourceDepth};
pub use io::{load_image, save_image, SUPPORTED_EXTENSIONS};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Interleaved channel arrangement of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl ChannelLayout {
    pub fn from_channel_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(Self::Gray),
            2 => Ok(Self::GrayAlpha),
            3 => Ok(Self::Rgb),
            4 => Ok(Self::Rgba),
            _ => Err(Error::MalformedInput(format!(
                "unsupported channel count {}",
                count
            ))),
        }
    }

    pub fn channel_count(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Index of the alpha channel, if the layout has one.
    pub fn alpha_index(self) -> Option<usize> {
        match self {
            Self::Gray | Self::Rgb => None,
            Self::GrayAlpha => Some(1),
            Self::Rgba => Some(3),
        }
    }

    pub fn has_alpha(self) -> bool {
        self.alpha_index().is_some()
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gray => "gray",
            Self::GrayAlpha => "gray+alpha",
            Self::Rgb => "rgb",
            Self::Rgba => "rgba",
        };
        f.write_str(name)
    }
}

/// Decoded image as handed over by the decoder, before bit-depth normalization.
///
/// Samples are interleaved in channel order and stay in the source range
/// `0..=max_value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    max_value: u16,
    samples: Vec<u16>,
}

impl RawImage {
    pub fn new(
        width: u32,
        height: u32,
        channels: usize,
        max_value: u16,
        samples: Vec<u16>,
    ) -> Result<Self> {
        let layout = ChannelLayout::from_channel_count(channels)?;
        if width == 0 || height == 0 {
            return Err(Error::MalformedInput(format!(
                "image has no pixels ({}x{})",
                width, height
            )));
        }
        if max_value == 0 {
            return Err(Error::MalformedInput(
                "maximum sample value must be positive".to_string(),
            ));
        }
        let expected = width as usize * height as usize * channels;
        if samples.len() != expected {
            return Err(Error::MalformedInput(format!(
                "sample count {} does not match {}x{}x{}",
                samples.len(),
                width,
                height,
                channels
            )));
        }
        if let Some(&above) = samples.iter().find(|&&s| s > max_value) {
            return Err(Error::MalformedInput(format!(
                "sample {} exceeds declared maximum {}",
                above, max_value
            )));
        }

        Ok(Self {
            width,
            height,
            layout,
            max_value,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn max_value(&self) -> u16 {
        self.max_value
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn source_depth(&self) -> SourceDepth {
        SourceDepth::from_max_value(self.max_value)
    }

    pub(crate) fn into_parts(self) -> (u32, u32, ChannelLayout, Vec<u16>) {
        (self.width, self.height, self.layout, self.samples)
    }
}

/// Image in the uniform 16-bit intensity domain, interleaved in channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntensityImage {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    samples: Vec<u16>,
}

impl IntensityImage {
    pub fn new(width: u32, height: u32, layout: ChannelLayout, samples: Vec<u16>) -> Result<Self> {
        let expected = width as usize * height as usize * layout.channel_count();
        if samples.len() != expected {
            return Err(Error::ChannelMismatch(format!(
                "{} samples for a {}x{} {} image, expected {}",
                samples.len(),
                width,
                height,
                layout,
                expected
            )));
        }

        Ok(Self {
            width,
            height,
            layout,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<u16> {
        self.samples
    }
}

impl fmt::Display for IntensityImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.layout)
    }
}
