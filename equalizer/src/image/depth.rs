use super::{IntensityImage, RawImage};
use crate::common::Result;

/// Bit depth of the source samples, inferred from the maximum sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDepth {
    Eight,
    Sixteen,
}

impl SourceDepth {
    pub fn from_max_value(max_value: u16) -> Self {
        if max_value <= u8::MAX as u16 {
            Self::Eight
        } else {
            Self::Sixteen
        }
    }

    /// Maps one source sample into the 16-bit domain.
    ///
    /// 8-bit samples are multiplied by 257, which sends 255 to 65535 exactly.
    #[inline]
    pub fn widen(self, sample: u16) -> u16 {
        match self {
            Self::Eight => sample * 257,
            Self::Sixteen => sample,
        }
    }
}

/// Converts a decoded image into the uniform 16-bit intensity domain.
pub fn normalize_depth(raw: RawImage) -> Result<IntensityImage> {
    let depth = raw.source_depth();
    let (width, height, layout, mut samples) = raw.into_parts();

    if depth == SourceDepth::Eight {
        samples.iter_mut().for_each(|s| *s = depth.widen(*s));
    }

    tracing::debug!(width, height, %layout, ?depth, "Normalized bit depth");

    IntensityImage::new(width, height, layout, samples)
}
