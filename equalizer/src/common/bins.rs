use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::{Error, Result};

/// Number of distinct values in the 16-bit intensity domain.
pub const INTENSITY_LEVELS: usize = 1 << 16;

/// Largest value of the 16-bit intensity domain.
pub const MAX_INTENSITY: u16 = u16::MAX;

/// Validated histogram bin count, `1..=65536`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BinCount(u32);

impl BinCount {
    pub const DEFAULT: BinCount = BinCount(256);

    pub fn new(bins: u32) -> Result<Self> {
        if bins == 0 {
            return Err(Error::InvalidParameter(
                "bin count must be positive".to_string(),
            ));
        }
        if bins as usize > INTENSITY_LEVELS {
            return Err(Error::InvalidParameter(format!(
                "bin count {} exceeds the {} distinct 16-bit intensities",
                bins, INTENSITY_LEVELS
            )));
        }
        Ok(Self(bins))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn len(self) -> usize {
        self.0 as usize
    }

    /// Bin count rounded up to the next power of two.
    pub fn padded(self) -> usize {
        self.len().next_power_of_two()
    }

    /// Bin holding `sample`: `floor(sample * B / 65536)`, clamped to `B - 1`.
    #[inline]
    pub fn bin_of(self, sample: u16) -> usize {
        let bin = (sample as u64 * self.0 as u64) >> 16;
        (bin as usize).min(self.len() - 1)
    }
}

impl Default for BinCount {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for BinCount {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BinCount> for u32 {
    fn from(value: BinCount) -> Self {
        value.0
    }
}

impl fmt::Display for BinCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `round(cumulative * 65535 / sample_count)` in exact integer arithmetic, halves rounded up.
///
/// `sample_count` must be positive.
#[inline]
pub fn equalized_level(cumulative: u32, sample_count: u32) -> u16 {
    let n = sample_count as u64;
    let level = (2 * cumulative as u64 * MAX_INTENSITY as u64 + n) / (2 * n);
    level.min(MAX_INTENSITY as u64) as u16
}

/// `ceil(log2(n))`, with `ceil_log2(0) == ceil_log2(1) == 0`.
pub fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}
