pub(crate) mod bins;
pub(crate) mod error;
#[cfg(test)]
pub(crate) mod test_utils;

pub use bins::{ceil_log2, equalized_level, BinCount, INTENSITY_LEVELS, MAX_INTENSITY};
pub use error::{Error, Result};
