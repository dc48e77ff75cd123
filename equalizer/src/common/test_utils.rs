use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::BinCount;

pub(crate) fn bins(count: u32) -> BinCount {
    BinCount::new(count).unwrap()
}

/// Uniform random 16-bit samples from a fixed seed.
pub(crate) fn random_samples(seed: u64, len: usize) -> Vec<u16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random::<u16>()).collect()
}

/// Random samples squeezed into `lo..=hi`, for low-contrast inputs.
pub(crate) fn random_samples_in(seed: u64, len: usize, lo: u16, hi: u16) -> Vec<u16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(lo..=hi)).collect()
}

/// The 16 pixels of a 4x4 8-bit gradient `0, 17, ..., 255`, widened to 16 bits.
pub(crate) fn gradient_4x4() -> Vec<u16> {
    (0..16u16).map(|k| k * 17 * 257).collect()
}
