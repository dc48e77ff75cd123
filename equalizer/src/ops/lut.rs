use super::{CumulativeHistogram, DeviceOutput, DEFAULT_GROUP_SIZE};
use crate::backend::{ComputeBackend, GridShape, Kernel};
use crate::common::{equalized_level, BinCount, Error, Result, INTENSITY_LEVELS};
use crate::metrics::{Cost, Stage, StageMetrics};

/// Lookup table from every 16-bit input intensity to its equalized value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lut {
    table: Vec<u16>,
}

impl Lut {
    pub fn new(table: Vec<u16>) -> Result<Self> {
        if table.len() != INTENSITY_LEVELS {
            return Err(Error::InvalidParameter(format!(
                "lookup table has {} entries, expected {}",
                table.len(),
                INTENSITY_LEVELS
            )));
        }
        Ok(Self { table })
    }

    /// Sequential normalization: `round(cum[bin(v)] * 65535 / N)`.
    pub fn from_cumulative(cumulative: &CumulativeHistogram, sample_count: u32) -> Result<Self> {
        let n = check_sample_count(sample_count)?;
        let bins = cumulative.bins();
        let table = (0..INTENSITY_LEVELS)
            .map(|v| equalized_level(cumulative.values()[bins.bin_of(v as u16)], n))
            .collect();
        Ok(Self { table })
    }

    #[inline]
    pub fn get(&self, intensity: u16) -> u16 {
        self.table[intensity as usize]
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.table
    }

    pub fn is_monotonic(&self) -> bool {
        self.table.windows(2).all(|w| w[0] <= w[1])
    }
}

fn check_sample_count(sample_count: u32) -> Result<u32> {
    if sample_count == 0 {
        return Err(Error::InvalidParameter(
            "cannot normalize over zero samples".to_string(),
        ));
    }
    Ok(sample_count)
}

/// Builds the LUT from a device-resident cumulative histogram of at least `B` words.
pub fn normalize_on_device<B: ComputeBackend>(
    backend: &B,
    cumulative: &B::Buffer,
    bins: BinCount,
    sample_count: u32,
    group_size: u32,
) -> Result<DeviceOutput<B::Buffer, Lut>> {
    let sample_count = check_sample_count(sample_count)?;

    let lut = backend.create_buffer(INTENSITY_LEVELS, "lut")?;
    let compute_time = backend
        .dispatch(
            Kernel::NormalizeLut {
                bins: bins.get(),
                sample_count,
            },
            &[cumulative, &lut],
            GridShape::new(INTENSITY_LEVELS, group_size),
        )?
        .wait()?;

    let (words, transfer_time) = backend.read(&lut, INTENSITY_LEVELS)?;
    let value = Lut::new(words.into_iter().map(|w| w.min(u16::MAX as u32) as u16).collect())?;

    let metrics = StageMetrics::new(Stage::Normalize, Cost::normalize())
        .with_transfer(transfer_time)
        .with_compute(compute_time);

    Ok(DeviceOutput {
        buffer: lut,
        value,
        metrics,
    })
}

/// Uploads `cumulative` and normalizes it over `sample_count` samples.
pub fn normalize<B: ComputeBackend>(
    backend: &B,
    cumulative: &CumulativeHistogram,
    sample_count: usize,
) -> Result<(Lut, StageMetrics)> {
    let n = super::sample_count(sample_count)?;
    let buffer = backend.create_buffer(cumulative.bins().len(), "cumulative")?;
    let upload_time = backend.write(&buffer, cumulative.values())?;

    let output = normalize_on_device(backend, &buffer, cumulative.bins(), n, DEFAULT_GROUP_SIZE)?;
    Ok((output.value, output.metrics.with_transfer(upload_time)))
}
