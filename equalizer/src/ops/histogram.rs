use super::{check_group_size, sample_count, upload, DeviceOutput};
use crate::backend::{ComputeBackend, GridShape, Kernel};
use crate::common::{BinCount, Error, Result};
use crate::image::ChannelBuffer;
use crate::metrics::{Cost, Stage, StageMetrics};

/// Sample counts per intensity bin of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: BinCount,
    counts: Vec<u32>,
}

impl Histogram {
    pub fn new(bins: BinCount, counts: Vec<u32>) -> Result<Self> {
        if counts.len() != bins.len() {
            return Err(Error::InvalidParameter(format!(
                "{} counts for {} bins",
                counts.len(),
                bins
            )));
        }
        Ok(Self { bins, counts })
    }

    /// Sequential histogram of host samples.
    pub fn from_samples(samples: &[u16], bins: BinCount) -> Self {
        let mut counts = vec![0u32; bins.len()];
        for &s in samples {
            counts[bins.bin_of(s)] += 1;
        }
        Self { bins, counts }
    }

    pub fn bins(&self) -> BinCount {
        self.bins
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Sum of all counts; equals the channel's sample count.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

/// Builds the histogram of a device-resident channel.
///
/// The histogram buffer gets `buffer_len >= B` words so the scan that follows
/// can run in place on a padded buffer; only the first `B` are counted and read back.
pub fn histogram_on_device<B: ComputeBackend>(
    backend: &B,
    samples: &B::Buffer,
    sample_count: u32,
    bins: BinCount,
    group_size: u32,
    buffer_len: usize,
) -> Result<DeviceOutput<B::Buffer, Histogram>> {
    debug_assert!(buffer_len >= bins.len());

    let histogram = backend.create_buffer(buffer_len, "histogram")?;
    let compute_time = backend
        .dispatch(
            Kernel::Histogram {
                bins: bins.get(),
                sample_count,
            },
            &[samples, &histogram],
            GridShape::new(sample_count as usize, group_size),
        )?
        .wait()?;

    let (counts, transfer_time) = backend.read(&histogram, bins.len())?;
    let value = Histogram::new(bins, counts)?;
    debug_assert_eq!(value.total(), sample_count as u64);

    let metrics = StageMetrics::new(
        Stage::Histogram,
        Cost::histogram(sample_count as usize, bins, group_size),
    )
    .with_transfer(transfer_time)
    .with_compute(compute_time);

    Ok(DeviceOutput {
        buffer: histogram,
        value,
        metrics,
    })
}

/// Uploads `channel` and builds its histogram of `bins` bins.
///
/// The returned metrics include the upload in the transfer time.
pub fn build_histogram<B: ComputeBackend>(
    backend: &B,
    channel: &ChannelBuffer,
    bins: BinCount,
    group_size: u32,
) -> Result<(Histogram, StageMetrics)> {
    check_group_size(group_size)?;
    let n = sample_count(channel.len())?;
    let (samples, upload_metrics) = upload(backend, channel)?;
    let output = histogram_on_device(backend, &samples, n, bins, group_size, bins.len())?;

    Ok((
        output.value,
        output.metrics.with_transfer(upload_metrics.transfer_time),
    ))
}
