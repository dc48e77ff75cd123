//! Exclusive prefix sum of a histogram.
//!
//! Every scan level is one dispatch; waiting on it is the device-wide barrier
//! between levels.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{DeviceOutput, Histogram, DEFAULT_GROUP_SIZE};
use crate::backend::{ComputeBackend, DeviceBuffer, GridShape, Kernel};
use crate::common::{BinCount, Error, Result};
use crate::metrics::{Cost, Stage, StageMetrics};

/// Prefix-sum strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanAlgorithm {
    /// Blelloch up-sweep/down-sweep on the bin count padded to a power of two.
    #[default]
    #[serde(alias = "blelloch")]
    WorkEfficient,
    /// Hillis-Steele rounds on exactly `B` elements, double-buffered.
    #[serde(alias = "hillis-steele")]
    StepEfficient,
}

impl ScanAlgorithm {
    /// Length of the histogram buffer the scan runs on.
    pub fn buffer_len(self, bins: BinCount) -> usize {
        match self {
            Self::WorkEfficient => bins.padded(),
            Self::StepEfficient => bins.len(),
        }
    }

    pub fn cost(self, bins: BinCount) -> Cost {
        match self {
            Self::WorkEfficient => Cost::work_efficient_scan(bins),
            Self::StepEfficient => Cost::step_efficient_scan(bins),
        }
    }
}

impl FromStr for ScanAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "work-efficient" | "blelloch" => Ok(Self::WorkEfficient),
            "step-efficient" | "hillis-steele" => Ok(Self::StepEfficient),
            _ => Err(Error::InvalidParameter(format!(
                "unknown scan algorithm '{}', expected work-efficient or step-efficient",
                s
            ))),
        }
    }
}

impl fmt::Display for ScanAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkEfficient => f.write_str("work-efficient"),
            Self::StepEfficient => f.write_str("step-efficient"),
        }
    }
}

/// Exclusive cumulative histogram: `values[0] == 0`, `values[i] == sum(counts[..i])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeHistogram {
    bins: BinCount,
    values: Vec<u32>,
}

impl CumulativeHistogram {
    pub fn new(bins: BinCount, values: Vec<u32>) -> Result<Self> {
        if values.len() != bins.len() {
            return Err(Error::InvalidParameter(format!(
                "{} cumulative values for {} bins",
                values.len(),
                bins
            )));
        }
        Ok(Self { bins, values })
    }

    /// Sequential exclusive scan.
    pub fn from_histogram(histogram: &Histogram) -> Self {
        let mut running = 0u32;
        let values = histogram
            .counts()
            .iter()
            .map(|&c| {
                let v = running;
                running += c;
                v
            })
            .collect();
        Self {
            bins: histogram.bins(),
            values,
        }
    }

    pub fn bins(&self) -> BinCount {
        self.bins
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn is_monotonic(&self) -> bool {
        self.values.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Two equally sized buffers with an explicit active role.
///
/// A round reads the active buffer and writes the other one; `flip` then hands
/// the active role to the freshly written buffer.
#[derive(Debug)]
pub struct PingPong<T> {
    buffers: [T; 2],
    active: usize,
}

impl<T> PingPong<T> {
    pub fn new(active: T, inactive: T) -> Self {
        Self {
            buffers: [active, inactive],
            active: 0,
        }
    }

    pub fn active(&self) -> &T {
        &self.buffers[self.active]
    }

    pub fn inactive(&self) -> &T {
        &self.buffers[1 - self.active]
    }

    pub fn flip(&mut self) {
        self.active = 1 - self.active;
    }

    pub fn into_active(self) -> T {
        let [first, second] = self.buffers;
        if self.active == 0 {
            first
        } else {
            second
        }
    }
}

/// Scans a device-resident histogram buffer of `algorithm.buffer_len(bins)` words.
///
/// The work-efficient scan runs in place and returns the same buffer; the
/// step-efficient scan returns a new one. Only the first `B` values are read back.
pub fn scan_on_device<B: ComputeBackend>(
    backend: &B,
    histogram: B::Buffer,
    bins: BinCount,
    algorithm: ScanAlgorithm,
    group_size: u32,
) -> Result<DeviceOutput<B::Buffer, CumulativeHistogram>> {
    let expected = algorithm.buffer_len(bins);
    if histogram.len() != expected {
        return Err(Error::InvalidParameter(format!(
            "{} scan over {} bins needs a buffer of {} words, got {}",
            algorithm,
            bins,
            expected,
            histogram.len()
        )));
    }

    let (cumulative, compute_time) = match algorithm {
        ScanAlgorithm::WorkEfficient => work_efficient(backend, histogram, group_size)?,
        ScanAlgorithm::StepEfficient => step_efficient(backend, histogram, group_size)?,
    };

    let (values, transfer_time) = backend.read(&cumulative, bins.len())?;
    let value = CumulativeHistogram::new(bins, values)?;

    tracing::debug!(%algorithm, %bins, ?compute_time, "Scanned histogram");

    let metrics = StageMetrics::new(Stage::Scan, algorithm.cost(bins))
        .with_transfer(transfer_time)
        .with_compute(compute_time);

    Ok(DeviceOutput {
        buffer: cumulative,
        value,
        metrics,
    })
}

/// Blelloch scan in place on a power-of-two buffer.
fn work_efficient<B: ComputeBackend>(
    backend: &B,
    data: B::Buffer,
    group_size: u32,
) -> Result<(B::Buffer, Duration)> {
    let len = data.len();
    debug_assert!(len.is_power_of_two());

    let mut compute_time = Duration::ZERO;

    let mut stride = 1;
    while stride < len {
        let grid = GridShape::new(len / (2 * stride), group_size);
        compute_time += backend
            .dispatch(
                Kernel::UpSweep {
                    stride: stride as u32,
                },
                &[&data],
                grid,
            )?
            .wait()?;
        stride *= 2;
    }

    compute_time += backend
        .dispatch(Kernel::ClearLast, &[&data], GridShape::new(1, group_size))?
        .wait()?;

    let mut stride = len / 2;
    while stride >= 1 {
        let grid = GridShape::new(len / (2 * stride), group_size);
        compute_time += backend
            .dispatch(
                Kernel::DownSweep {
                    stride: stride as u32,
                },
                &[&data],
                grid,
            )?
            .wait()?;
        stride /= 2;
    }

    Ok((data, compute_time))
}

/// Hillis-Steele inclusive scan, shifted into exclusive form.
fn step_efficient<B: ComputeBackend>(
    backend: &B,
    histogram: B::Buffer,
    group_size: u32,
) -> Result<(B::Buffer, Duration)> {
    let len = histogram.len();
    let grid = GridShape::new(len, group_size);
    let mut compute_time = Duration::ZERO;

    let mut buffers = PingPong::new(histogram, backend.create_buffer(len, "scan_next")?);
    let mut stride = 1;
    while stride < len {
        compute_time += backend
            .dispatch(
                Kernel::StepScan {
                    stride: stride as u32,
                },
                &[buffers.active(), buffers.inactive()],
                grid,
            )?
            .wait()?;
        buffers.flip();
        stride *= 2;
    }

    let inclusive = buffers.into_active();
    let exclusive = backend.create_buffer(len, "cumulative")?;
    compute_time += backend
        .dispatch(Kernel::ShiftExclusive, &[&inclusive, &exclusive], grid)?
        .wait()?;

    Ok((exclusive, compute_time))
}

/// Uploads `histogram` and scans it with `algorithm`.
///
/// The returned metrics include the upload in the transfer time.
pub fn scan<B: ComputeBackend>(
    backend: &B,
    histogram: &Histogram,
    algorithm: ScanAlgorithm,
) -> Result<(CumulativeHistogram, StageMetrics)> {
    let bins = histogram.bins();
    let buffer = backend.create_buffer(algorithm.buffer_len(bins), "histogram")?;
    let upload_time = backend.write(&buffer, histogram.counts())?;

    let output = scan_on_device(backend, buffer, bins, algorithm, DEFAULT_GROUP_SIZE)?;
    Ok((output.value, output.metrics.with_transfer(upload_time)))
}
