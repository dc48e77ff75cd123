//! Compute backends.
//!
//! The equalization stages never touch a device API directly. They allocate
//! buffers, move data across the host/device boundary, and issue kernel
//! dispatches through [`ComputeBackend`]. A dispatch returns a [`Completion`];
//! its effects are visible to the host only after [`Completion::wait`].
//!
//! # Kernels and their buffers
//!
//! | Kernel           | buffers[0]         | buffers[1]        | buffers[2] |
//! |------------------|--------------------|-------------------|------------|
//! | `Histogram`      | samples (N)        | histogram (>= B)  |            |
//! | `UpSweep`        | data (P)           |                   |            |
//! | `ClearLast`      | data (P)           |                   |            |
//! | `DownSweep`      | data (P)           |                   |            |
//! | `StepScan`       | current (B)        | next (B)          |            |
//! | `ShiftExclusive` | inclusive (B)      | exclusive (B)     |            |
//! | `NormalizeLut`   | cumulative (>= B)  | lut (65536)       |            |
//! | `BackProject`    | samples (N)        | lut (65536)       | output (N) |

mod cpu;
#[cfg(feature = "wgpu")]
mod gpu;

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

pub use cpu::{CpuBackend, CpuBuffer};
#[cfg(feature = "wgpu")]
pub use gpu::{Gpu, GpuBackend, GpuBuffer};

/// A kernel program plus its scalar arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Two-level histogram: per-group scratch, then atomic merge into the global bins.
    Histogram { bins: u32, sample_count: u32 },
    /// One Blelloch up-sweep level.
    UpSweep { stride: u32 },
    /// Zeroes the last element, turning the reduction tree into an exclusive scan.
    ClearLast,
    /// One Blelloch down-sweep level.
    DownSweep { stride: u32 },
    /// One Hillis-Steele round from the current buffer into the next one.
    StepScan { stride: u32 },
    /// Shifts an inclusive scan right by one element, inserting 0.
    ShiftExclusive,
    /// Rescales the cumulative histogram into the 65536-entry table.
    NormalizeLut { bins: u32, sample_count: u32 },
    /// Looks every sample up in the table.
    BackProject,
}

impl Kernel {
    /// Number of buffers the kernel binds.
    pub fn arity(&self) -> usize {
        match self {
            Kernel::UpSweep { .. } | Kernel::ClearLast | Kernel::DownSweep { .. } => 1,
            Kernel::Histogram { .. }
            | Kernel::StepScan { .. }
            | Kernel::ShiftExclusive
            | Kernel::NormalizeLut { .. } => 2,
            Kernel::BackProject => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Histogram { .. } => "histogram",
            Kernel::UpSweep { .. } => "up_sweep",
            Kernel::ClearLast => "clear_last",
            Kernel::DownSweep { .. } => "down_sweep",
            Kernel::StepScan { .. } => "step_scan",
            Kernel::ShiftExclusive => "shift_exclusive",
            Kernel::NormalizeLut { .. } => "normalize_lut",
            Kernel::BackProject => "back_project",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Work-item count and work-group size of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub items: usize,
    pub group_size: u32,
}

impl GridShape {
    pub fn new(items: usize, group_size: u32) -> Self {
        debug_assert!(group_size > 0, "group_size must be positive");
        Self { items, group_size }
    }

    pub fn work_groups(&self) -> usize {
        self.items.div_ceil(self.group_size as usize)
    }
}

type PendingFn<'a> = Box<dyn FnOnce() -> Result<()> + Send + 'a>;

/// Handle to an issued dispatch.
#[must_use = "dispatch results are only visible after waiting on the completion"]
pub struct Completion<'a> {
    kernel: Kernel,
    issued: Instant,
    pending: PendingFn<'a>,
}

impl<'a> Completion<'a> {
    pub fn new(kernel: Kernel, pending: impl FnOnce() -> Result<()> + Send + 'a) -> Self {
        Self {
            kernel,
            issued: Instant::now(),
            pending: Box::new(pending),
        }
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Blocks until the dispatch finished. Returns the time from issue to completion.
    pub fn wait(self) -> Result<Duration> {
        let kernel = self.kernel;
        (self.pending)().inspect_err(|e| {
            tracing::error!(%kernel, error = %e, "Dispatch failed");
        })?;
        let elapsed = self.issued.elapsed();
        tracing::trace!(%kernel, ?elapsed, "Dispatch completed");
        Ok(elapsed)
    }
}

impl fmt::Debug for Completion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("kernel", &self.kernel)
            .field("issued", &self.issued)
            .finish_non_exhaustive()
    }
}

/// Device buffer of 32-bit words.
pub trait DeviceBuffer: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Data-parallel device the equalization stages run on.
pub trait ComputeBackend: Send + Sync {
    type Buffer: DeviceBuffer;

    /// Human readable device description for logs and reports.
    fn name(&self) -> String;

    /// Allocates a zero-initialized buffer of `len` words.
    fn create_buffer(&self, len: usize, label: &str) -> Result<Self::Buffer>;

    /// Copies `data` into the start of `buffer`. Returns the transfer time.
    fn write(&self, buffer: &Self::Buffer, data: &[u32]) -> Result<Duration>;

    /// Copies the first `len` words of `buffer` back to the host.
    fn read(&self, buffer: &Self::Buffer, len: usize) -> Result<(Vec<u32>, Duration)>;

    /// Issues `kernel` over `grid` with `buffers` bound in the order of the kernel table.
    fn dispatch<'a>(
        &'a self,
        kernel: Kernel,
        buffers: &[&'a Self::Buffer],
        grid: GridShape,
    ) -> Result<Completion<'a>>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for &B {
    type Buffer = B::Buffer;

    fn name(&self) -> String {
        (**self).name()
    }

    fn create_buffer(&self, len: usize, label: &str) -> Result<Self::Buffer> {
        (**self).create_buffer(len, label)
    }

    fn write(&self, buffer: &Self::Buffer, data: &[u32]) -> Result<Duration> {
        (**self).write(buffer, data)
    }

    fn read(&self, buffer: &Self::Buffer, len: usize) -> Result<(Vec<u32>, Duration)> {
        (**self).read(buffer, len)
    }

    fn dispatch<'a>(
        &'a self,
        kernel: Kernel,
        buffers: &[&'a Self::Buffer],
        grid: GridShape,
    ) -> Result<Completion<'a>> {
        (**self).dispatch(kernel, buffers, grid)
    }
}

/// Checks buffer arity and host-side lengths before a dispatch is issued.
pub(crate) fn validate_dispatch<B: DeviceBuffer>(kernel: Kernel, buffers: &[&B]) -> Result<()> {
    if buffers.len() != kernel.arity() {
        return Err(Error::DeviceRuntimeFailure(format!(
            "kernel {} binds {} buffers, got {}",
            kernel,
            kernel.arity(),
            buffers.len()
        )));
    }
    if let Some(index) = buffers.iter().position(|b| b.is_empty()) {
        return Err(Error::DeviceRuntimeFailure(format!(
            "kernel {}: buffer {} is empty",
            kernel, index
        )));
    }
    Ok(())
}

/// Checks that a host read or write fits inside a buffer.
pub(crate) fn validate_transfer(op: &str, buffer_len: usize, len: usize) -> Result<()> {
    if len > buffer_len {
        return Err(Error::DeviceRuntimeFailure(format!(
            "{} of {} words exceeds buffer of {} words",
            op, len, buffer_len
        )));
    }
    Ok(())
}

/// Which backend the command line asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU when one is available, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            _ => Err(Error::InvalidParameter(format!(
                "unknown backend '{}', expected auto, cpu or gpu",
                s
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu => f.write_str("gpu"),
        }
    }
}
