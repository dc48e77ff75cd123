//! Work-group emulation on the CPU.
//!
//! Every dispatch becomes a rayon parallel loop over its work-items; returning
//! from the loop is the barrier. Buffers are arrays of `AtomicU32` so that
//! work-items of one dispatch can share them without locks. The histogram
//! kernel gives each rayon split its own exclusively owned scratch histogram,
//! which stands in for work-group local memory, and folds the nonzero bins
//! into the global buffer with atomic adds.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPool;

use super::{
    validate_dispatch, validate_transfer, Completion, ComputeBackend, DeviceBuffer, GridShape,
    Kernel,
};
use crate::common::{equalized_level, Error, Result, INTENSITY_LEVELS};

/// Host-memory buffer shared by the work-items of a dispatch.
#[derive(Debug)]
pub struct CpuBuffer {
    label: String,
    words: Box<[AtomicU32]>,
}

impl CpuBuffer {
    fn zeroed(len: usize, label: &str) -> Self {
        Self {
            label: label.to_string(),
            words: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    fn get(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    #[inline]
    fn set(&self, index: usize, value: u32) {
        self.words[index].store(value, Ordering::Relaxed);
    }

    #[inline]
    fn add(&self, index: usize, value: u32) {
        self.words[index].fetch_add(value, Ordering::Relaxed);
    }
}

impl DeviceBuffer for CpuBuffer {
    fn len(&self) -> usize {
        self.words.len()
    }
}

/// CPU compute backend on rayon's global pool or a dedicated one.
#[derive(Debug, Clone, Default)]
pub struct CpuBackend {
    pool: Option<Arc<ThreadPool>>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Runs dispatches on a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("equalizer-cpu-{i}"))
            .build()
            .map_err(|e| Error::DeviceRuntimeFailure(format!("failed to start thread pool: {e}")))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, |pool| pool.current_num_threads())
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn run(&self, kernel: Kernel, buffers: &[&CpuBuffer], grid: GridShape) -> Result<()> {
        match kernel {
            Kernel::Histogram { bins, sample_count } => {
                histogram(buffers[0], buffers[1], bins, sample_count as usize, grid)
            }
            Kernel::UpSweep { stride } => up_sweep(buffers[0], stride as usize, grid.items),
            Kernel::ClearLast => {
                let data = buffers[0];
                data.set(data.len() - 1, 0);
                Ok(())
            }
            Kernel::DownSweep { stride } => down_sweep(buffers[0], stride as usize, grid.items),
            Kernel::StepScan { stride } => step_scan(buffers[0], buffers[1], stride as usize),
            Kernel::ShiftExclusive => shift_exclusive(buffers[0], buffers[1]),
            Kernel::NormalizeLut { bins, sample_count } => {
                normalize_lut(buffers[0], buffers[1], bins, sample_count)
            }
            Kernel::BackProject => back_project(buffers[0], buffers[1], buffers[2]),
        }
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;

    fn name(&self) -> String {
        format!("CPU ({} threads)", self.threads())
    }

    fn create_buffer(&self, len: usize, label: &str) -> Result<CpuBuffer> {
        Ok(CpuBuffer::zeroed(len, label))
    }

    fn write(&self, buffer: &CpuBuffer, data: &[u32]) -> Result<Duration> {
        validate_transfer("write", buffer.len(), data.len())?;
        let start = Instant::now();
        self.install(|| {
            buffer.words[..data.len()]
                .par_iter()
                .zip(data.par_iter())
                .for_each(|(word, &value)| word.store(value, Ordering::Relaxed));
        });
        Ok(start.elapsed())
    }

    fn read(&self, buffer: &CpuBuffer, len: usize) -> Result<(Vec<u32>, Duration)> {
        validate_transfer("read", buffer.len(), len)?;
        let start = Instant::now();
        let data = self.install(|| {
            buffer.words[..len]
                .par_iter()
                .map(|word| word.load(Ordering::Relaxed))
                .collect()
        });
        Ok((data, start.elapsed()))
    }

    fn dispatch<'a>(
        &'a self,
        kernel: Kernel,
        buffers: &[&'a CpuBuffer],
        grid: GridShape,
    ) -> Result<Completion<'a>> {
        validate_dispatch(kernel, buffers)?;
        let buffers = buffers.to_vec();

        tracing::trace!(%kernel, items = grid.items, groups = grid.work_groups(), "Dispatch");

        Ok(Completion::new(kernel, move || {
            self.install(|| self.run(kernel, &buffers, grid))
        }))
    }
}

fn require_len(kernel: &str, buffer: &CpuBuffer, len: usize) -> Result<()> {
    if buffer.len() < len {
        return Err(Error::DeviceRuntimeFailure(format!(
            "{}: buffer '{}' holds {} words, needs {}",
            kernel,
            buffer.label,
            buffer.len(),
            len
        )));
    }
    Ok(())
}

#[inline]
fn bin_of(sample: u32, bins: u32) -> usize {
    let bin = (sample.min(u16::MAX as u32) as u64 * bins as u64) >> 16;
    (bin as usize).min(bins as usize - 1)
}

fn histogram(
    samples: &CpuBuffer,
    hist: &CpuBuffer,
    bins: u32,
    sample_count: usize,
    grid: GridShape,
) -> Result<()> {
    if bins == 0 {
        return Err(Error::DeviceRuntimeFailure("histogram: zero bins".to_string()));
    }
    require_len("histogram", samples, sample_count)?;
    require_len("histogram", hist, bins as usize)?;

    let group_size = grid.group_size as usize;
    let groups = sample_count.div_ceil(group_size);

    (0..groups)
        .into_par_iter()
        .fold(
            || vec![0u32; bins as usize],
            |mut scratch, group| {
                let start = group * group_size;
                let end = (start + group_size).min(sample_count);
                for i in start..end {
                    scratch[bin_of(samples.get(i), bins)] += 1;
                }
                scratch
            },
        )
        .for_each(|scratch| {
            for (bin, &count) in scratch.iter().enumerate() {
                if count != 0 {
                    hist.add(bin, count);
                }
            }
        });

    Ok(())
}

fn up_sweep(data: &CpuBuffer, stride: usize, items: usize) -> Result<()> {
    let len = data.len();
    (0..items).into_par_iter().for_each(|k| {
        let i = (k + 1) * 2 * stride - 1;
        if i < len {
            data.set(i, data.get(i).wrapping_add(data.get(i - stride)));
        }
    });
    Ok(())
}

fn down_sweep(data: &CpuBuffer, stride: usize, items: usize) -> Result<()> {
    let len = data.len();
    (0..items).into_par_iter().for_each(|k| {
        let i = (k + 1) * 2 * stride - 1;
        if i < len {
            let t = data.get(i);
            data.set(i, t.wrapping_add(data.get(i - stride)));
            data.set(i - stride, t);
        }
    });
    Ok(())
}

fn step_scan(current: &CpuBuffer, next: &CpuBuffer, stride: usize) -> Result<()> {
    require_len("step_scan", next, current.len())?;
    (0..current.len()).into_par_iter().for_each(|i| {
        let mut value = current.get(i);
        if i >= stride {
            value = value.wrapping_add(current.get(i - stride));
        }
        next.set(i, value);
    });
    Ok(())
}

fn shift_exclusive(inclusive: &CpuBuffer, exclusive: &CpuBuffer) -> Result<()> {
    require_len("shift_exclusive", inclusive, exclusive.len())?;
    (0..exclusive.len()).into_par_iter().for_each(|i| {
        let value = if i == 0 { 0 } else { inclusive.get(i - 1) };
        exclusive.set(i, value);
    });
    Ok(())
}

fn normalize_lut(
    cumulative: &CpuBuffer,
    lut: &CpuBuffer,
    bins: u32,
    sample_count: u32,
) -> Result<()> {
    if bins == 0 || sample_count == 0 {
        return Err(Error::DeviceRuntimeFailure(format!(
            "normalize_lut: invalid arguments bins={} sample_count={}",
            bins, sample_count
        )));
    }
    require_len("normalize_lut", cumulative, bins as usize)?;
    require_len("normalize_lut", lut, INTENSITY_LEVELS)?;

    (0..INTENSITY_LEVELS).into_par_iter().for_each(|v| {
        let cum = cumulative.get(bin_of(v as u32, bins));
        lut.set(v, equalized_level(cum, sample_count) as u32);
    });
    Ok(())
}

fn back_project(samples: &CpuBuffer, lut: &CpuBuffer, output: &CpuBuffer) -> Result<()> {
    require_len("back_project", lut, INTENSITY_LEVELS)?;
    require_len("back_project", output, samples.len())?;
    (0..samples.len()).into_par_iter().for_each(|i| {
        let sample = samples.get(i).min(u16::MAX as u32) as usize;
        output.set(i, lut.get(sample));
    });
    Ok(())
}
