use std::sync::mpsc;
use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::pipeline::{KernelPipelines, LOCAL_HISTOGRAM_BINS, WORKGROUP_SIZE};
use super::Gpu;
use crate::backend::{
    validate_dispatch, validate_transfer, Completion, ComputeBackend, DeviceBuffer, GridShape,
    Kernel,
};
use crate::common::{Error, Result, INTENSITY_LEVELS};

const WORD: u64 = std::mem::size_of::<u32>() as u64;

/// Maximum workgroups per dispatch dimension.
const MAX_GROUPS_PER_DIM: u32 = 65535;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Params {
    bins: u32,
    count: u32,
    stride: u32,
    len: u32,
}

/// Device-resident storage buffer of 32-bit words.
#[derive(Debug)]
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: usize,
}

impl DeviceBuffer for GpuBuffer {
    fn len(&self) -> usize {
        self.len
    }
}

/// Compute backend running the kernels as wgpu compute shaders.
#[derive(Debug)]
pub struct GpuBackend {
    gpu: Gpu,
    pipelines: KernelPipelines,
    // Bound to the unused storage slots; one per slot since a buffer may not
    // be bound writable twice in one dispatch.
    placeholders: [wgpu::Buffer; 2],
}

impl GpuBackend {
    /// Opens the default adapter and builds all kernels.
    pub fn create() -> Result<Self> {
        Self::new(Gpu::new()?)
    }

    pub fn new(gpu: Gpu) -> Result<Self> {
        let pipelines = KernelPipelines::new(&gpu)?;
        let placeholders = ["placeholder_a", "placeholder_b"].map(|label| {
            gpu.device().create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: 4 * WORD,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })
        });

        Ok(Self {
            gpu,
            pipelines,
            placeholders,
        })
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    fn entry_point(kernel: Kernel) -> &'static str {
        match kernel {
            Kernel::Histogram { bins, .. } if bins <= LOCAL_HISTOGRAM_BINS => "histogram_local",
            Kernel::Histogram { .. } => "histogram_global",
            other => other.name(),
        }
    }

    fn params(kernel: Kernel, buffers: &[&GpuBuffer], grid: GridShape) -> Params {
        let mut params = Params {
            bins: 0,
            count: grid.items as u32,
            stride: 0,
            len: buffers[0].len as u32,
        };
        match kernel {
            Kernel::Histogram { bins, sample_count } | Kernel::NormalizeLut { bins, sample_count } => {
                params.bins = bins;
                params.count = sample_count;
            }
            Kernel::UpSweep { stride } | Kernel::DownSweep { stride } | Kernel::StepScan { stride } => {
                params.stride = stride;
            }
            // The exclusive output defines the range.
            Kernel::ShiftExclusive => params.len = buffers[1].len as u32,
            Kernel::ClearLast | Kernel::BackProject => {}
        }
        params
    }

    /// Workgroup grid covering `items` work-items; wraps into y past the per-dimension limit.
    fn workgroups(items: usize) -> (u32, u32) {
        let groups = (items.max(1)).div_ceil(WORKGROUP_SIZE as usize) as u32;
        let x = groups.min(MAX_GROUPS_PER_DIM);
        (x, groups.div_ceil(x))
    }

    fn runtime_error(context: &str, error: impl std::fmt::Display) -> Error {
        Error::DeviceRuntimeFailure(format!("{}: {}", context, error))
    }

    /// Shaders clamp out-of-range accesses silently, so undersized buffers are rejected here.
    fn check_capacity(kernel: Kernel, buffers: &[&GpuBuffer]) -> Result<()> {
        let (slot, needed) = match kernel {
            Kernel::Histogram { bins, .. } => (1, bins as usize),
            Kernel::NormalizeLut { bins, .. } if buffers[0].len < bins as usize => {
                (0, bins as usize)
            }
            Kernel::NormalizeLut { .. } | Kernel::BackProject => (1, INTENSITY_LEVELS),
            Kernel::StepScan { .. } => (1, buffers[0].len),
            _ => return Ok(()),
        };
        if buffers[slot].len < needed {
            return Err(Error::DeviceRuntimeFailure(format!(
                "{}: buffer {} holds {} words, needs {}",
                kernel, slot, buffers[slot].len, needed
            )));
        }
        Ok(())
    }
}

impl ComputeBackend for GpuBackend {
    type Buffer = GpuBuffer;

    fn name(&self) -> String {
        let info = self.gpu.adapter_info();
        format!("GPU ({}, {:?})", info.name, info.backend)
    }

    fn create_buffer(&self, len: usize, label: &str) -> Result<GpuBuffer> {
        let device = self.gpu.device();
        let size = len.max(1) as u64 * WORD;
        if size > device.limits().max_storage_buffer_binding_size as u64 {
            return Err(Error::DeviceRuntimeFailure(format!(
                "buffer '{}' of {} bytes exceeds the device storage binding limit",
                label, size
            )));
        }

        // wgpu zero-initializes new buffers.
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(GpuBuffer { buffer, len })
    }

    fn write(&self, buffer: &GpuBuffer, data: &[u32]) -> Result<Duration> {
        validate_transfer("write", buffer.len, data.len())?;
        let start = Instant::now();
        if !data.is_empty() {
            self.gpu
                .queue()
                .write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(data));
            self.gpu.queue().submit(std::iter::empty());
            self.gpu.wait()?;
        }
        Ok(start.elapsed())
    }

    fn read(&self, buffer: &GpuBuffer, len: usize) -> Result<(Vec<u32>, Duration)> {
        validate_transfer("read", buffer.len, len)?;
        let start = Instant::now();
        if len == 0 {
            return Ok((Vec::new(), start.elapsed()));
        }

        let device = self.gpu.device();
        let size = len as u64 * WORD;
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_staging_buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging_buffer, 0, size);
        self.gpu.queue().submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.gpu.wait()?;

        rx.recv()
            .map_err(|e| Self::runtime_error("readback channel closed", e))?
            .map_err(|e| Self::runtime_error("failed to map readback buffer", e))?;

        let data = buffer_slice.get_mapped_range();
        let words: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging_buffer.unmap();

        Ok((words, start.elapsed()))
    }

    fn dispatch<'a>(
        &'a self,
        kernel: Kernel,
        buffers: &[&'a GpuBuffer],
        grid: GridShape,
    ) -> Result<Completion<'a>> {
        validate_dispatch(kernel, buffers)?;
        Self::check_capacity(kernel, buffers)?;

        let device = self.gpu.device();
        let pipeline = self.pipelines.get(Self::entry_point(kernel))?;
        let params = Self::params(kernel, buffers, grid);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params_buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let storage = |slot: usize| match buffers.get(slot) {
            Some(b) => b.buffer.as_entire_binding(),
            None => self.placeholders[slot - 1].as_entire_binding(),
        };

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name()),
            layout: self.pipelines.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: storage(0),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: storage(1),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: storage(2),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(kernel.name()),
        });

        let (groups_x, groups_y) = Self::workgroups(grid.items);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        let submission = self.gpu.queue().submit(std::iter::once(encoder.finish()));

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            tracing::error!(%kernel, %error, "Dispatch rejected");
            return Err(Self::runtime_error(kernel.name(), error));
        }

        tracing::trace!(%kernel, groups_x, groups_y, "Dispatch");

        Ok(Completion::new(kernel, move || self.gpu.wait_for(submission)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::common::BinCount;
    use crate::ops::{normalize, CumulativeHistogram, Lut};

    fn backend() -> Option<GpuBackend> {
        match GpuBackend::create() {
            Ok(backend) => Some(backend),
            Err(e) => {
                eprintln!("GPU unavailable (expected on headless systems): {}", e);
                None
            }
        }
    }

    #[test]
    fn workgroup_grid_wraps_into_y() {
        assert_eq!(GpuBackend::workgroups(0), (1, 1));
        assert_eq!(GpuBackend::workgroups(256), (1, 1));
        assert_eq!(GpuBackend::workgroups(257), (2, 1));
        let items = 70_000 * WORKGROUP_SIZE as usize;
        assert_eq!(GpuBackend::workgroups(items), (65535, 2));
    }

    #[test]
    fn large_bin_counts_use_global_histogram() {
        let local = Kernel::Histogram {
            bins: 4096,
            sample_count: 1,
        };
        let global = Kernel::Histogram {
            bins: 4097,
            sample_count: 1,
        };
        assert_eq!(GpuBackend::entry_point(local), "histogram_local");
        assert_eq!(GpuBackend::entry_point(global), "histogram_global");
    }

    #[test]
    fn write_read_preserves_words() {
        let Some(backend) = backend() else {
            return;
        };
        let buffer = backend.create_buffer(5, "words").unwrap();
        backend.write(&buffer, &[5, 4, 3, 2, 1]).unwrap();
        assert_eq!(backend.read(&buffer, 5).unwrap().0, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn histogram_counts_every_sample() {
        let Some(backend) = backend() else {
            return;
        };
        let samples: Vec<u32> = (0..1000u32).map(|i| (i % 4) * 16384).collect();
        let input = backend.create_buffer(samples.len(), "samples").unwrap();
        backend.write(&input, &samples).unwrap();
        let hist = backend.create_buffer(4, "hist").unwrap();

        backend
            .dispatch(
                Kernel::Histogram {
                    bins: 4,
                    sample_count: 1000,
                },
                &[&input, &hist],
                GridShape::new(1000, WORKGROUP_SIZE),
            )
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(backend.read(&hist, 4).unwrap().0, vec![250; 4]);
    }

    #[test]
    fn lut_rounding_matches_integer_formula() {
        let Some(backend) = backend() else {
            return;
        };
        // 2049 * 65535 / 4096 = 32783.4998, beyond exact f32 range.
        let bins = BinCount::new(2).unwrap();
        let cumulative = CumulativeHistogram::new(bins, vec![0, 2049]).unwrap();
        let (lut, _) = normalize(&backend, &cumulative, 4096).unwrap();

        assert_eq!(lut.get(0), 0);
        assert_eq!(lut.get(u16::MAX), 32783);
        assert_eq!(lut, Lut::from_cumulative(&cumulative, 4096).unwrap());

        let (cpu_lut, _) = normalize(&CpuBackend::new(), &cumulative, 4096).unwrap();
        assert_eq!(lut, cpu_lut);
    }

    #[test]
    fn lut_matches_cpu_across_sample_counts() {
        let Some(backend) = backend() else {
            return;
        };
        let bins = BinCount::new(256).unwrap();
        for n in [4096u32, 40_000, 1_000_003, 12_000_000] {
            let values: Vec<u32> = (0..256u64).map(|i| (i * n as u64 / 256) as u32).collect();
            let cumulative = CumulativeHistogram::new(bins, values).unwrap();

            let (gpu, _) = normalize(&backend, &cumulative, n as usize).unwrap();
            let expected = Lut::from_cumulative(&cumulative, n).unwrap();
            assert_eq!(gpu, expected, "n = {n}");
        }
    }
}
