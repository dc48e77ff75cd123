//! Compute pipelines for the equalization kernels.
//!
//! All kernels share one bind group layout: a params uniform at binding 0 and
//! up to three read-write storage buffers at bindings 1..=3.

use std::collections::HashMap;

use super::Gpu;
use crate::common::{Error, Result};

/// Work-group size every shader is compiled with.
pub(super) const WORKGROUP_SIZE: u32 = 256;

/// Largest bin count whose scratch histogram fits in workgroup memory (16 KiB).
pub(super) const LOCAL_HISTOGRAM_BINS: u32 = 4096;

struct Program {
    name: &'static str,
    source: &'static str,
    entry_points: &'static [&'static str],
}

const PROGRAMS: &[Program] = &[
    Program {
        name: "histogram",
        source: include_str!("histogram.wgsl"),
        entry_points: &["histogram_local", "histogram_global"],
    },
    Program {
        name: "scan",
        source: include_str!("scan.wgsl"),
        entry_points: &[
            "up_sweep",
            "clear_last",
            "down_sweep",
            "step_scan",
            "shift_exclusive",
        ],
    },
    Program {
        name: "lut",
        source: include_str!("lut.wgsl"),
        entry_points: &["normalize_lut", "back_project"],
    },
];

/// Pipelines keyed by shader entry point.
#[derive(Debug)]
pub(super) struct KernelPipelines {
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<&'static str, wgpu::ComputePipeline>,
}

impl KernelPipelines {
    /// Compiles every program. A shader that fails validation is reported with its log.
    pub fn new(gpu: &Gpu) -> Result<Self> {
        let device = gpu.device();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("equalizer_bind_group_layout"),
            entries: &[
                layout_entry(0, wgpu::BufferBindingType::Uniform),
                layout_entry(1, wgpu::BufferBindingType::Storage { read_only: false }),
                layout_entry(2, wgpu::BufferBindingType::Storage { read_only: false }),
                layout_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("equalizer_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            ..Default::default()
        });

        let mut pipelines = HashMap::new();
        for program in PROGRAMS {
            device.push_error_scope(wgpu::ErrorFilter::Validation);

            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(program.name),
                source: wgpu::ShaderSource::Wgsl(program.source.into()),
            });

            for &entry_point in program.entry_points {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    cache: None,
                });
                pipelines.insert(entry_point, pipeline);
            }

            if let Some(error) = pollster::block_on(device.pop_error_scope()) {
                tracing::error!(program = program.name, %error, "Shader build failed");
                return Err(Error::DeviceBuildFailure {
                    program: program.name.to_string(),
                    log: error.to_string(),
                });
            }

            tracing::debug!(program = program.name, "Built compute program");
        }

        Ok(Self {
            bind_group_layout,
            pipelines,
        })
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn get(&self, entry_point: &str) -> Result<&wgpu::ComputePipeline> {
        self.pipelines.get(entry_point).ok_or_else(|| {
            Error::DeviceRuntimeFailure(format!("no pipeline for entry point '{}'", entry_point))
        })
    }
}

fn layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
