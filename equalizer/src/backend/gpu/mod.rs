mod backend;
mod pipeline;

use std::sync::Arc;

pub use self::backend::{GpuBackend, GpuBuffer};

use crate::common::{Error, Result};

/// GPU context holding the wgpu device and queue.
#[derive(Debug, Clone)]
pub struct Gpu {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter: Arc<wgpu::AdapterInfo>,
}

impl Gpu {
    /// Picks the high-performance adapter and opens a device on it.
    ///
    /// The device is opened with the adapter's own limits so that large images
    /// fit into a single storage binding where the hardware allows it.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            Error::DeviceRuntimeFailure(format!("failed to find suitable GPU adapter: {}", e))
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("equalizer_device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| Error::DeviceRuntimeFailure(format!("failed to create device: {}", e)))?;

        let info = adapter.get_info();
        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "Opened GPU device"
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter: Arc::new(info),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter
    }

    /// Blocks until all submitted work has finished.
    pub fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| Error::DeviceRuntimeFailure(format!("device poll failed: {}", e)))
    }

    /// Blocks until the given submission has finished.
    pub fn wait_for(&self, submission: wgpu::SubmissionIndex) -> Result<()> {
        self.device
            .poll(wgpu::PollType::WaitForSubmissionIndex(submission))
            .map(|_| ())
            .map_err(|e| Error::DeviceRuntimeFailure(format!("device poll failed: {}", e)))
    }
}
