use super::{sample_count, upload, DeviceOutput, Lut, DEFAULT_GROUP_SIZE};
use crate::backend::{ComputeBackend, GridShape, Kernel};
use crate::common::{Result, INTENSITY_LEVELS};
use crate::image::ChannelBuffer;
use crate::metrics::{Cost, Stage, StageMetrics};

/// Maps every device-resident sample through the device-resident LUT into a new buffer.
pub fn project_on_device<B: ComputeBackend>(
    backend: &B,
    samples: &B::Buffer,
    lut: &B::Buffer,
    sample_count: u32,
    group_size: u32,
) -> Result<DeviceOutput<B::Buffer, ChannelBuffer>> {
    let n = sample_count as usize;
    let output = backend.create_buffer(n, "equalized")?;
    let compute_time = backend
        .dispatch(
            Kernel::BackProject,
            &[samples, lut, &output],
            GridShape::new(n, group_size),
        )?
        .wait()?;

    let (words, transfer_time) = backend.read(&output, n)?;
    let value = ChannelBuffer::new(words.into_iter().map(|w| w as u16).collect());

    let metrics = StageMetrics::new(Stage::BackProject, Cost::back_project(n))
        .with_transfer(transfer_time)
        .with_compute(compute_time);

    Ok(DeviceOutput {
        buffer: output,
        value,
        metrics,
    })
}

/// Uploads `channel` and `lut` and remaps the channel through the table.
pub fn project<B: ComputeBackend>(
    backend: &B,
    channel: &ChannelBuffer,
    lut: &Lut,
) -> Result<(ChannelBuffer, StageMetrics)> {
    let n = sample_count(channel.len())?;
    let (samples, upload_metrics) = upload(backend, channel)?;

    let table: Vec<u32> = lut.as_slice().iter().map(|&v| v as u32).collect();
    let lut_buffer = backend.create_buffer(INTENSITY_LEVELS, "lut")?;
    let lut_time = backend.write(&lut_buffer, &table)?;

    let output = project_on_device(backend, &samples, &lut_buffer, n, DEFAULT_GROUP_SIZE)?;
    Ok((
        output.value,
        output
            .metrics
            .with_transfer(upload_metrics.transfer_time + lut_time),
    ))
}
