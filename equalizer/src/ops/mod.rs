//! Equalization stages.
//!
//! Each stage comes in two forms. The device form (`*_on_device`) takes and
//! returns device buffers so a channel pipeline keeps its data on the device
//! between stages; it still reads the stage result back, and that readback is
//! the stage's transfer time. The host form takes host values, uploads them,
//! and runs the device form.

mod backproject;
mod histogram;
mod lut;
mod scan;


pub use backproject::{project, project_on_device};
pub use histogram::{build_histogram, histogram_on_device, Histogram};
pub use lut::{normalize, normalize_on_device, Lut};
pub use scan::{scan, scan_on_device, CumulativeHistogram, PingPong, ScanAlgorithm};

use crate::backend::ComputeBackend;
use crate::common::{Error, Result};
use crate::image::ChannelBuffer;
use crate::metrics::{Cost, Stage, StageMetrics};

/// Work-group size used when the caller does not choose one.
pub const DEFAULT_GROUP_SIZE: u32 = 256;

pub const MAX_GROUP_SIZE: u32 = 1024;

/// Output of a device stage: the buffer that stays on the device and its host copy.
#[derive(Debug)]
pub struct DeviceOutput<Buf, T> {
    pub buffer: Buf,
    pub value: T,
    pub metrics: StageMetrics,
}

/// Checks that a channel has samples and that their count fits the device word size.
pub fn sample_count(len: usize) -> Result<u32> {
    if len == 0 {
        return Err(Error::InvalidParameter(
            "channel has no samples".to_string(),
        ));
    }
    u32::try_from(len).map_err(|_| {
        Error::InvalidParameter(format!(
            "channel of {} samples exceeds the 32-bit device counters",
            len
        ))
    })
}

/// Work-group sizes must be a power of two no larger than 1024.
pub fn check_group_size(group_size: u32) -> Result<()> {
    if !group_size.is_power_of_two() || group_size > MAX_GROUP_SIZE {
        return Err(Error::InvalidParameter(format!(
            "group size {} must be a power of two in 1..={}",
            group_size, MAX_GROUP_SIZE
        )));
    }
    Ok(())
}

/// Copies a channel onto the device as 32-bit words.
pub fn upload<B: ComputeBackend>(
    backend: &B,
    channel: &ChannelBuffer,
) -> Result<(B::Buffer, StageMetrics)> {
    let words: Vec<u32> = channel.samples().iter().map(|&s| s as u32).collect();
    let buffer = backend.create_buffer(words.len(), "samples")?;
    let transfer_time = backend.write(&buffer, &words)?;

    let metrics =
        StageMetrics::new(Stage::Upload, Cost::upload(words.len())).with_transfer(transfer_time);
    Ok((buffer, metrics))
}
