//! Per-image orchestration: split, equalize every channel, merge.

mod config;

#[cfg(test)]
mod tests;

pub use config::EqualizeConfig;

use common::parallel::try_par_map_limited;

use crate::backend::ComputeBackend;
use crate::common::Result;
use crate::image::{merge, split, ChannelBuffer, IntensityImage};
use crate::metrics::{ChannelMetrics, MetricsReport};
use crate::ops::{
    histogram_on_device, normalize_on_device, project_on_device, sample_count, scan_on_device,
    upload, CumulativeHistogram, Histogram, Lut,
};

/// Intermediate and final buffers of one equalized channel.
#[derive(Debug, Clone)]
pub struct ChannelResult {
    /// Index of the plane in the split image.
    pub channel: usize,
    pub histogram: Histogram,
    pub cumulative: CumulativeHistogram,
    pub lut: Lut,
    pub output: ChannelBuffer,
}

/// Result of equalizing one image.
#[derive(Debug, Clone)]
pub struct Equalized {
    pub image: IntensityImage,
    /// Equalized channels in plane order; alpha planes have no entry.
    pub channels: Vec<ChannelResult>,
    pub report: MetricsReport,
}

/// Runs the equalization stages of every channel on one compute backend.
#[derive(Debug)]
pub struct Equalizer<B: ComputeBackend> {
    backend: B,
    config: EqualizeConfig,
}

impl<B: ComputeBackend> Equalizer<B> {
    pub fn new(backend: B, config: EqualizeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &EqualizeConfig {
        &self.config
    }

    pub fn equalize(&self, image: &IntensityImage) -> Result<Equalized> {
        let n = sample_count(image.pixel_count())?;
        let parts = split(image, self.config.channel_mode);

        tracing::info!(
            %image,
            backend = %self.backend.name(),
            bins = %self.config.bins,
            scan = %self.config.scan,
            mode = %self.config.channel_mode,
            "Equalizing image"
        );

        let results = try_par_map_limited(
            &parts.planes,
            self.config.max_concurrent_channels,
            |index, plane| {
                if parts.is_alpha(index) {
                    return Ok(None);
                }
                self.equalize_channel(index, plane, n)
                    .inspect_err(|e| {
                        tracing::error!(channel = index, error = %e, "Channel pipeline failed")
                    })
                    .map(Some)
            },
        )?;

        let outputs: Vec<ChannelBuffer> = parts
            .planes
            .iter()
            .zip(&results)
            .map(|(plane, result)| match result {
                Some((result, _)) => result.output.clone(),
                None => plane.clone(),
            })
            .collect();
        let image = merge(parts.width, parts.height, parts.layout, &outputs)?;

        let (channels, metrics): (Vec<_>, Vec<_>) = results.into_iter().flatten().unzip();
        let report = MetricsReport {
            backend: self.backend.name(),
            channels: metrics,
        };

        tracing::info!(
            channels = channels.len(),
            total = ?report.total_time(),
            "Equalization finished"
        );

        Ok(Equalized {
            image,
            channels,
            report,
        })
    }

    /// Upload, histogram, scan, normalize and back-project one plane, keeping
    /// intermediate buffers on the device.
    fn equalize_channel(
        &self,
        channel: usize,
        plane: &ChannelBuffer,
        n: u32,
    ) -> Result<(ChannelResult, ChannelMetrics)> {
        let backend = &self.backend;
        let EqualizeConfig {
            bins,
            scan,
            group_size,
            ..
        } = self.config;

        let mut metrics = ChannelMetrics::new(channel);

        let (samples, upload_metrics) = upload(backend, plane)?;
        metrics.record(upload_metrics);

        let histogram = histogram_on_device(
            backend,
            &samples,
            n,
            bins,
            group_size,
            scan.buffer_len(bins),
        )?;
        metrics.record(histogram.metrics);

        let cumulative = scan_on_device(backend, histogram.buffer, bins, scan, group_size)?;
        metrics.record(cumulative.metrics);

        let lut = normalize_on_device(backend, &cumulative.buffer, bins, n, group_size)?;
        metrics.record(lut.metrics);

        let output = project_on_device(backend, &samples, &lut.buffer, n, group_size)?;
        metrics.record(output.metrics);

        let result = ChannelResult {
            channel,
            histogram: histogram.value,
            cumulative: cumulative.value,
            lut: lut.value,
            output: output.value,
        };
        Ok((result, metrics))
    }
}
