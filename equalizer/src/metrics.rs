//! Per-stage timing and parallel cost.
//!
//! Work counts the operations a stage performs, span the length of its
//! critical path in parallel steps. Both are derived from the problem size
//! only, never measured.

use std::fmt;
use std::time::Duration;

use crate::common::{ceil_log2, BinCount, INTENSITY_LEVELS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Upload,
    Histogram,
    Scan,
    Normalize,
    BackProject,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Histogram,
        Stage::Scan,
        Stage::Normalize,
        Stage::BackProject,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Stage::Upload => "Input Transfer",
            Stage::Histogram => "Histogram",
            Stage::Scan => "Cumulative Histogram",
            Stage::Normalize => "Normalize LUT",
            Stage::BackProject => "Back Projection",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Work and span of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cost {
    pub work: u64,
    pub span: u64,
}

impl Cost {
    pub fn new(work: u64, span: u64) -> Self {
        Self { work, span }
    }

    /// One write per sample, all in parallel.
    pub fn upload(sample_count: usize) -> Self {
        Self::new(sample_count as u64, 1)
    }

    /// `N + B` work; the span is the depth of the group reduction plus the local pass.
    pub fn histogram(sample_count: usize, bins: BinCount, group_size: u32) -> Self {
        let groups = sample_count.div_ceil(group_size as usize).max(1);
        Self::new(
            sample_count as u64 + bins.get() as u64,
            ceil_log2(groups) as u64 + 1,
        )
    }

    /// Blelloch on the padded size `P`: `2P - 1` work, `ceil(log2 P)` span.
    pub fn work_efficient_scan(bins: BinCount) -> Self {
        let padded = bins.padded();
        Self::new(2 * padded as u64 - 1, ceil_log2(padded) as u64)
    }

    /// Hillis-Steele on exactly `B` elements: `B * ceil(log2 B)` work, `ceil(log2 B)` span.
    pub fn step_efficient_scan(bins: BinCount) -> Self {
        let rounds = ceil_log2(bins.len()) as u64;
        Self::new(bins.get() as u64 * rounds, rounds)
    }

    pub fn normalize() -> Self {
        Self::new(INTENSITY_LEVELS as u64, 1)
    }

    pub fn back_project(sample_count: usize) -> Self {
        Self::new(sample_count as u64, 1)
    }
}

/// What one stage of one channel cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageMetrics {
    pub stage: Stage,
    /// Host/device transfers: the upload, or the readback of the stage output.
    pub transfer_time: Duration,
    /// Time from the first dispatch to the last completion.
    pub compute_time: Duration,
    pub cost: Cost,
}

impl StageMetrics {
    pub fn new(stage: Stage, cost: Cost) -> Self {
        Self {
            stage,
            transfer_time: Duration::ZERO,
            compute_time: Duration::ZERO,
            cost,
        }
    }

    pub fn with_transfer(mut self, transfer_time: Duration) -> Self {
        self.transfer_time += transfer_time;
        self
    }

    pub fn with_compute(mut self, compute_time: Duration) -> Self {
        self.compute_time += compute_time;
        self
    }

    pub fn total_time(&self) -> Duration {
        self.transfer_time + self.compute_time
    }
}

/// Stage metrics of one channel pipeline, in execution order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelMetrics {
    pub channel: usize,
    pub stages: Vec<StageMetrics>,
}

impl ChannelMetrics {
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            stages: Vec::with_capacity(Stage::ALL.len()),
        }
    }

    pub fn record(&mut self, metrics: StageMetrics) {
        tracing::debug!(
            channel = self.channel,
            stage = %metrics.stage,
            transfer = ?metrics.transfer_time,
            compute = ?metrics.compute_time,
            work = metrics.cost.work,
            span = metrics.cost.span,
            "Stage finished"
        );
        self.stages.push(metrics);
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageMetrics> {
        self.stages.iter().find(|m| m.stage == stage)
    }

    pub fn transfer_time(&self) -> Duration {
        self.stages.iter().map(|m| m.transfer_time).sum()
    }

    pub fn compute_time(&self) -> Duration {
        self.stages.iter().map(|m| m.compute_time).sum()
    }

    pub fn total_time(&self) -> Duration {
        self.transfer_time() + self.compute_time()
    }

    pub fn work(&self) -> u64 {
        self.stages.iter().map(|m| m.cost.work).sum()
    }

    /// Stages run one after another, so their spans add up.
    pub fn span(&self) -> u64 {
        self.stages.iter().map(|m| m.cost.span).sum()
    }
}

/// Metrics of a whole equalization run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsReport {
    pub backend: String,
    pub channels: Vec<ChannelMetrics>,
}

impl MetricsReport {
    pub fn total_time(&self) -> Duration {
        self.channels.iter().map(ChannelMetrics::total_time).sum()
    }

    pub fn work(&self) -> u64 {
        self.channels.iter().map(ChannelMetrics::work).sum()
    }

    /// Channels are independent; the run is as deep as its deepest channel.
    pub fn span(&self) -> u64 {
        self.channels
            .iter()
            .map(ChannelMetrics::span)
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Performance Metrics (seconds) and Complexity")?;
        writeln!(f, "Backend: {}", self.backend)?;

        for channel in &self.channels {
            writeln!(f, "Channel {}:", channel.channel)?;
            for (step, m) in channel.stages.iter().enumerate() {
                writeln!(f, "  Step {}: {}", step + 1, m.stage)?;
                writeln!(f, "    Transfer Time: {:.6}", m.transfer_time.as_secs_f64())?;
                writeln!(f, "    Kernel Time: {:.6}", m.compute_time.as_secs_f64())?;
                writeln!(f, "    Total Time: {:.6}", m.total_time().as_secs_f64())?;
                writeln!(f, "    Work: {} operations", m.cost.work)?;
                writeln!(f, "    Span: {} steps", m.cost.span)?;
            }
            writeln!(
                f,
                "  Channel Total: {:.6} seconds, {} operations, {} steps",
                channel.total_time().as_secs_f64(),
                channel.work(),
                channel.span()
            )?;
        }

        write!(
            f,
            "Overall Total Time: {:.6} seconds, {} operations, {} steps",
            self.total_time().as_secs_f64(),
            self.work(),
            self.span()
        )
    }
}
