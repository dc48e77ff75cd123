// Error handling
pub use crate::common::{BinCount, Error, Result, INTENSITY_LEVELS, MAX_INTENSITY};

// Images
pub use crate::image::{
    load_image, luminance, merge, normalize_depth, save_image, split, ChannelBuffer,
    ChannelLayout, ChannelMode, IntensityImage, RawImage, SourceDepth, SplitImage,
    SUPPORTED_EXTENSIONS,
};

// Compute backends
pub use crate::backend::{
    BackendKind, Completion, ComputeBackend, CpuBackend, CpuBuffer, DeviceBuffer, GridShape,
    Kernel,
};
#[cfg(feature = "wgpu")]
pub use crate::backend::{Gpu, GpuBackend, GpuBuffer};

// Stages
pub use crate::ops::{
    build_histogram, histogram_on_device, normalize, normalize_on_device, project,
    project_on_device, sample_count, scan, scan_on_device, upload, CumulativeHistogram,
    DeviceOutput, Histogram, Lut, PingPong, ScanAlgorithm, DEFAULT_GROUP_SIZE, MAX_GROUP_SIZE,
};

// Metrics
pub use crate::metrics::{ChannelMetrics, Cost, MetricsReport, Stage, StageMetrics};

// Orchestration
pub use crate::pipeline::{ChannelResult, EqualizeConfig, Equalized, Equalizer};

// Visualization
pub use crate::plot::{plot_histogram, plot_lut, DEFAULT_PLOT_HEIGHT, DEFAULT_PLOT_WIDTH};
