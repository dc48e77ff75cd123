use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use common::log_setup::{setup_logging, LogConfig};
use equalizer::{
    load_image, normalize_depth, plot_histogram, plot_lut, save_image, BackendKind, ChannelMode,
    ComputeBackend, CpuBackend, EqualizeConfig, Equalized, Equalizer, IntensityImage,
    ScanAlgorithm, DEFAULT_PLOT_HEIGHT, DEFAULT_PLOT_WIDTH,
};

/// Histogram equalization of 8- and 16-bit images on a data-parallel device.
#[derive(Debug, Parser)]
#[command(name = "equalize", version)]
struct Args {
    /// Input image (PNG, PNM or TIFF).
    input: PathBuf,

    /// Output image; defaults to `<input stem>_equalized.png` next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of histogram bins.
    #[arg(short, long)]
    bins: Option<u32>,

    /// Prefix-sum algorithm: work-efficient (blelloch) or step-efficient (hillis-steele).
    #[arg(short, long)]
    scan: Option<ScanAlgorithm>,

    /// Equalize color channels separately (per-channel) or as one luminance plane.
    #[arg(long)]
    mode: Option<ChannelMode>,

    /// Compute backend: auto, cpu or gpu.
    #[arg(long, default_value = "auto")]
    backend: BackendKind,

    /// Work-group size of the histogram reduction.
    #[arg(long)]
    group_size: Option<u32>,

    /// Worker threads of the CPU backend; rayon's default when omitted.
    #[arg(long)]
    threads: Option<usize>,

    /// Write histogram, cumulative histogram and LUT plots into this directory.
    #[arg(long)]
    plots: Option<PathBuf>,

    /// YAML or JSON configuration file; command-line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration (file plus flags) to this YAML or JSON file.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `equalizer=debug`. `RUST_LOG` wins when set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily-rolling log files into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn equalize_config(&self) -> anyhow::Result<EqualizeConfig> {
        let mut config = match &self.config {
            Some(path) => EqualizeConfig::from_file(path)?,
            None => EqualizeConfig::default(),
        };

        if let Some(bins) = self.bins {
            config.bins = bins.try_into()?;
        }
        if let Some(scan) = self.scan {
            config.scan = scan;
        }
        if let Some(mode) = self.mode {
            config.channel_mode = mode;
        }
        if let Some(group_size) = self.group_size {
            config.group_size = group_size;
        }

        config.validate()?;
        Ok(config)
    }

    fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| sibling(&self.input, "equalized", "png"))
    }

    fn cpu_backend(&self) -> anyhow::Result<CpuBackend> {
        Ok(match self.threads {
            Some(threads) => CpuBackend::with_threads(threads)?,
            None => CpuBackend::new(),
        })
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging(&LogConfig {
        level: args.log_level.clone(),
        file_dir: args.log_dir.clone(),
        ..Default::default()
    });

    let config = args.equalize_config()?;
    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote configuration");
    }

    let raw = load_image(&args.input)?;
    tracing::info!(
        input = %args.input.display(),
        depth = ?raw.source_depth(),
        "Loaded image"
    );
    let image = normalize_depth(raw)?;

    let result = equalize(&args, config, &image)?;

    let output = args.output_path();
    save_image(&result.image, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(output = %output.display(), "Wrote equalized image");

    if let Some(dir) = &args.plots {
        write_plots(dir, &args.input, &result)?;
    }

    println!("{}", result.report);
    Ok(())
}

fn equalize(
    args: &Args,
    config: EqualizeConfig,
    image: &IntensityImage,
) -> anyhow::Result<Equalized> {
    match args.backend {
        BackendKind::Cpu => run(args.cpu_backend()?, config, image),
        BackendKind::Gpu => run(gpu::backend()?, config, image),
        BackendKind::Auto => match gpu::backend() {
            Ok(backend) => run(backend, config, image),
            Err(e) => {
                tracing::warn!(error = %e, "GPU unavailable, falling back to CPU");
                run(args.cpu_backend()?, config, image)
            }
        },
    }
}

fn run<B: ComputeBackend>(
    backend: B,
    config: EqualizeConfig,
    image: &IntensityImage,
) -> anyhow::Result<Equalized> {
    let equalizer = Equalizer::new(backend, config)?;
    Ok(equalizer.equalize(image)?)
}

#[cfg(feature = "wgpu")]
mod gpu {
    pub fn backend() -> anyhow::Result<equalizer::GpuBackend> {
        Ok(equalizer::GpuBackend::create()?)
    }
}

#[cfg(not(feature = "wgpu"))]
mod gpu {
    pub fn backend() -> anyhow::Result<equalizer::CpuBackend> {
        anyhow::bail!("built without the `wgpu` feature")
    }
}

fn write_plots(dir: &Path, input: &Path, result: &Equalized) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let (width, height) = (DEFAULT_PLOT_WIDTH, DEFAULT_PLOT_HEIGHT);
    for channel in &result.channels {
        let c = channel.channel;
        let plots = [
            ("histogram", plot_histogram(channel.histogram.counts(), width, height)),
            ("cumulative", plot_histogram(channel.cumulative.values(), width, height)),
            ("lut", plot_lut(&channel.lut, width, height)),
        ];
        for (kind, plot) in plots {
            let path = dir.join(file_name(input, &format!("c{c}_{kind}"), "png"));
            plot.save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::debug!(path = %path.display(), "Wrote plot");
        }
    }
    Ok(())
}

fn file_name(input: &Path, suffix: &str, extension: &str) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    format!("{stem}_{suffix}.{extension}")
}

fn sibling(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    input.with_file_name(file_name(input, suffix, extension))
}
