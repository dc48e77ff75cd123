use super::*;
use crate::backend::CpuBackend;
use crate::common::test_utils::{gradient_4x4, random_samples, random_samples_in};
use crate::common::{BinCount, Error};
use crate::image::{normalize_depth, ChannelLayout, ChannelMode, RawImage};
use crate::metrics::Stage;
use crate::ops::{build_histogram, normalize, project, scan, ScanAlgorithm};

fn equalizer(config: EqualizeConfig) -> Equalizer<CpuBackend> {
    Equalizer::new(CpuBackend::new(), config).unwrap()
}

fn interleave(planes: &[Vec<u16>]) -> Vec<u16> {
    let pixels = planes[0].len();
    (0..pixels)
        .flat_map(|p| planes.iter().map(move |plane| plane[p]))
        .collect()
}

fn plane(image: &IntensityImage, channel: usize) -> Vec<u16> {
    let channels = image.layout().channel_count();
    image
        .samples()
        .iter()
        .skip(channel)
        .step_by(channels)
        .copied()
        .collect()
}

/// One plane through the host-level stages, for comparison.
fn equalize_plane(samples: Vec<u16>, config: &EqualizeConfig) -> Vec<u16> {
    let backend = CpuBackend::new();
    let input = ChannelBuffer::new(samples);
    let (hist, _) = build_histogram(&backend, &input, config.bins, config.group_size).unwrap();
    let (cum, _) = scan(&backend, &hist, config.scan).unwrap();
    let (lut, _) = normalize(&backend, &cum, input.len()).unwrap();
    project(&backend, &input, &lut).unwrap().0.into_samples()
}

#[test]
fn invalid_config_is_rejected_before_running() {
    let config = EqualizeConfig {
        group_size: 0,
        ..Default::default()
    };
    assert!(matches!(
        Equalizer::new(CpuBackend::new(), config),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn gray_4x4_gradient() {
    let raw = RawImage::new(4, 4, 1, 255, (0..16).map(|k| k * 17).collect()).unwrap();
    let image = normalize_depth(raw).unwrap();
    assert_eq!(image.samples(), gradient_4x4().as_slice());

    let config = EqualizeConfig::with_bins(16).unwrap();
    let result = equalizer(config).equalize(&image).unwrap();

    assert_eq!(result.channels.len(), 1);
    let channel = &result.channels[0];
    assert_eq!(channel.histogram.counts(), &[1; 16]);
    assert_eq!(channel.cumulative.values(), (0..16).collect::<Vec<u32>>().as_slice());
    assert!(channel.lut.is_monotonic());

    assert_eq!(result.image.layout(), ChannelLayout::Gray);
    assert_eq!(result.image.samples()[0], 0);
    assert!(result.image.samples().windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn rgb_channels_are_equalized_independently() {
    let planes = vec![
        random_samples_in(1, 600, 0, 10_000),
        random_samples_in(2, 600, 20_000, 40_000),
        random_samples(3, 600),
    ];
    let image = IntensityImage::new(30, 20, ChannelLayout::Rgb, interleave(&planes)).unwrap();
    let config = EqualizeConfig::default();

    let result = equalizer(config).equalize(&image).unwrap();

    assert_eq!(result.image.layout(), ChannelLayout::Rgb);
    assert_eq!(result.channels.len(), 3);
    for (c, samples) in planes.into_iter().enumerate() {
        assert_eq!(result.channels[c].channel, c);
        assert_eq!(plane(&result.image, c), equalize_plane(samples, &config));
    }
}

#[test]
fn alpha_passes_through() {
    let color = random_samples_in(4, 256, 1000, 2000);
    let alpha = random_samples(5, 256);
    let image = IntensityImage::new(
        16,
        16,
        ChannelLayout::GrayAlpha,
        interleave(&[color, alpha.clone()]),
    )
    .unwrap();

    let result = equalizer(EqualizeConfig::default())
        .equalize(&image)
        .unwrap();

    assert_eq!(result.channels.len(), 1);
    assert_eq!(result.report.channels.len(), 1);
    assert_eq!(plane(&result.image, 1), alpha);
}

#[test]
fn luminance_mode_produces_gray_output() {
    let planes = vec![
        random_samples(6, 100),
        random_samples(7, 100),
        random_samples(8, 100),
        vec![u16::MAX; 100],
    ];
    let image = IntensityImage::new(10, 10, ChannelLayout::Rgba, interleave(&planes)).unwrap();
    let config = EqualizeConfig {
        channel_mode: ChannelMode::Luminance,
        ..Default::default()
    };

    let result = equalizer(config).equalize(&image).unwrap();

    assert_eq!(result.image.layout(), ChannelLayout::Gray);
    assert_eq!(result.image.pixel_count(), 100);
    assert_eq!(result.channels.len(), 1);
}

#[test]
fn scan_algorithms_give_identical_images() {
    let image =
        IntensityImage::new(50, 40, ChannelLayout::Gray, random_samples(9, 2000)).unwrap();

    for bins in [1, 2, 200, 256] {
        let work = EqualizeConfig {
            bins: BinCount::new(bins).unwrap(),
            scan: ScanAlgorithm::WorkEfficient,
            ..Default::default()
        };
        let step = EqualizeConfig {
            scan: ScanAlgorithm::StepEfficient,
            ..work
        };

        let a = equalizer(work).equalize(&image).unwrap();
        let b = equalizer(step).equalize(&image).unwrap();
        assert_eq!(a.image, b.image, "bins = {bins}");
        assert_eq!(a.channels[0].cumulative, b.channels[0].cumulative);
    }
}

#[test]
fn concurrency_limit_does_not_change_output() {
    let planes = vec![
        random_samples(10, 400),
        random_samples(11, 400),
        random_samples(12, 400),
    ];
    let image = IntensityImage::new(20, 20, ChannelLayout::Rgb, interleave(&planes)).unwrap();

    let serial = EqualizeConfig {
        max_concurrent_channels: 1,
        ..Default::default()
    };
    let a = equalizer(serial).equalize(&image).unwrap();
    let b = equalizer(EqualizeConfig::default()).equalize(&image).unwrap();
    assert_eq!(a.image, b.image);
}

#[test]
fn report_covers_every_stage_in_order() {
    let image =
        IntensityImage::new(8, 8, ChannelLayout::Gray, random_samples(13, 64)).unwrap();
    let result = equalizer(EqualizeConfig::default())
        .equalize(&image)
        .unwrap();

    let channel = &result.report.channels[0];
    let stages: Vec<Stage> = channel.stages.iter().map(|m| m.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    let work: Vec<u64> = channel.stages.iter().map(|m| m.cost.work).collect();
    assert_eq!(work, vec![64, 64 + 256, 511, 65536, 64]);
    let span: Vec<u64> = channel.stages.iter().map(|m| m.cost.span).collect();
    assert_eq!(span, vec![1, 1, 8, 1, 1]);

    assert!(result.report.backend.starts_with("CPU"));
    assert!(result.report.to_string().contains("Step 5: Back Projection"));
}

#[test]
fn single_bin_image_is_uniform() {
    let image =
        IntensityImage::new(10, 10, ChannelLayout::Gray, random_samples(14, 100)).unwrap();
    let config = EqualizeConfig::with_bins(1).unwrap();
    let result = equalizer(config).equalize(&image).unwrap();

    assert_eq!(result.channels[0].histogram.counts(), &[100]);
    assert_eq!(result.channels[0].cumulative.values(), &[0]);
    assert!(result.image.samples().iter().all(|&s| s == 0));
}

#[test]
fn group_size_only_changes_histogram_span() {
    let image =
        IntensityImage::new(64, 64, ChannelLayout::Gray, random_samples(15, 4096)).unwrap();
    let small = EqualizeConfig {
        group_size: 16,
        ..Default::default()
    };

    let a = equalizer(small).equalize(&image).unwrap();
    let b = equalizer(EqualizeConfig::default()).equalize(&image).unwrap();

    assert_eq!(a.image, b.image);
    let span = |r: &Equalized| r.report.channels[0].stage(Stage::Histogram).unwrap().cost.span;
    // 256 groups of 16 versus 16 groups of 256.
    assert_eq!(span(&a), 9);
    assert_eq!(span(&b), 5);
}

#[test]
fn borrowed_backend_serves_several_equalizers() {
    let backend = CpuBackend::new();
    let image =
        IntensityImage::new(16, 16, ChannelLayout::Gray, random_samples(16, 256)).unwrap();

    let a = Equalizer::new(&backend, EqualizeConfig::default())
        .unwrap()
        .equalize(&image)
        .unwrap();
    let b = equalizer(EqualizeConfig::default()).equalize(&image).unwrap();
    assert_eq!(a.image, b.image);
}

#[cfg(feature = "wgpu")]
#[test]
fn gpu_matches_cpu_for_every_stage() {
    use crate::backend::GpuBackend;

    let gpu = match GpuBackend::create() {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("GPU unavailable (expected on headless systems): {}", e);
            return;
        }
    };

    let planes = vec![
        random_samples(17, 4096),
        random_samples_in(18, 4096, 1000, 9000),
        random_samples_in(19, 4096, 60_000, 65_535),
    ];
    let image = IntensityImage::new(64, 64, ChannelLayout::Rgb, interleave(&planes)).unwrap();

    for bins in [1, 2, 200, 256, 5000] {
        for scan in [ScanAlgorithm::WorkEfficient, ScanAlgorithm::StepEfficient] {
            let config = EqualizeConfig {
                bins: BinCount::new(bins).unwrap(),
                scan,
                ..Default::default()
            };
            let on_gpu = Equalizer::new(&gpu, config).unwrap().equalize(&image).unwrap();
            let on_cpu = equalizer(config).equalize(&image).unwrap();

            for (g, c) in on_gpu.channels.iter().zip(&on_cpu.channels) {
                let ctx = format!("bins = {bins}, {scan}, channel {}", c.channel);
                assert_eq!(g.histogram, c.histogram, "{ctx}");
                assert_eq!(g.cumulative, c.cumulative, "{ctx}");
                assert_eq!(g.lut, c.lut, "{ctx}");
                assert_eq!(g.output, c.output, "{ctx}");
            }
            assert_eq!(on_gpu.image, on_cpu.image, "bins = {bins}, {scan}");
        }
    }
}
