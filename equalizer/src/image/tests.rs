use common::test_utils::test_output_path;

use super::*;
use crate::common::Error;

fn rgb_image() -> IntensityImage {
    // 2x1: (1, 2, 3), (4, 5, 6)
    IntensityImage::new(2, 1, ChannelLayout::Rgb, vec![1, 2, 3, 4, 5, 6]).unwrap()
}

#[test]
fn layout_from_channel_count() {
    assert_eq!(ChannelLayout::from_channel_count(1).unwrap(), ChannelLayout::Gray);
    assert_eq!(ChannelLayout::from_channel_count(4).unwrap(), ChannelLayout::Rgba);
    assert!(matches!(
        ChannelLayout::from_channel_count(5),
        Err(Error::MalformedInput(_))
    ));
    assert_eq!(ChannelLayout::Rgba.alpha_index(), Some(3));
    assert!(!ChannelLayout::Rgb.has_alpha());
}

#[test]
fn raw_image_validation() {
    assert!(matches!(
        RawImage::new(0, 4, 1, 255, vec![]),
        Err(Error::MalformedInput(_))
    ));
    assert!(matches!(
        RawImage::new(2, 2, 1, 0, vec![0; 4]),
        Err(Error::MalformedInput(_))
    ));
    assert!(matches!(
        RawImage::new(2, 2, 1, 255, vec![0; 3]),
        Err(Error::MalformedInput(_))
    ));
    assert!(matches!(
        RawImage::new(2, 2, 1, 255, vec![0, 0, 0, 256]),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn eight_bit_widens_to_full_range() {
    let raw = RawImage::new(3, 1, 1, 255, vec![0, 128, 255]).unwrap();
    assert_eq!(raw.source_depth(), SourceDepth::Eight);

    let image = normalize_depth(raw).unwrap();
    assert_eq!(image.samples(), &[0, 128 * 257, 65535]);
}

#[test]
fn sixteen_bit_passes_through() {
    let raw = RawImage::new(3, 1, 1, 65535, vec![0, 300, 65535]).unwrap();
    assert_eq!(raw.source_depth(), SourceDepth::Sixteen);

    let image = normalize_depth(raw).unwrap();
    assert_eq!(image.samples(), &[0, 300, 65535]);
}

#[test]
fn depth_follows_declared_maximum() {
    // A 16-bit container whose samples never exceed 255 is still 16-bit.
    let raw = RawImage::new(1, 1, 1, 4095, vec![200]).unwrap();
    assert_eq!(normalize_depth(raw).unwrap().samples(), &[200]);
}

#[test]
fn split_per_channel() {
    let parts = split(&rgb_image(), ChannelMode::PerChannel);
    assert_eq!(parts.layout, ChannelLayout::Rgb);
    assert_eq!(parts.planes.len(), 3);
    assert_eq!(parts.planes[0].samples(), &[1, 4]);
    assert_eq!(parts.planes[2].samples(), &[3, 6]);
    assert!(!parts.is_alpha(2));
}

#[test]
fn split_marks_alpha() {
    let image =
        IntensityImage::new(1, 1, ChannelLayout::Rgba, vec![10, 20, 30, 40]).unwrap();
    let parts = split(&image, ChannelMode::PerChannel);
    assert!(parts.is_alpha(3));
    assert!(!parts.is_alpha(0));
}

#[test]
fn luminance_weights() {
    assert_eq!(luminance(0, 0, 0), 0);
    assert_eq!(luminance(65535, 65535, 65535), 65535);
    assert_eq!(luminance(1000, 0, 0), 299);
    assert_eq!(luminance(0, 1000, 0), 587);
    assert_eq!(luminance(0, 0, 1000), 114);
}

#[test]
fn luminance_split_is_single_gray_plane() {
    let parts = split(&rgb_image(), ChannelMode::Luminance);
    assert_eq!(parts.layout, ChannelLayout::Gray);
    assert_eq!(parts.planes.len(), 1);
    assert_eq!(parts.planes[0].samples(), &[luminance(1, 2, 3), luminance(4, 5, 6)]);

    let gray_alpha =
        IntensityImage::new(2, 1, ChannelLayout::GrayAlpha, vec![7, 100, 8, 200]).unwrap();
    let parts = split(&gray_alpha, ChannelMode::Luminance);
    assert_eq!(parts.layout, ChannelLayout::Gray);
    assert_eq!(parts.planes[0].samples(), &[7, 8]);
}

#[test]
fn merge_inverts_split() {
    let image = rgb_image();
    let parts = split(&image, ChannelMode::PerChannel);
    let merged = merge(parts.width, parts.height, parts.layout, &parts.planes).unwrap();
    assert_eq!(merged, image);
}

#[test]
fn merge_rejects_mismatched_channels() {
    let a = ChannelBuffer::new(vec![1, 2]);
    let short = ChannelBuffer::new(vec![1]);

    assert!(matches!(
        merge(2, 1, ChannelLayout::Rgb, &[a.clone(), a.clone()]),
        Err(Error::ChannelMismatch(_))
    ));
    assert!(matches!(
        merge(2, 1, ChannelLayout::GrayAlpha, &[a.clone(), short]),
        Err(Error::ChannelMismatch(_))
    ));
    assert!(matches!(
        merge(3, 1, ChannelLayout::Gray, &[a]),
        Err(Error::ChannelMismatch(_))
    ));
}

#[test]
fn intensity_image_checks_length() {
    assert!(matches!(
        IntensityImage::new(2, 2, ChannelLayout::Gray, vec![0; 3]),
        Err(Error::ChannelMismatch(_))
    ));
}

#[test]
fn png_round_trip_keeps_16_bits() {
    let path = test_output_path("image", "round_trip.png");
    let samples: Vec<u16> = (0..12).map(|i| i * 5000).collect();
    let image = IntensityImage::new(2, 2, ChannelLayout::Rgb, samples.clone()).unwrap();

    save_image(&image, &path).unwrap();
    let raw = load_image(&path).unwrap();

    assert_eq!(raw.max_value(), u16::MAX);
    assert_eq!(raw.layout(), ChannelLayout::Rgb);
    assert_eq!(normalize_depth(raw).unwrap().samples(), samples.as_slice());
}

#[test]
fn missing_file_is_malformed_input() {
    assert!(matches!(
        load_image("does/not/exist.png"),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn garbage_file_is_malformed_input() {
    let path = test_output_path("image", "garbage.pgm");
    std::fs::write(&path, b"not an image").unwrap();
    assert!(matches!(load_image(&path), Err(Error::MalformedInput(_))));
}
