//! Bar charts of histograms and lookup tables.
//!
//! Each output column covers a contiguous run of input values and shows the
//! largest of them; bars are scaled so the largest value fills the height.

use ::image::{GrayImage, Luma};

use crate::ops::Lut;

pub const DEFAULT_PLOT_WIDTH: u32 = 256;
pub const DEFAULT_PLOT_HEIGHT: u32 = 200;

const BAR: Luma<u8> = Luma([255]);

/// Renders `counts` (histogram or cumulative histogram) as white bars on black.
pub fn plot_histogram(counts: &[u32], width: u32, height: u32) -> GrayImage {
    let columns: Vec<u64> = (0..width as usize)
        .map(|x| {
            if counts.is_empty() {
                return 0;
            }
            let start = x * counts.len() / width as usize;
            let end = ((x + 1) * counts.len() / width as usize).max(start + 1);
            counts[start..end.min(counts.len())]
                .iter()
                .map(|&c| c as u64)
                .max()
                .unwrap_or(0)
        })
        .collect();

    draw_bars(&columns, width, height)
}

/// Renders the transfer curve of `lut`, sampled at `x * 65536 / width`.
pub fn plot_lut(lut: &Lut, width: u32, height: u32) -> GrayImage {
    let table = lut.as_slice();
    let columns: Vec<u64> = (0..width as usize)
        .map(|x| table[x * table.len() / width as usize] as u64)
        .collect();

    draw_bars(&columns, width, height)
}

fn draw_bars(columns: &[u64], width: u32, height: u32) -> GrayImage {
    let mut img = GrayImage::new(width, height);
    let max = columns.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return img;
    }

    for (x, &value) in columns.iter().enumerate() {
        let bar = (value * height as u64).div_ceil(max) as u32;
        for y in height - bar..height {
            img.put_pixel(x as u32, y, BAR);
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_height(img: &GrayImage, x: u32) -> u32 {
        (0..img.height())
            .filter(|&y| img.get_pixel(x, y)[0] == 255)
            .count() as u32
    }

    #[test]
    fn empty_and_zero_histograms_are_black() {
        for counts in [&[][..], &[0, 0, 0][..]] {
            let img = plot_histogram(counts, 16, 8);
            assert_eq!(img.dimensions(), (16, 8));
            assert!(img.pixels().all(|p| p[0] == 0));
        }
    }

    #[test]
    fn tallest_bin_fills_height() {
        let img = plot_histogram(&[1, 4, 2, 0], 4, 8);
        assert_eq!(bar_height(&img, 0), 2);
        assert_eq!(bar_height(&img, 1), 8);
        assert_eq!(bar_height(&img, 2), 4);
        assert_eq!(bar_height(&img, 3), 0);
        // Bars grow from the bottom.
        assert_eq!(img.get_pixel(0, 7)[0], 255);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn columns_keep_the_largest_bin() {
        let counts: Vec<u32> = (0..256).map(|i| if i == 130 { 100 } else { 1 }).collect();
        let img = plot_histogram(&counts, 64, 100);
        assert_eq!(bar_height(&img, 32), 100);
        assert_eq!(bar_height(&img, 0), 1);
    }

    #[test]
    fn narrow_histograms_stretch_across_columns() {
        let img = plot_histogram(&[3, 6], 4, 6);
        let heights: Vec<u32> = (0..4).map(|x| bar_height(&img, x)).collect();
        assert_eq!(heights, vec![3, 3, 6, 6]);
    }

    #[test]
    fn identity_lut_is_a_ramp() {
        let lut = Lut::new((0..=u16::MAX).collect()).unwrap();
        let img = plot_lut(&lut, DEFAULT_PLOT_WIDTH, DEFAULT_PLOT_HEIGHT);
        assert_eq!(img.dimensions(), (256, 200));

        let heights: Vec<u32> = (0..256).map(|x| bar_height(&img, x)).collect();
        assert_eq!(heights[0], 0);
        assert!(heights.windows(2).all(|w| w[0] <= w[1]));
        assert!(heights[255] >= 199);
    }
}
