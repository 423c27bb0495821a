use thiserror::Error;

use crate::gradient::{self, GradientError};
use crate::mat::BgrImage;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HistogramError {
    #[error("image is empty")]
    Empty,
    #[error("number of bins must be positive")]
    ZeroBins,
    #[error(transparent)]
    Gradient(#[from] GradientError),
}

/// 二维 rg 色度直方图，返回 `bins * bins` 个值，r 为外层、g 为内层
///
/// 对每个像素计算 r = R / (R + G + B)、g = G / (R + G + B)，
/// 通道和小于 1 的像素（纯黑）被跳过，最后除以参与统计的像素数量归一化。
pub fn chromaticity(image: &BgrImage, bins: usize) -> Result<Vec<f32>, HistogramError> {
    if image.is_empty() {
        return Err(HistogramError::Empty);
    }
    if bins == 0 {
        return Err(HistogramError::ZeroBins);
    }

    let mut hist = vec![0f32; bins * bins];
    let mut counted = 0usize;
    for [b, g, r] in image.pixels() {
        let sum = b as f32 + g as f32 + r as f32;
        if sum < 1. {
            continue;
        }
        let ri = bin_of(r as f32 / sum, bins);
        let gi = bin_of(g as f32 / sum, bins);
        hist[ri * bins + gi] += 1.;
        counted += 1;
    }

    if counted > 0 {
        let n = counted as f32;
        hist.iter_mut().for_each(|v| *v /= n);
    }
    Ok(hist)
}

/// 一维梯度幅值直方图
///
/// 依次计算 Sobel 梯度、幅值、灰度，然后按 `value * bins / 256` 分箱，
/// 除以全部像素数量归一化（不跳过任何像素）。
pub fn gradient_magnitude(image: &BgrImage, bins: usize) -> Result<Vec<f32>, HistogramError> {
    if image.is_empty() {
        return Err(HistogramError::Empty);
    }
    if bins == 0 {
        return Err(HistogramError::ZeroBins);
    }

    let gx = gradient::grad_x(image)?;
    let gy = gradient::grad_y(image)?;
    let gray = gradient::magnitude(&gx, &gy)?.to_gray();

    let mut hist = vec![0f32; bins];
    for &v in gray.data() {
        let bin = (v as usize * bins / 256).min(bins - 1);
        hist[bin] += 1.;
    }
    let n = gray.data().len() as f32;
    hist.iter_mut().for_each(|v| *v /= n);
    Ok(hist)
}

#[inline(always)]
fn bin_of(value: f32, bins: usize) -> usize {
    // value == 1.0 时落在最后一个箱
    ((value * bins as f32) as usize).min(bins - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(v: &[f32]) -> f32 {
        v.iter().sum()
    }

    #[test]
    fn test_chromaticity_pure_red() {
        let img = BgrImage::filled(4, 4, [0, 0, 200]);
        let hist = chromaticity(&img, 16).unwrap();
        assert_eq!(hist.len(), 256);
        // r = 1.0 落在 15，g = 0 落在 0
        assert_eq!(hist[15 * 16], 1.0);
        assert!((sum(&hist) - 1.).abs() < 1e-6);
    }

    #[test]
    fn test_chromaticity_gray() {
        let img = BgrImage::filled(3, 3, [90, 90, 90]);
        let hist = chromaticity(&img, 8).unwrap();
        // r = g = 1/3，1/3 * 8 = 2.67
        assert_eq!(hist[2 * 8 + 2], 1.0);
    }

    #[test]
    fn test_chromaticity_skips_black() {
        let img = BgrImage::from_fn(4, 1, |x, _| if x == 0 { [0, 255, 0] } else { [0, 0, 0] });
        let hist = chromaticity(&img, 16).unwrap();
        // 只统计了一个像素
        assert_eq!(hist[15], 1.0);
        assert!((sum(&hist) - 1.).abs() < 1e-6);
    }

    #[test]
    fn test_chromaticity_all_black() {
        let img = BgrImage::filled(4, 4, [0, 0, 0]);
        let hist = chromaticity(&img, 16).unwrap();
        assert!(hist.iter().all(|&v| v == 0.));
    }

    #[test]
    fn test_chromaticity_errors() {
        let empty = BgrImage::new(0, 3, vec![]).unwrap();
        assert_eq!(chromaticity(&empty, 16), Err(HistogramError::Empty));
        let img = BgrImage::filled(2, 2, [1, 2, 3]);
        assert_eq!(chromaticity(&img, 0), Err(HistogramError::ZeroBins));
    }

    #[test]
    fn test_gradient_flat_image() {
        let img = BgrImage::filled(6, 6, [120, 30, 200]);
        let hist = gradient_magnitude(&img, 16).unwrap();
        assert_eq!(hist.len(), 16);
        assert_eq!(hist[0], 1.0);
    }

    #[test]
    fn test_gradient_counts_every_pixel() {
        let img = BgrImage::from_fn(8, 8, |x, _| if x < 4 { [0; 3] } else { [255; 3] });
        let hist = gradient_magnitude(&img, 16).unwrap();
        assert!((sum(&hist) - 1.).abs() < 1e-6);
        assert!(hist[15] > 0.);
    }
}
