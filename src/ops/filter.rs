//! Spatial filters: separable gaussian blur, unsharp masking and
//! down-then-up resampling.

use super::geometry::resize;
use super::{clamp_pixel, hwc};
use crate::error::PipelineResult;
use ndarray::{Array3, ArrayD, ArrayView3};

/// Rounds a kernel size up to the next odd value (minimum 1).
pub fn odd_kernel_size(size: f32) -> usize {
    let k = size.max(1.0).floor() as usize;
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

/// Sigma used when none is given for kernel size `k`.
pub fn default_sigma(k: usize) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D gaussian weights of odd length `size`.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let size = odd_kernel_size(size as f32);
    let sigma = if sigma > 0.0 { sigma } else { default_sigma(size) };
    let half = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

fn convolve_axis(view: &ArrayView3<f32>, kernel: &[f32], vertical: bool) -> Array3<f32> {
    let (h, w, c) = view.dim();
    let half = (kernel.len() / 2) as isize;
    Array3::from_shape_fn((h, w, c), |(y, x, ch)| {
        kernel
            .iter()
            .enumerate()
            .map(|(i, weight)| {
                let delta = i as isize - half;
                let (sy, sx) = if vertical {
                    ((y as isize + delta).clamp(0, h as isize - 1) as usize, x)
                } else {
                    (y, (x as isize + delta).clamp(0, w as isize - 1) as usize)
                };
                weight * view[[sy, sx, ch]]
            })
            .sum()
    })
}

/// Separable gaussian blur with replicated borders. Non-positive sigmas are
/// derived from the kernel size.
pub fn gaussian_blur(img: &ArrayD<f32>, kernel_size: usize, sigma_x: f32, sigma_y: f32) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "gaussian_blur")?;
    if kernel_size <= 1 {
        return Ok(img.clone());
    }
    let horizontal = convolve_axis(&view, &gaussian_kernel(kernel_size, sigma_x), false);
    let vertical = convolve_axis(&horizontal.view(), &gaussian_kernel(kernel_size, sigma_y), true);
    Ok(vertical.into_dyn())
}

/// `blur + amount * (img - blur)` with a 3x3 gaussian; `amount = 1` is a no-op.
pub fn sharpen(img: &ArrayD<f32>, amount: f32) -> PipelineResult<ArrayD<f32>> {
    let blurred = gaussian_blur(img, 3, 0.0, 0.0)?;
    let mut out = blurred.clone();
    out.zip_mut_with(img, |b, &x| *b = clamp_pixel(*b + amount * (x - *b)));
    Ok(out)
}

/// Downsamples by `factor` and resizes back to the original size.
/// Factors at or below 1 leave the image untouched.
pub fn downsample(img: &ArrayD<f32>, factor: f32) -> PipelineResult<ArrayD<f32>> {
    let (h, w, _) = hwc(img, "downsample")?.dim();
    if factor <= 1.0 {
        return Ok(img.clone());
    }
    let small_h = ((h as f32 / factor).round() as usize).max(1);
    let small_w = ((w as f32 / factor).round() as usize).max(1);
    let small = resize(img, small_h, small_w)?;
    resize(&small, h, w)
}
