//! Color kernels: HSV jitter, masked brightness and value-range normalization.

use super::{clamp_pixel, hwc};
use crate::error::{PipelineError, PipelineResult};
use ndarray::{Array3, ArrayD, Axis};

fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    (r + m, g + m, b + m)
}

/// Shifts hue by `hue_shift` degrees and scales saturation and value.
///
/// Single-channel images only have their value scaled. A fourth channel is
/// treated as alpha and left alone.
pub fn hsv_shift(img: &ArrayD<f32>, hue_shift: f32, sat_scale: f32, val_scale: f32) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "hsv_shift")?;
    match view.dim().2 {
        1 => Ok(view.mapv(|v| clamp_pixel(v * val_scale)).into_dyn()),
        3 | 4 => {
            let mut out: Array3<f32> = view.to_owned();
            for mut pixel in out.lanes_mut(Axis(2)) {
                let (hue, sat, val) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
                let (r, g, b) = hsv_to_rgb(
                    hue + hue_shift,
                    (sat * sat_scale).clamp(0.0, 1.0),
                    clamp_pixel(val * val_scale),
                );
                pixel[0] = clamp_pixel(r);
                pixel[1] = clamp_pixel(g);
                pixel[2] = clamp_pixel(b);
            }
            Ok(out.into_dyn())
        }
        other => Err(PipelineError::type_mismatch("hsv_shift", "1, 3 or 4 channels", format!("{other} channels"))),
    }
}

/// `clamp(img * (1 + delta * mask))`; `mask` must match the image shape.
pub fn masked_brightness(img: &ArrayD<f32>, mask: &ArrayD<f32>, delta: f32) -> PipelineResult<ArrayD<f32>> {
    if img.shape() != mask.shape() {
        return Err(PipelineError::type_mismatch(
            "masked_brightness",
            format!("mask of shape {:?}", img.shape()),
            format!("mask of shape {:?}", mask.shape()),
        ));
    }
    let gain = mask.mapv(|m| 1.0 + delta * m);
    Ok((img * &gain).mapv(clamp_pixel))
}

/// Maps `[0, 255]` linearly onto `[min_val, max_val]`.
pub fn normalize(img: &ArrayD<f32>, min_val: f32, max_val: f32) -> ArrayD<f32> {
    let span = max_val - min_val;
    img.mapv(|x| x / 255.0 * span + min_val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_hsv_round_trip_is_neutral() {
        let img = ArrayD::from_shape_vec(
            IxDyn(&[1, 3, 3]),
            vec![255.0, 0.0, 0.0, 12.0, 200.0, 90.0, 30.0, 30.0, 30.0],
        )
        .unwrap();
        let out = hsv_shift(&img, 0.0, 1.0, 1.0).unwrap();
        for (a, b) in out.iter().zip(img.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_hue_rotation() {
        let red = ArrayD::from_shape_vec(IxDyn(&[1, 1, 3]), vec![255.0, 0.0, 0.0]).unwrap();
        let green = hsv_shift(&red, 120.0, 1.0, 1.0).unwrap();
        assert!((green[[0, 0, 1]] - 255.0).abs() < 1e-3);
        assert!(green[[0, 0, 0]].abs() < 1e-3);
        let gray = ArrayD::from_elem(IxDyn(&[2, 2, 1]), 100.0);
        assert_eq!(hsv_shift(&gray, 90.0, 0.0, 3.0).unwrap()[[0, 0, 0]], 255.0);
    }

    #[test]
    fn test_masked_brightness() {
        let img = ArrayD::from_elem(IxDyn(&[2, 2, 1]), 100.0);
        let mut mask = ArrayD::zeros(IxDyn(&[2, 2, 1]));
        mask[[0, 0, 0]] = 1.0;
        let out = masked_brightness(&img, &mask, 0.5).unwrap();
        assert_eq!(out[[0, 0, 0]], 150.0);
        assert_eq!(out[[1, 1, 0]], 100.0);
        let wrong = ArrayD::zeros(IxDyn(&[2, 2, 3]));
        assert!(masked_brightness(&img, &wrong, 0.5).is_err());
    }

    #[test]
    fn test_normalize_bounds() {
        let img = ArrayD::from_shape_vec(IxDyn(&[1, 2, 1]), vec![0.0, 255.0]).unwrap();
        let out = normalize(&img, -1.0, 1.0);
        assert_eq!(out[[0, 0, 0]], -1.0);
        assert_eq!(out[[0, 1, 0]], 1.0);
    }
}
