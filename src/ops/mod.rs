//! # Image kernels
//!
//! Deterministic numeric operators on HWC images stored as `ArrayD<f32>`
//! with pixel values in `[0, 255]`. Randomized transformations draw their
//! parameters first and then call one of these kernels, which is what keeps
//! eager execution and the graph backend in agreement: both end up in the
//! same function with the same arguments.
//!
//! - [`codec`]: byte decoding and JPEG re-encoding
//! - [`geometry`]: crops, resizes, flips, affine warps
//! - [`color`]: HSV jitter, brightness masks, normalization
//! - [`filter`]: gaussian blur, unsharp masking, down/up sampling
//! - [`mask`]: irregular polygon masks for region brightness

pub mod codec;
pub mod color;
pub mod filter;
pub mod geometry;
pub mod mask;

use crate::asg::{ImageOp, Value};
use crate::error::{PipelineError, PipelineResult};
use ndarray::{ArrayD, ArrayView3, Ix3};
use rand::{Rng, RngCore};

/// Views `img` as `[height, width, channels]`.
pub fn hwc<'a>(img: &'a ArrayD<f32>, op: &str) -> PipelineResult<ArrayView3<'a, f32>> {
    img.view().into_dimensionality::<Ix3>().map_err(|_| {
        PipelineError::type_mismatch(op, "HWC image", format!("array of shape {:?}", img.shape()))
    })
}

/// `(height, width, channels)` of an HWC image.
pub fn dims(img: &ArrayD<f32>, op: &str) -> PipelineResult<(usize, usize, usize)> {
    let view = hwc(img, op)?;
    let (h, w, c) = view.dim();
    Ok((h, w, c))
}

/// Draw from `U[low, high)`; a degenerate range returns `low` without
/// touching the generator.
pub fn uniform(rng: &mut dyn RngCore, low: f32, high: f32) -> f32 {
    if high <= low {
        low
    } else {
        rng.random_range(low..high)
    }
}

/// Biased coin. Probabilities outside `(0, 1)` are decided without a draw.
pub fn coin(rng: &mut dyn RngCore, prob: f32) -> bool {
    if prob <= 0.0 {
        false
    } else if prob >= 1.0 {
        true
    } else {
        rng.random_bool(prob as f64)
    }
}

pub(crate) fn clamp_pixel(x: f32) -> f32 {
    x.clamp(0.0, 255.0)
}

/// JPEG quality from a continuous draw: `U[q_min, q_max + 1)` floors to a
/// uniform integer in `q_min..=q_max`.
pub fn jpeg_quality(draw: f32) -> u8 {
    draw.floor().clamp(1.0, 100.0) as u8
}

fn scalar_arg(op: &ImageOp, args: &[Value], i: usize) -> PipelineResult<f32> {
    args[i].as_f32().ok_or_else(|| {
        PipelineError::type_mismatch(format!("{op:?}"), "scalar", args[i].type_name())
    })
}

/// Runs one image operator on already evaluated arguments.
///
/// `args[0]` is the image (encoded bytes for `Decode`), the rest are the
/// operator parameters in the order documented on [`ImageOp`]. Eager
/// transformations and graph backends both go through this function.
pub fn run_image_op(op: &ImageOp, args: &[Value]) -> PipelineResult<Value> {
    if args.len() != op.arity() {
        return Err(PipelineError::ArityMismatch {
            expected: op.arity(),
            got: args.len(),
        });
    }
    let image = move || {
        args[0]
            .as_tensor()
            .ok_or_else(|| PipelineError::type_mismatch(format!("{op:?}"), "tensor", args[0].type_name()))
    };
    let out = match op {
        ImageOp::Decode { channels, return_square, center_crop } => {
            let bytes = args[0]
                .as_bytes()
                .ok_or_else(|| PipelineError::type_mismatch("Decode", "bytes", args[0].type_name()))?;
            codec::decode(bytes, *channels, *return_square, *center_crop)?
        }
        ImageOp::CenterCrop { height, width } => geometry::center_crop(image()?, *height, *width)?,
        ImageOp::Crop { height, width } => geometry::crop_at(
            image()?,
            *height,
            *width,
            scalar_arg(op, args, 1)?,
            scalar_arg(op, args, 2)?,
        )?,
        ImageOp::LongSideCrop => geometry::long_side_crop(image()?)?,
        ImageOp::Resize { height, width } => geometry::resize(image()?, *height, *width)?,
        ImageOp::FlipHorizontal => geometry::flip_horizontal(image()?)?,
        ImageOp::FlipVertical => geometry::flip_vertical(image()?)?,
        ImageOp::Warp { height, width } => {
            let matrix = args[1]
                .as_tensor()
                .ok_or_else(|| PipelineError::type_mismatch("Warp", "2x3 matrix", args[1].type_name()))?;
            geometry::warp_affine(image()?, &geometry::matrix_from_array(matrix)?, *height, *width)?
        }
        ImageOp::HsvShift => color::hsv_shift(
            image()?,
            scalar_arg(op, args, 1)?,
            scalar_arg(op, args, 2)?,
            scalar_arg(op, args, 3)?,
        )?,
        ImageOp::Blur => {
            let k = filter::odd_kernel_size(scalar_arg(op, args, 1)?);
            filter::gaussian_blur(image()?, k, 0.0, 0.0)?
        }
        ImageOp::Sharpen => filter::sharpen(image()?, scalar_arg(op, args, 1)?)?,
        ImageOp::JpegQuality => codec::jpeg_recompress(image()?, jpeg_quality(scalar_arg(op, args, 1)?))?,
        ImageOp::Downsample => filter::downsample(image()?, scalar_arg(op, args, 1)?)?,
        ImageOp::Normalize { min_val, max_val } => color::normalize(image()?, *min_val, *max_val),
    };
    Ok(Value::Tensor(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_uniform_degenerate_range() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(uniform(&mut rng, 2.0, 2.0), 2.0);
        for _ in 0..100 {
            let v = uniform(&mut rng, -1.0, 1.0);
            assert!((-1.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_coin_extremes() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!coin(&mut rng, 0.0));
        assert!(coin(&mut rng, 1.0));
        let heads = (0..2000).filter(|_| coin(&mut rng, 0.25)).count();
        assert!(heads > 350 && heads < 650, "heads = {heads}");
    }

    #[test]
    fn test_run_image_op_checks_arguments() {
        let img = Value::Tensor(ArrayD::from_elem(ndarray::IxDyn(&[4, 4, 3]), 10.0));
        let err = run_image_op(&ImageOp::Crop { height: 2, width: 2 }, &[img.clone()]).unwrap_err();
        assert!(matches!(err, PipelineError::ArityMismatch { expected: 3, got: 1 }));
        let err = run_image_op(&ImageOp::FlipHorizontal, &[Value::ScalarF32(1.0)]).unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
        let out = run_image_op(
            &ImageOp::Crop { height: 2, width: 2 },
            &[img, Value::ScalarF32(0.5), Value::ScalarF32(0.5)],
        )
        .unwrap();
        assert_eq!(out.as_tensor().unwrap().shape(), &[2, 2, 3]);
        assert_eq!(jpeg_quality(59.99), 59);
    }

    #[test]
    fn test_hwc_rejects_flat_arrays() {
        let flat = ArrayD::<f32>::zeros(ndarray::IxDyn(&[4]));
        assert!(hwc(&flat, "test").is_err());
        let img = ArrayD::<f32>::zeros(ndarray::IxDyn(&[2, 3, 1]));
        assert_eq!(dims(&img, "test").unwrap(), (2, 3, 1));
    }
}
