//! Byte-level kernels backed by the `image` crate.

use super::geometry::{long_side_crop, pad_to_square};
use super::hwc;
use crate::error::{PipelineError, PipelineResult};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use ndarray::{s, ArrayD, IxDyn};

/// Decodes encoded image bytes (any format the `image` crate was built with)
/// into an HWC array with `channels` in {1, 3, 4}.
///
/// With `return_square` the result is made square, either by center-cropping
/// the long side (`center_crop`) or by zero-padding the short side.
pub fn decode(bytes: &[u8], channels: usize, return_square: bool, center_crop: bool) -> PipelineResult<ArrayD<f32>> {
    let decoded = image::load_from_memory(bytes)?;
    let img = from_dynamic(&decoded, channels)?;
    match (return_square, center_crop) {
        (false, _) => Ok(img),
        (true, true) => long_side_crop(&img),
        (true, false) => pad_to_square(&img),
    }
}

fn from_dynamic(img: &DynamicImage, channels: usize) -> PipelineResult<ArrayD<f32>> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw = match channels {
        1 => img.to_luma8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        4 => img.to_rgba8().into_raw(),
        other => {
            return Err(PipelineError::invalid_param(
                "Decode",
                "image_channels",
                format!("expected 1, 3 or 4 channels, got {other}"),
            ))
        }
    };
    let data: Vec<f32> = raw.into_iter().map(f32::from).collect();
    ArrayD::from_shape_vec(IxDyn(&[h, w, channels]), data)
        .map_err(|e| PipelineError::Runtime(format!("decoded buffer has unexpected size: {e}")))
}

fn to_u8(values: impl Iterator<Item = f32>) -> Vec<u8> {
    values.map(|v| v.round().clamp(0.0, 255.0) as u8).collect()
}

/// Round-trips the image through a JPEG encoder at `quality` (1..=100).
/// An alpha channel, if present, is carried over untouched.
pub fn jpeg_recompress(img: &ArrayD<f32>, quality: u8) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "jpeg_recompress")?;
    let (h, w, c) = view.dim();
    let color = match c {
        1 => {
            let raw = to_u8(view.iter().copied());
            GrayImage::from_raw(w as u32, h as u32, raw).map(DynamicImage::ImageLuma8)
        }
        3 | 4 => {
            let raw = to_u8(view.slice(s![.., .., 0..3]).iter().copied());
            RgbImage::from_raw(w as u32, h as u32, raw).map(DynamicImage::ImageRgb8)
        }
        other => {
            return Err(PipelineError::type_mismatch(
                "jpeg_recompress",
                "1, 3 or 4 channels",
                format!("{other} channels"),
            ))
        }
    }
    .ok_or_else(|| PipelineError::Runtime("image buffer does not match its dimensions".into()))?;

    let mut buffer = Vec::new();
    color.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)))?;
    let decoded = image::load_from_memory_with_format(&buffer, ImageFormat::Jpeg)?;

    let mut out = from_dynamic(&decoded, c.min(3))?;
    if c == 4 {
        let mut with_alpha = ndarray::Array3::<f32>::zeros((h, w, 4));
        with_alpha.slice_mut(s![.., .., 0..3]).assign(&hwc(&out, "jpeg_recompress")?);
        with_alpha.slice_mut(s![.., .., 3]).assign(&view.slice(s![.., .., 3]));
        out = with_alpha.into_dyn();
    }
    Ok(out)
}
