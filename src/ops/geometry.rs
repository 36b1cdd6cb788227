//! Geometric kernels: crops, bilinear resizing, flips and affine warps.

use super::{dims, hwc};
use crate::error::{PipelineError, PipelineResult};
use ndarray::{s, Array3, ArrayD, ArrayView3};

/// Crops a `height x width` window whose top-left corner sits at fraction
/// `(fy, fx)` of the free space. Windows larger than the image are clipped.
pub fn crop_at(img: &ArrayD<f32>, height: usize, width: usize, fx: f32, fy: f32) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "crop")?;
    let (h, w, _) = view.dim();
    let ch = height.min(h);
    let cw = width.min(w);
    let top = offset(h - ch, fy);
    let left = offset(w - cw, fx);
    Ok(view.slice(s![top..top + ch, left..left + cw, ..]).to_owned().into_dyn())
}

fn offset(free: usize, fraction: f32) -> usize {
    let pos = (free as f32 * fraction.clamp(0.0, 1.0)).round() as usize;
    pos.min(free)
}

pub fn center_crop(img: &ArrayD<f32>, height: usize, width: usize) -> PipelineResult<ArrayD<f32>> {
    crop_at(img, height, width, 0.5, 0.5)
}

/// Center-crops the long side so the result is square.
pub fn long_side_crop(img: &ArrayD<f32>) -> PipelineResult<ArrayD<f32>> {
    let (h, w, _) = dims(img, "long_side_crop")?;
    let side = h.min(w);
    center_crop(img, side, side)
}

/// Zero-pads the short side so the result is square, keeping the content centered.
pub fn pad_to_square(img: &ArrayD<f32>) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "pad_to_square")?;
    let (h, w, c) = view.dim();
    let side = h.max(w);
    let top = (side - h) / 2;
    let left = (side - w) / 2;
    let mut out = Array3::<f32>::zeros((side, side, c));
    out.slice_mut(s![top..top + h, left..left + w, ..]).assign(&view);
    Ok(out.into_dyn())
}

/// Bilinear resize with half-pixel centers.
pub fn resize(img: &ArrayD<f32>, height: usize, width: usize) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "resize")?;
    let (h, w, c) = view.dim();
    if height == 0 || width == 0 {
        return Err(PipelineError::invalid_param("resize", "size", "target size must be positive"));
    }
    if (h, w) == (height, width) {
        return Ok(img.clone());
    }
    let sy = h as f32 / height as f32;
    let sx = w as f32 / width as f32;
    let out = Array3::from_shape_fn((height, width, c), |(y, x, ch)| {
        let src_y = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, (h - 1) as f32);
        let src_x = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, (w - 1) as f32);
        bilinear(&view, src_y, src_x, ch).unwrap_or(0.0)
    });
    Ok(out.into_dyn())
}

/// Samples channel `ch` at a fractional position. `None` outside the image.
fn bilinear(view: &ArrayView3<f32>, y: f32, x: f32, ch: usize) -> Option<f32> {
    let (h, w, _) = view.dim();
    if y < 0.0 || x < 0.0 || y > (h - 1) as f32 || x > (w - 1) as f32 {
        return None;
    }
    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(h - 1);
    let x1 = (x0 + 1).min(w - 1);
    let dy = y - y0 as f32;
    let dx = x - x0 as f32;
    let top = view[[y0, x0, ch]] * (1.0 - dx) + view[[y0, x1, ch]] * dx;
    let bottom = view[[y1, x0, ch]] * (1.0 - dx) + view[[y1, x1, ch]] * dx;
    Some(top * (1.0 - dy) + bottom * dy)
}

pub fn flip_horizontal(img: &ArrayD<f32>) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "flip_horizontal")?;
    Ok(view.slice(s![.., ..;-1, ..]).to_owned().into_dyn())
}

pub fn flip_vertical(img: &ArrayD<f32>) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "flip_vertical")?;
    Ok(view.slice(s![..;-1, .., ..]).to_owned().into_dyn())
}

/// Inverse mapping `[a, b, c, d, e, f]`: output pixel `(x, y)` reads the
/// input at `(a*x + b*y + c, d*x + e*y + f)`.
pub type AffineMatrix = [f32; 6];

/// Builds the inverse mapping of a rotation (degrees) and uniform scale about
/// the image center followed by a translation given as fractions of the size.
pub fn affine_matrix(angle_deg: f32, scale: f32, tx: f32, ty: f32, height: usize, width: usize) -> AffineMatrix {
    let scale = if scale.abs() < f32::EPSILON { f32::EPSILON } else { scale };
    let theta = angle_deg.to_radians();
    let a = theta.cos() / scale;
    let b = theta.sin() / scale;
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let ox = cx + tx * width as f32;
    let oy = cy + ty * height as f32;
    [a, b, cx - a * ox - b * oy, -b, a, cy + b * ox - a * oy]
}

pub fn matrix_from_array(matrix: &ArrayD<f32>) -> PipelineResult<AffineMatrix> {
    let values: Vec<f32> = matrix.iter().copied().collect();
    values
        .try_into()
        .map_err(|_| PipelineError::type_mismatch("warp", "2x3 matrix", format!("{:?}", matrix.shape())))
}

pub fn matrix_to_array(matrix: &AffineMatrix) -> ArrayD<f32> {
    ArrayD::from_shape_fn(ndarray::IxDyn(&[2, 3]), |idx| matrix[idx[0] * 3 + idx[1]])
}

/// Warps `img` into a `height x width` canvas; pixels mapped from outside
/// the source are zero.
pub fn warp_affine(img: &ArrayD<f32>, matrix: &AffineMatrix, height: usize, width: usize) -> PipelineResult<ArrayD<f32>> {
    let view = hwc(img, "warp_affine")?;
    let (_, _, c) = view.dim();
    let [a, b, tx, d, e, ty] = *matrix;
    let out = Array3::from_shape_fn((height, width, c), |(y, x, ch)| {
        let (xf, yf) = (x as f32, y as f32);
        let src_x = a * xf + b * yf + tx;
        let src_y = d * xf + e * yf + ty;
        bilinear(&view, src_y, src_x, ch).unwrap_or(0.0)
    });
    Ok(out.into_dyn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn ramp(h: usize, w: usize, c: usize) -> ArrayD<f32> {
        ArrayD::from_shape_fn(IxDyn(&[h, w, c]), |idx| (idx[0] * w + idx[1]) as f32)
    }

    #[test]
    fn test_crop_offsets() {
        let img = ramp(4, 4, 1);
        let top_left = crop_at(&img, 2, 2, 0.0, 0.0).unwrap();
        assert_eq!(top_left[[0, 0, 0]], 0.0);
        let bottom_right = crop_at(&img, 2, 2, 1.0, 1.0).unwrap();
        assert_eq!(bottom_right[[1, 1, 0]], 15.0);
        let center = center_crop(&img, 2, 2).unwrap();
        assert_eq!(center.shape(), &[2, 2, 1]);
    }

    #[test]
    fn test_crop_larger_than_image_is_clipped() {
        let img = ramp(3, 5, 2);
        assert_eq!(crop_at(&img, 10, 10, 0.3, 0.7).unwrap().shape(), &[3, 5, 2]);
        assert_eq!(long_side_crop(&img).unwrap().shape(), &[3, 3, 2]);
        assert_eq!(pad_to_square(&img).unwrap().shape(), &[5, 5, 2]);
    }

    #[test]
    fn test_resize_shapes_and_constant_images() {
        let img = ArrayD::from_elem(IxDyn(&[5, 7, 3]), 42.0);
        let out = resize(&img, 16, 9).unwrap();
        assert_eq!(out.shape(), &[16, 9, 3]);
        assert!(out.iter().all(|&v| (v - 42.0).abs() < 1e-4));
        assert!(resize(&img, 0, 4).is_err());
    }

    #[test]
    fn test_flips_are_involutions() {
        let img = ramp(3, 4, 2);
        let h = flip_horizontal(&img).unwrap();
        assert_eq!(h[[0, 0, 0]], 3.0);
        assert_eq!(flip_horizontal(&h).unwrap(), img);
        let v = flip_vertical(&img).unwrap();
        assert_eq!(v[[0, 0, 0]], 8.0);
        assert_eq!(flip_vertical(&v).unwrap(), img);
    }

    #[test]
    fn test_identity_warp() {
        let img = ramp(6, 6, 1);
        let m = affine_matrix(0.0, 1.0, 0.0, 0.0, 6, 6);
        let out = warp_affine(&img, &m, 6, 6).unwrap();
        for (a, b) in out.iter().zip(img.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
        let round_trip = matrix_from_array(&matrix_to_array(&m)).unwrap();
        assert_eq!(round_trip, m);
    }
}
