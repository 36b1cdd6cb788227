//! Irregular polygon masks used by region brightness augmentation.
//!
//! A mask is a random star-shaped polygon rasterized to `{0, 1}`, softened
//! with a gaussian blur, and repeated over the channel axis so it can be
//! multiplied with an image of the configured shape.

use super::filter::gaussian_blur;
use super::uniform;
use crate::error::{PipelineError, PipelineResult};
use ndarray::{Array3, ArrayD};
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonMaskConfig {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    /// Polygon center, as fractions of width / height.
    pub center_x_range: (f32, f32),
    pub center_y_range: (f32, f32),
    pub num_vertices: usize,
    /// Mean radius, as a fraction of the short side.
    pub radius_range: (f32, f32),
    /// Radial jitter, as a fraction of the mean radius.
    pub spikyness_range: (f32, f32),
    /// Angular jitter, as a fraction of the mean vertex spacing.
    pub irregularity_range: (f32, f32),
    pub max_blur_kernel_ratio: f32,
    pub min_blur_kernel_size: usize,
    pub blur_x_std: f32,
    pub blur_y_std: Option<f32>,
}

impl PolygonMaskConfig {
    /// Blur kernel size used to soften the mask edges.
    pub fn blur_kernel_size(&self) -> usize {
        let short = self.height.min(self.width) as f32;
        let from_ratio = (short * self.max_blur_kernel_ratio).round() as usize;
        from_ratio.max(self.min_blur_kernel_size)
    }
}

/// Draws vertices of a random star-shaped polygon around `(cx, cy)`.
///
/// Vertex radii are normal around the drawn radius with the drawn spikyness
/// as standard deviation, clipped to `[0, 2 * radius]`.
pub fn random_polygon(config: &PolygonMaskConfig, rng: &mut dyn RngCore) -> PipelineResult<Vec<(f32, f32)>> {
    let n = config.num_vertices.max(3);
    let short = config.height.min(config.width) as f32;
    let cx = uniform(rng, config.center_x_range.0, config.center_x_range.1) * config.width as f32;
    let cy = uniform(rng, config.center_y_range.0, config.center_y_range.1) * config.height as f32;
    let radius = uniform(rng, config.radius_range.0, config.radius_range.1) * short;
    let irregularity = uniform(rng, config.irregularity_range.0, config.irregularity_range.1) * TAU / n as f32;
    let spikyness = uniform(rng, config.spikyness_range.0, config.spikyness_range.1) * radius;
    let radial = Normal::new(radius, spikyness)
        .map_err(|e| PipelineError::invalid_param("RegionBrightness", "spikyness_range", e.to_string()))?;

    let step = TAU / n as f32;
    let mut steps: Vec<f32> = (0..n).map(|_| uniform(&mut *rng, step - irregularity, step + irregularity).max(0.0)).collect();
    let total: f32 = steps.iter().sum();
    if total > 0.0 {
        steps.iter_mut().for_each(|s| *s *= TAU / total);
    }

    let mut angle = uniform(rng, 0.0, TAU);
    Ok(steps
        .into_iter()
        .map(|s| {
            let r = radial.sample(&mut *rng).clamp(0.0, 2.0 * radius);
            let vertex = (cx + r * angle.cos(), cy + r * angle.sin());
            angle += s;
            vertex
        })
        .collect())
}

/// Even-odd rule test.
fn inside(polygon: &[(f32, f32)], x: f32, y: f32) -> bool {
    let mut result = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            result = !result;
        }
        j = i;
    }
    result
}

/// Rasterizes `polygon` into a blurred `[height, width, channels]` mask in `[0, 1]`.
pub fn rasterize(config: &PolygonMaskConfig, polygon: &[(f32, f32)]) -> PipelineResult<ArrayD<f32>> {
    let (h, w) = (config.height, config.width);
    let hard = if polygon.len() < 3 {
        Array3::<f32>::zeros((h, w, 1))
    } else {
        Array3::from_shape_fn((h, w, 1), |(y, x, _)| {
            if inside(polygon, x as f32 + 0.5, y as f32 + 0.5) {
                1.0
            } else {
                0.0
            }
        })
    };
    let sigma_y = config.blur_y_std.unwrap_or(config.blur_x_std);
    let soft = gaussian_blur(&hard.into_dyn(), config.blur_kernel_size(), config.blur_x_std, sigma_y)?;
    let channels = config.channels.max(1);
    Ok(ArrayD::from_shape_fn(ndarray::IxDyn(&[h, w, channels]), |idx| {
        soft[[idx[0], idx[1], 0]].clamp(0.0, 1.0)
    }))
}

pub fn random_mask(config: &PolygonMaskConfig, rng: &mut dyn RngCore) -> PipelineResult<ArrayD<f32>> {
    let polygon = random_polygon(config, rng)?;
    rasterize(config, &polygon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> PolygonMaskConfig {
        PolygonMaskConfig {
            height: 32,
            width: 32,
            channels: 3,
            center_x_range: (0.5, 0.5),
            center_y_range: (0.5, 0.5),
            num_vertices: 12,
            radius_range: (0.25, 0.25),
            spikyness_range: (0.0, 0.0),
            irregularity_range: (0.0, 0.0),
            max_blur_kernel_ratio: 0.025,
            min_blur_kernel_size: 3,
            blur_x_std: 1.0,
            blur_y_std: None,
        }
    }

    #[test]
    fn test_mask_shape_and_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mask = random_mask(&config(), &mut rng).unwrap();
        assert_eq!(mask.shape(), &[32, 32, 3]);
        assert!(mask.iter().all(|&v| (0.0..=1.0).contains(&v)));
        // center is inside, corners are not
        assert!(mask[[16, 16, 0]] > 0.99);
        assert_eq!(mask[[0, 0, 2]], 0.0);
        assert_eq!(mask[[16, 16, 0]], mask[[16, 16, 2]]);
    }

    #[test]
    fn test_zero_radius_gives_empty_mask() {
        let mut cfg = config();
        cfg.radius_range = (0.0, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        let mask = random_mask(&cfg, &mut rng).unwrap();
        assert!(mask.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_vertex_radii_follow_spikyness() {
        let mut cfg = config();
        cfg.num_vertices = 400;
        cfg.spikyness_range = (0.2, 0.2);
        let mut rng = StdRng::seed_from_u64(3);
        let polygon = random_polygon(&cfg, &mut rng).unwrap();
        let radius = 0.25 * 32.0;
        let radii: Vec<f32> = polygon
            .iter()
            .map(|(x, y)| ((x - 16.0).powi(2) + (y - 16.0).powi(2)).sqrt())
            .collect();
        assert!(radii.iter().all(|r| (0.0..=2.0 * radius + 1e-3).contains(r)));
        let mean = radii.iter().sum::<f32>() / radii.len() as f32;
        assert!((mean - radius).abs() < 0.5, "mean radius {mean}");
        assert!(radii.iter().any(|r| (r - radius).abs() > 0.5));

        // jitter with a negative spread has no distribution
        cfg.spikyness_range = (-0.5, -0.5);
        let err = random_polygon(&cfg, &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_inside_square() {
        let square = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
        assert!(inside(&square, 2.0, 2.0));
        assert!(!inside(&square, 5.0, 2.0));
        assert_eq!(config().blur_kernel_size(), 3);
    }
}
