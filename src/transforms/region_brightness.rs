//! Brightness change inside a random irregular region.

use super::misc::FunctionOp;
use super::params::TransformParams;
use super::registry::FromParams;
use super::{context_of, gate_compiled, Transformation};
use crate::asg::Value;
use crate::error::{PipelineError, PipelineResult};
use crate::ops::{self, color, mask::PolygonMaskConfig};
use crate::runtime::backend::HostCall;
use crate::tensor::Tensor;
use rand::RngCore;

#[derive(Debug, Clone, PartialEq)]
pub struct RegionParams {
    pub mask: PolygonMaskConfig,
    pub brightness_change: f32,
}

/// Draws `(mask, delta)`: a soft polygon mask shaped like the images and a
/// brightness delta from `[-brightness_change, brightness_change)`.
fn draw_region(params: &RegionParams, call: HostCall<'_>) -> PipelineResult<Value> {
    let rng = call.rng;
    let mask = ops::mask::random_mask(&params.mask, &mut *rng)?;
    let delta = ops::uniform(rng, -params.brightness_change, params.brightness_change);
    Ok(Value::Tuple(vec![Value::Tensor(mask), Value::ScalarF32(delta)]))
}

/// With probability `prob`, scales every image by `1 + delta * mask`.
///
/// The mask already carries `image_channels` channels because graph
/// arithmetic does not broadcast across channels; every image of the list
/// must therefore have exactly that many channels.
#[derive(Debug, Clone)]
pub struct RegionBrightness {
    generator: FunctionOp<RegionParams>,
    prob: f32,
    prefetch_queue_depth: usize,
}

impl RegionBrightness {
    pub fn new(params: RegionParams, prob: f32, prefetch_queue_depth: usize) -> Self {
        let name = format!("region_mask({params:?})");
        Self {
            generator: FunctionOp::new(name, params, draw_region),
            prob,
            prefetch_queue_depth,
        }
    }

    pub fn params(&self) -> &RegionParams {
        self.generator.args()
    }

    pub fn prefetch_queue_depth(&self) -> usize {
        self.prefetch_queue_depth
    }
}

impl FromParams for RegionBrightness {
    const TYPE_NAME: &'static str = "RegionBrightness";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let name = Self::TYPE_NAME;
        let (height, width) = params.require_size(name, "image_size")?;
        let channels: usize = params.get_or(name, "image_channels", 3)?;
        if channels == 0 {
            return Err(PipelineError::invalid_param(name, "image_channels", "must be positive"));
        }
        let mask = PolygonMaskConfig {
            height,
            width,
            channels,
            center_x_range: params.range(name, "center_x_range", (0.2, 0.8))?,
            center_y_range: params.range(name, "center_y_range", (0.25, 0.75))?,
            num_vertices: params.get_or(name, "num_vertices", 40)?,
            radius_range: params.range(name, "radius_range", (0.0, 0.25))?,
            spikyness_range: params.range(name, "spikyness_range", (0.1, 0.1))?,
            irregularity_range: params.range(name, "irregularity_range", (0.0, 1.0))?,
            max_blur_kernel_ratio: params.get_or(name, "max_blur_kernel_ratio", 0.025)?,
            min_blur_kernel_size: params.get_or(name, "min_blur_kernel_size", 3)?,
            blur_x_std: params.get_or(name, "blur_x_std", 3.0)?,
            blur_y_std: params.parse(name, "blur_y_std")?,
        };
        let region = RegionParams {
            mask,
            brightness_change: params.get_or(name, "brightness_change", 0.6)?,
        };
        Ok(Self::new(
            region,
            params.prob(name, "prob", 0.0)?,
            params.get_or(name, "prefetch_queue_depth", 32)?,
        ))
    }
}

fn unpack(region: Value) -> PipelineResult<(ndarray::ArrayD<f32>, f32)> {
    let mismatch = |actual: &str| PipelineError::type_mismatch(RegionBrightness::TYPE_NAME, "(mask, delta)", actual);
    match region {
        Value::Tuple(mut items) if items.len() == 2 => {
            let delta = items[1].as_f32().ok_or_else(|| mismatch(items[1].type_name()))?;
            match items.swap_remove(0) {
                Value::Tensor(mask) => Ok((mask, delta)),
                other => Err(mismatch(other.type_name())),
            }
        }
        other => Err(mismatch(other.type_name())),
    }
}

impl Transformation for RegionBrightness {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn graph_compilable(&self) -> bool {
        true
    }

    fn uses_opaque_function(&self) -> bool {
        true
    }

    fn apply_eager(&self, data: Vec<Value>, rng: &mut dyn RngCore) -> PipelineResult<Vec<Value>> {
        if !ops::coin(rng, self.prob) {
            return Ok(data);
        }
        let (mask, delta) = unpack(self.generator.call_with(0, &[], rng)?)?;
        data.into_iter()
            .map(|value| {
                let img = value.as_tensor().ok_or_else(|| {
                    PipelineError::type_mismatch(Self::TYPE_NAME, "tensor", value.type_name())
                })?;
                Ok(Value::Tensor(color::masked_brightness(img, &mask, delta)?))
            })
            .collect()
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let Some(ctx) = context_of(data) else {
            return Ok(vec![]);
        };
        if self.prob <= 0.0 {
            return Ok(data.to_vec());
        }
        let region = self.generator.clone().host_call(&ctx, &[]);
        let mask = region.tuple_get(0);
        let delta = region.tuple_get(1);
        let one = Tensor::scalar(&ctx, 1.0);
        let gain = &one + &(&delta * &mask);
        let changed = data.iter().map(|img| (img * &gain).clamp(0.0, 255.0)).collect();
        gate_compiled(self.prob, changed, data)
    }
}
