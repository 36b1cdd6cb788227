//! Random HSV jittering.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, context_of, eager_map, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::PipelineResult;
use crate::ops;
use crate::tensor::Tensor;
use rand::RngCore;

/// Shifts hue by a draw from `h_range` (degrees) and scales saturation and
/// value by draws from `s_range` and `v_range`. One draw per call, shared
/// by every image of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct HsvJittering {
    h_range: (f32, f32),
    s_range: (f32, f32),
    v_range: (f32, f32),
}

impl HsvJittering {
    /// Ranges that leave every image untouched.
    pub const NEUTRAL: [f32; 6] = [0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

    pub fn new(h_range: (f32, f32), s_range: (f32, f32), v_range: (f32, f32)) -> Self {
        Self {
            h_range,
            s_range,
            v_range,
        }
    }

    /// Builds from the flat `[h_lo, h_hi, s_lo, s_hi, v_lo, v_hi]` form.
    pub fn from_flat(param: [f32; 6]) -> Self {
        Self::new((param[0], param[1]), (param[2], param[3]), (param[4], param[5]))
    }
}

impl FromParams for HsvJittering {
    const TYPE_NAME: &'static str = "HSVJittering";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        Ok(Self::new(
            params.range(Self::TYPE_NAME, "h_range", (0.0, 0.0))?,
            params.range(Self::TYPE_NAME, "s_range", (1.0, 1.0))?,
            params.range(Self::TYPE_NAME, "v_range", (1.0, 1.0))?,
        ))
    }
}

impl Transformation for HsvJittering {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn graph_compilable(&self) -> bool {
        true
    }

    fn uses_opaque_function(&self) -> bool {
        false
    }

    fn apply_eager(&self, data: Vec<Value>, rng: &mut dyn RngCore) -> PipelineResult<Vec<Value>> {
        let draws = [self.h_range, self.s_range, self.v_range]
            .map(|(low, high)| Value::ScalarF32(ops::uniform(&mut *rng, low, high)));
        eager_map(data, &ImageOp::HsvShift, &draws)
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let Some(ctx) = context_of(data) else {
            return Ok(vec![]);
        };
        let [h, s, v] = [self.h_range, self.s_range, self.v_range]
            .map(|(low, high)| Tensor::random_uniform(&ctx, low, high));
        Ok(compiled_map(data, &ImageOp::HsvShift, &[&h, &s, &v]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_util::{gradient, run_compiled};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fixed_ranges_match_between_modes() {
        let node = HsvJittering::new((30.0, 30.0), (0.5, 0.5), (1.2, 1.2));
        let img = Value::Tensor(gradient(3, 3, 3));
        let mut rng = StdRng::seed_from_u64(0);
        let eager = node.apply_eager(vec![img.clone()], &mut rng).unwrap();
        assert_ne!(eager[0], img);
        assert_eq!(run_compiled(&node, vec![img], 0).unwrap(), eager);
    }

    #[test]
    fn test_list_shares_one_draw() {
        let node = HsvJittering::from_flat([-20.0, 20.0, 0.7, 1.3, 0.8, 1.2]);
        let img = Value::Tensor(gradient(4, 4, 3));
        let mut rng = StdRng::seed_from_u64(3);
        let out = node.apply_eager(vec![img.clone(), img], &mut rng).unwrap();
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn test_defaults_are_neutral() {
        let node = HsvJittering::from_params(&TransformParams::new()).unwrap();
        assert_eq!(node, HsvJittering::from_flat(HsvJittering::NEUTRAL));
    }
}
