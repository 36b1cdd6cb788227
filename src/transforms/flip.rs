//! Random horizontal and vertical flips.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, eager_map, gate_compiled, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::PipelineResult;
use crate::ops;
use crate::tensor::Tensor;
use rand::RngCore;

/// Flips horizontally with `horizontal_prob` and, independently, vertically
/// with `vertical_prob`.
#[derive(Debug, Clone, PartialEq)]
pub struct Flip {
    horizontal_prob: f32,
    vertical_prob: f32,
}

impl Flip {
    pub fn new(horizontal_prob: f32, vertical_prob: f32) -> Self {
        Self {
            horizontal_prob,
            vertical_prob,
        }
    }

    /// Unconditional horizontal flip.
    pub fn mirror() -> Self {
        Self::new(1.0, 0.0)
    }

    fn steps(&self) -> [(f32, ImageOp); 2] {
        [
            (self.horizontal_prob, ImageOp::FlipHorizontal),
            (self.vertical_prob, ImageOp::FlipVertical),
        ]
    }
}

impl FromParams for Flip {
    const TYPE_NAME: &'static str = "Flip";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        Ok(Self::new(
            params.prob(Self::TYPE_NAME, "horizontal_prob", 0.0)?,
            params.prob(Self::TYPE_NAME, "vertical_prob", 0.0)?,
        ))
    }
}

impl Transformation for Flip {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn graph_compilable(&self) -> bool {
        true
    }

    fn uses_opaque_function(&self) -> bool {
        false
    }

    fn apply_eager(&self, mut data: Vec<Value>, rng: &mut dyn RngCore) -> PipelineResult<Vec<Value>> {
        for (prob, op) in self.steps() {
            if ops::coin(rng, prob) {
                data = eager_map(data, &op, &[])?;
            }
        }
        Ok(data)
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let mut data = data.to_vec();
        for (prob, op) in self.steps() {
            if prob > 0.0 {
                let flipped = compiled_map(&data, &op, &[]);
                data = gate_compiled(prob, flipped, &data)?;
            }
        }
        Ok(data)
    }
}
