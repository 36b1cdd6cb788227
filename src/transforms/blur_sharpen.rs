//! Random gaussian blur or sharpening.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, context_of, eager_map, gate_compiled, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::ops;
use crate::tensor::Tensor;
use rand::RngCore;

/// Blurs with probability `blur_prob`, otherwise sharpens with probability
/// `sharpen_prob`; the two outcomes are exclusive.
///
/// The blur kernel size is drawn uniformly from the integers in
/// `kernel_range` (rounded up to odd), the sharpening amount from
/// `sharpen_range`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurAndSharpen {
    blur_prob: f32,
    sharpen_prob: f32,
    kernel_range: (f32, f32),
    sharpen_range: (f32, f32),
}

impl BlurAndSharpen {
    /// Probability of sharpening once blurring was ruled out.
    fn conditional_sharpen_prob(&self) -> f32 {
        if self.blur_prob >= 1.0 {
            0.0
        } else {
            (self.sharpen_prob / (1.0 - self.blur_prob)).min(1.0)
        }
    }

    fn kernel_draw_range(&self) -> (f32, f32) {
        (self.kernel_range.0, self.kernel_range.1 + 1.0)
    }
}

impl FromParams for BlurAndSharpen {
    const TYPE_NAME: &'static str = "BlurAndSharpen";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let name = Self::TYPE_NAME;
        let node = Self {
            blur_prob: params.prob(name, "blur_prob", 0.0)?,
            sharpen_prob: params.prob(name, "sharpen_prob", 0.0)?,
            kernel_range: params.range(name, "kernel_range", (3.0, 7.0))?,
            sharpen_range: params.range(name, "sharpen_range", (1.5, 2.0))?,
        };
        if node.blur_prob + node.sharpen_prob > 1.0 + f32::EPSILON {
            return Err(PipelineError::invalid_param(
                name,
                "sharpen_prob",
                format!("blur_prob + sharpen_prob = {} exceeds 1", node.blur_prob + node.sharpen_prob),
            ));
        }
        if node.kernel_range.0 < 1.0 {
            return Err(PipelineError::invalid_param(name, "kernel_range", "kernel sizes must be at least 1"));
        }
        Ok(node)
    }
}

impl Transformation for BlurAndSharpen {
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
        if ops::coin(rng, self.blur_prob) {
            let (low, high) = self.kernel_draw_range();
            let ksize = ops::uniform(rng, low, high);
            return eager_map(data, &ImageOp::Blur, &[Value::ScalarF32(ksize)]);
        }
        if ops::coin(rng, self.conditional_sharpen_prob()) {
            let amount = ops::uniform(rng, self.sharpen_range.0, self.sharpen_range.1);
            return eager_map(data, &ImageOp::Sharpen, &[Value::ScalarF32(amount)]);
        }
        Ok(data)
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let Some(ctx) = context_of(data) else {
            return Ok(vec![]);
        };
        let mut out = data.to_vec();
        let sharpen_prob = self.conditional_sharpen_prob();
        if sharpen_prob > 0.0 {
            let amount = Tensor::random_uniform(&ctx, self.sharpen_range.0, self.sharpen_range.1);
            let sharpened = compiled_map(data, &ImageOp::Sharpen, &[&amount]);
            out = gate_compiled(sharpen_prob, sharpened, data)?;
        }
        if self.blur_prob > 0.0 {
            let (low, high) = self.kernel_draw_range();
            let ksize = Tensor::random_uniform(&ctx, low, high);
            let blurred = compiled_map(data, &ImageOp::Blur, &[&ksize]);
            out = gate_compiled(self.blur_prob, blurred, &out)?;
        }
        Ok(out)
    }
}
