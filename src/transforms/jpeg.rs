//! Random JPEG recompression.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, context_of, eager_map, gate_compiled, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::ops;
use crate::tensor::Tensor;
use rand::RngCore;

/// With probability `prob`, encodes every image as JPEG at a quality drawn
/// uniformly from the integers in `quality_range` and decodes it back.
#[derive(Debug, Clone, PartialEq)]
pub struct JpegCompress {
    prob: f32,
    quality_range: (f32, f32),
}

impl JpegCompress {
    /// `U[q_min, q_max + 1)`, floored by the kernel.
    fn quality_draw_range(&self) -> (f32, f32) {
        (self.quality_range.0, self.quality_range.1 + 1.0)
    }
}

impl FromParams for JpegCompress {
    const TYPE_NAME: &'static str = "JpegCompress";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let name = Self::TYPE_NAME;
        let quality_range = params.range(name, "quality_range", (40.0, 60.0))?;
        if quality_range.0 < 1.0 || quality_range.1 > 100.0 {
            return Err(PipelineError::invalid_param(name, "quality_range", "quality must lie in [1, 100]"));
        }
        Ok(Self {
            prob: params.prob(name, "prob", 0.0)?,
            quality_range,
        })
    }
}

impl Transformation for JpegCompress {
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
        if !ops::coin(rng, self.prob) {
            return Ok(data);
        }
        let (low, high) = self.quality_draw_range();
        let quality = ops::uniform(rng, low, high);
        eager_map(data, &ImageOp::JpegQuality, &[Value::ScalarF32(quality)])
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let Some(ctx) = context_of(data) else {
            return Ok(vec![]);
        };
        if self.prob <= 0.0 {
            return Ok(data.to_vec());
        }
        let (low, high) = self.quality_draw_range();
        let quality = Tensor::random_uniform(&ctx, low, high);
        let compressed = compiled_map(data, &ImageOp::JpegQuality, &[&quality]);
        gate_compiled(self.prob, compressed, data)
    }
}
