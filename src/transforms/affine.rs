//! Random affine warp (rotation, scale, translation).

use super::misc::FunctionOp;
use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, context_of, eager_map, gate_compiled, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::PipelineResult;
use crate::ops::{self, geometry};
use crate::runtime::backend::HostCall;
use crate::tensor::Tensor;
use rand::RngCore;

/// Ranges the warp parameters are drawn from.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineParams {
    pub height: usize,
    pub width: usize,
    /// Degrees.
    pub rotation_range: (f32, f32),
    pub scale_range: (f32, f32),
    /// Fractions of the width / height.
    pub tx_range: (f32, f32),
    pub ty_range: (f32, f32),
}

/// Draws one warp and returns its `[2, 3]` inverse matrix.
fn draw_matrix(params: &AffineParams, call: HostCall<'_>) -> PipelineResult<Value> {
    let rng = call.rng;
    let angle = ops::uniform(rng, params.rotation_range.0, params.rotation_range.1);
    let scale = ops::uniform(rng, params.scale_range.0, params.scale_range.1);
    let tx = ops::uniform(rng, params.tx_range.0, params.tx_range.1);
    let ty = ops::uniform(rng, params.ty_range.0, params.ty_range.1);
    let matrix = geometry::affine_matrix(angle, scale, tx, ty, params.height, params.width);
    Ok(Value::Tensor(geometry::matrix_to_array(&matrix)))
}

/// With probability `prob`, warps every image of the list with one random
/// affine matrix onto an `image_size` canvas.
///
/// The matrix is produced by a host function, so graph runtimes see an
/// opaque call per element. `prefetch_queue_depth` is forwarded to runtimes
/// that buffer such calls.
#[derive(Debug, Clone)]
pub struct AffineTransform {
    generator: FunctionOp<AffineParams>,
    prob: f32,
    prefetch_queue_depth: usize,
}

impl AffineTransform {
    pub fn new(params: AffineParams, prob: f32, prefetch_queue_depth: usize) -> Self {
        let name = format!("affine_matrix({params:?})");
        Self {
            generator: FunctionOp::new(name, params, draw_matrix),
            prob,
            prefetch_queue_depth,
        }
    }

    pub fn params(&self) -> &AffineParams {
        self.generator.args()
    }

    pub fn prefetch_queue_depth(&self) -> usize {
        self.prefetch_queue_depth
    }

    fn op(&self) -> ImageOp {
        let params = self.params();
        ImageOp::Warp {
            height: params.height,
            width: params.width,
        }
    }
}

impl FromParams for AffineTransform {
    const TYPE_NAME: &'static str = "AffineTransform";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let name = Self::TYPE_NAME;
        let (height, width) = params.require_size(name, "image_size")?;
        let affine = AffineParams {
            height,
            width,
            rotation_range: params.range(name, "rotation_range", (-15.0, 15.0))?,
            scale_range: params.range(name, "scale_range", (0.95, 1.05))?,
            tx_range: params.range(name, "tx_range", (-0.02, 0.02))?,
            ty_range: params.range(name, "ty_range", (-0.02, 0.02))?,
        };
        Ok(Self::new(
            affine,
            params.prob(name, "prob", 0.0)?,
            params.get_or(name, "prefetch_queue_depth", 32)?,
        ))
    }
}

impl Transformation for AffineTransform {
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
        let matrix = self.generator.call_with(0, &[], rng)?;
        eager_map(data, &self.op(), &[matrix])
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let Some(ctx) = context_of(data) else {
            return Ok(vec![]);
        };
        if self.prob <= 0.0 {
            return Ok(data.to_vec());
        }
        let matrix = self.generator.clone().host_call(&ctx, &[]);
        let warped = compiled_map(data, &self.op(), &[&matrix]);
        gate_compiled(self.prob, warped, data)
    }
}
