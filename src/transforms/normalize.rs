//! Pixel range normalization.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, eager_map, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::tensor::Tensor;
use rand::RngCore;

/// Maps pixel values from `[0, 255]` onto `[min_val, max_val]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    min_val: f32,
    max_val: f32,
}

impl Normalize {
    pub fn new(min_val: f32, max_val: f32) -> Self {
        Self { min_val, max_val }
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min_val, self.max_val)
    }

    fn op(&self) -> ImageOp {
        ImageOp::Normalize {
            min_val: self.min_val,
            max_val: self.max_val,
        }
    }
}

impl FromParams for Normalize {
    const TYPE_NAME: &'static str = "Normalize";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let min_val = params.get_or(Self::TYPE_NAME, "min_val", -1.0)?;
        let max_val = params.get_or(Self::TYPE_NAME, "max_val", 1.0)?;
        if min_val >= max_val {
            return Err(PipelineError::invalid_param(
                Self::TYPE_NAME,
                "max_val",
                format!("max_val {max_val} must exceed min_val {min_val}"),
            ));
        }
        Ok(Self::new(min_val, max_val))
    }
}

impl Transformation for Normalize {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn graph_compilable(&self) -> bool {
        true
    }

    fn uses_opaque_function(&self) -> bool {
        false
    }

    fn apply_eager(&self, data: Vec<Value>, _rng: &mut dyn RngCore) -> PipelineResult<Vec<Value>> {
        eager_map(data, &self.op(), &[])
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        Ok(compiled_map(data, &self.op(), &[]))
    }
}
