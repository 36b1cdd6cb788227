//! Placeholder node for disabled augmentations.

use super::params::TransformParams;
use super::registry::FromParams;
use super::Transformation;
use crate::asg::Value;
use crate::error::PipelineResult;
use crate::tensor::Tensor;
use rand::RngCore;

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity;

impl FromParams for Identity {
    const TYPE_NAME: &'static str = "Identity";

    fn from_params(_params: &TransformParams) -> PipelineResult<Self> {
        Ok(Identity)
    }
}

impl Transformation for Identity {
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
        Ok(data)
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        Ok(data.to_vec())
    }
}
