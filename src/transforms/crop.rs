//! Center, random and long-side crops.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, context_of, eager_map, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::PipelineResult;
use crate::ops;
use crate::tensor::Tensor;
use rand::RngCore;

/// Crops the central `crop_size` window.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterCrop {
    height: usize,
    width: usize,
}

impl CenterCrop {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    fn op(&self) -> ImageOp {
        ImageOp::CenterCrop {
            height: self.height,
            width: self.width,
        }
    }
}

impl FromParams for CenterCrop {
    const TYPE_NAME: &'static str = "CenterCrop";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let (height, width) = params.require_size(Self::TYPE_NAME, "crop_size")?;
        Ok(Self::new(height, width))
    }
}

impl Transformation for CenterCrop {
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

/// Crops a `crop_size` window at a uniformly drawn offset. All images of
/// the list share the offset.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomCrop {
    height: usize,
    width: usize,
}

impl RandomCrop {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    fn op(&self) -> ImageOp {
        ImageOp::Crop {
            height: self.height,
            width: self.width,
        }
    }
}

impl FromParams for RandomCrop {
    const TYPE_NAME: &'static str = "RandomCrop";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let (height, width) = params.require_size(Self::TYPE_NAME, "crop_size")?;
        Ok(Self::new(height, width))
    }
}

impl Transformation for RandomCrop {
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
        let fx = ops::uniform(rng, 0.0, 1.0);
        let fy = ops::uniform(rng, 0.0, 1.0);
        eager_map(data, &self.op(), &[Value::ScalarF32(fx), Value::ScalarF32(fy)])
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let Some(ctx) = context_of(data) else {
            return Ok(vec![]);
        };
        let fx = Tensor::random_uniform(&ctx, 0.0, 1.0);
        let fy = Tensor::random_uniform(&ctx, 0.0, 1.0);
        Ok(compiled_map(data, &self.op(), &[&fx, &fy]))
    }
}

/// Crops the long side so the image becomes square.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LongSideCrop;

impl FromParams for LongSideCrop {
    const TYPE_NAME: &'static str = "LongSideCrop";

    fn from_params(_params: &TransformParams) -> PipelineResult<Self> {
        Ok(LongSideCrop)
    }
}

impl Transformation for LongSideCrop {
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
        eager_map(data, &ImageOp::LongSideCrop, &[])
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        Ok(compiled_map(data, &ImageOp::LongSideCrop, &[]))
    }
}
