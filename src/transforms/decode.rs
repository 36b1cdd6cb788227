//! Decoding of encoded image bytes.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, eager_map, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::tensor::Tensor;
use rand::RngCore;

/// Decodes bytes into an HWC image with `image_channels` channels.
///
/// With `return_square` the image is made square, by center cropping the
/// long side when `center_crop` is set and by zero padding otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Decode {
    channels: usize,
    return_square: bool,
    center_crop: bool,
}

impl Decode {
    pub fn new(channels: usize, return_square: bool, center_crop: bool) -> PipelineResult<Self> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(PipelineError::invalid_param(
                Self::TYPE_NAME,
                "image_channels",
                format!("{channels} channels, expected 1, 3 or 4"),
            ));
        }
        Ok(Self {
            channels,
            return_square,
            center_crop,
        })
    }

    fn op(&self) -> ImageOp {
        ImageOp::Decode {
            channels: self.channels,
            return_square: self.return_square,
            center_crop: self.center_crop,
        }
    }
}

impl FromParams for Decode {
    const TYPE_NAME: &'static str = "Decode";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        Self::new(
            params.get_or(Self::TYPE_NAME, "image_channels", 3)?,
            params.get_or(Self::TYPE_NAME, "return_square", false)?,
            params.get_or(Self::TYPE_NAME, "center_crop", false)?,
        )
    }
}

impl Transformation for Decode {
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
