//! Name-to-constructor table of every transformation node.

use super::params::{NodeSpec, TransformParams};
use super::{
    AffineTransform, BlurAndSharpen, CenterCrop, Decode, Flip, HsvJittering, Identity, JpegCompress,
    LongSideCrop, Normalize, ProgressiveResize, RandomCrop, RegionBrightness, Resize, ResizeAug,
    Transformation,
};
use crate::error::{PipelineError, PipelineResult};
use tracing::debug;

/// Construction of a node from keyword parameters.
pub trait FromParams: Transformation + Sized + 'static {
    /// Name the node is registered under (case sensitive).
    const TYPE_NAME: &'static str;

    fn from_params(params: &TransformParams) -> PipelineResult<Self>;
}

type Constructor = fn(&TransformParams) -> PipelineResult<Box<dyn Transformation>>;

fn build<T: FromParams>(params: &TransformParams) -> PipelineResult<Box<dyn Transformation>> {
    Ok(Box::new(T::from_params(params)?))
}

static REGISTRY: &[(&str, Constructor)] = &[
    (AffineTransform::TYPE_NAME, build::<AffineTransform> as Constructor),
    (BlurAndSharpen::TYPE_NAME, build::<BlurAndSharpen> as Constructor),
    (CenterCrop::TYPE_NAME, build::<CenterCrop> as Constructor),
    (RandomCrop::TYPE_NAME, build::<RandomCrop> as Constructor),
    (LongSideCrop::TYPE_NAME, build::<LongSideCrop> as Constructor),
    (Decode::TYPE_NAME, build::<Decode> as Constructor),
    (Flip::TYPE_NAME, build::<Flip> as Constructor),
    (HsvJittering::TYPE_NAME, build::<HsvJittering> as Constructor),
    (Identity::TYPE_NAME, build::<Identity> as Constructor),
    (JpegCompress::TYPE_NAME, build::<JpegCompress> as Constructor),
    (Normalize::TYPE_NAME, build::<Normalize> as Constructor),
    (RegionBrightness::TYPE_NAME, build::<RegionBrightness> as Constructor),
    (Resize::TYPE_NAME, build::<Resize> as Constructor),
    (ProgressiveResize::TYPE_NAME, build::<ProgressiveResize> as Constructor),
    (ResizeAug::TYPE_NAME, build::<ResizeAug> as Constructor),
];

/// Every registered type name, in registration order.
pub fn transformation_types() -> Vec<String> {
    REGISTRY.iter().map(|(name, _)| name.to_string()).collect()
}

/// Builds a node by type name.
pub fn build_transformation(
    transform_type: &str,
    params: &TransformParams,
) -> PipelineResult<Box<dyn Transformation>> {
    let (_, constructor) = REGISTRY
        .iter()
        .find(|(name, _)| *name == transform_type)
        .ok_or_else(|| PipelineError::UnknownTransformationType {
            name: transform_type.to_string(),
            allowed: transformation_types(),
        })?;
    debug!(transform_type, params = params.len(), "building transformation");
    constructor(params)
}

pub fn build_node(spec: &NodeSpec) -> PipelineResult<Box<dyn Transformation>> {
    build_transformation(&spec.transform_type, &spec.params)
}
