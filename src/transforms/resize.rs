//! Resizing nodes: plain, progressive (repeated halving) and the
//! downsample augmentation.

use super::params::TransformParams;
use super::registry::FromParams;
use super::{compiled_map, context_of, eager_map, gate_compiled, Transformation};
use crate::asg::{ImageOp, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::ops::{self, geometry};
use crate::tensor::Tensor;
use rand::RngCore;

/// Bilinear resize to `image_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resize {
    height: usize,
    width: usize,
}

impl Resize {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    fn op(&self) -> ImageOp {
        ImageOp::Resize {
            height: self.height,
            width: self.width,
        }
    }
}

impl FromParams for Resize {
    const TYPE_NAME: &'static str = "Resize";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let (height, width) = params.require_size(Self::TYPE_NAME, "image_size")?;
        Ok(Self::new(height, width))
    }
}

impl Transformation for Resize {
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

/// Halves the image while it is at least twice the target on both sides,
/// then resizes to the target. Large reductions alias less this way.
///
/// The number of halving steps depends on each input's size, which a static
/// graph cannot express, so the node is eager only.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressiveResize {
    height: usize,
    width: usize,
}

impl ProgressiveResize {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    fn resize_one(&self, value: Value) -> PipelineResult<Value> {
        let mut img = match value {
            Value::Tensor(img) => img,
            other => return Err(PipelineError::type_mismatch(Self::TYPE_NAME, "tensor", other.type_name())),
        };
        loop {
            let (h, w, _) = ops::dims(&img, Self::TYPE_NAME)?;
            if h < 2 * self.height || w < 2 * self.width {
                break;
            }
            img = geometry::resize(&img, h / 2, w / 2)?;
        }
        Ok(Value::Tensor(geometry::resize(&img, self.height, self.width)?))
    }
}

impl FromParams for ProgressiveResize {
    const TYPE_NAME: &'static str = "ProgressiveResize";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let (height, width) = params.require_size(Self::TYPE_NAME, "image_size")?;
        Ok(Self::new(height, width))
    }
}

impl Transformation for ProgressiveResize {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn graph_compilable(&self) -> bool {
        false
    }

    fn uses_opaque_function(&self) -> bool {
        false
    }

    fn apply_eager(&self, data: Vec<Value>, _rng: &mut dyn RngCore) -> PipelineResult<Vec<Value>> {
        data.into_iter().map(|value| self.resize_one(value)).collect()
    }

    fn apply_compiled(&self, _data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        Err(PipelineError::Capability(format!(
            "{} depends on the per-item input size and has no graph form",
            Self::TYPE_NAME
        )))
    }
}

/// Resolution augmentation: with probability `prob`, downsample by a factor
/// drawn from `down_range` and scale back up, then resize to `image_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeAug {
    height: usize,
    width: usize,
    prob: f32,
    down_range: (f32, f32),
}

impl ResizeAug {
    fn resize_op(&self) -> ImageOp {
        ImageOp::Resize {
            height: self.height,
            width: self.width,
        }
    }
}

impl FromParams for ResizeAug {
    const TYPE_NAME: &'static str = "ResizeAug";

    fn from_params(params: &TransformParams) -> PipelineResult<Self> {
        let (height, width) = params.require_size(Self::TYPE_NAME, "image_size")?;
        Ok(Self {
            height,
            width,
            prob: params.prob(Self::TYPE_NAME, "prob", 0.0)?,
            down_range: params.range(Self::TYPE_NAME, "down_range", (1.0, 2.5))?,
        })
    }
}

impl Transformation for ResizeAug {
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
        let data = if ops::coin(rng, self.prob) {
            let factor = ops::uniform(rng, self.down_range.0, self.down_range.1);
            eager_map(data, &ImageOp::Downsample, &[Value::ScalarF32(factor)])?
        } else {
            data
        };
        eager_map(data, &self.resize_op(), &[])
    }

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        let Some(ctx) = context_of(data) else {
            return Ok(vec![]);
        };
        let data = if self.prob > 0.0 {
            let factor = Tensor::random_uniform(&ctx, self.down_range.0, self.down_range.1);
            let down = compiled_map(data, &ImageOp::Downsample, &[&factor]);
            gate_compiled(self.prob, down, data)?
        } else {
            data.to_vec()
        };
        Ok(compiled_map(&data, &self.resize_op(), &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tensor::GraphContext;
    use crate::transforms::test_util::{gradient, run_compiled};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_resize_modes_agree() {
        let node = Resize::from_params(&TransformParams::new().with("image_size", 4)).unwrap();
        let img = Value::Tensor(gradient(8, 6, 3));
        let mut rng = StdRng::seed_from_u64(0);
        let eager = node.apply_eager(vec![img.clone()], &mut rng).unwrap();
        assert_eq!(eager[0].as_tensor().unwrap().shape(), &[4, 4, 3]);
        assert_eq!(run_compiled(&node, vec![img], 0).unwrap(), eager);
    }

    #[test]
    fn test_progressive_resize_is_eager_only() {
        let node = ProgressiveResize::new(4, 4);
        assert!(!node.graph_compilable());
        let mut rng = StdRng::seed_from_u64(0);
        let out = node.apply_eager_one(Value::Tensor(gradient(20, 17, 1)), &mut rng).unwrap();
        assert_eq!(out.as_tensor().unwrap().shape(), &[4, 4, 1]);

        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let x = Tensor::new_input(&ctx, "x");
        let err = node.apply_compiled(&[x]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
    }

    #[test]
    fn test_resize_aug_output_size() {
        let params = TransformParams::new()
            .with("image_size", 8)
            .with("prob", 1.0)
            .with("down_range", (2.0, 3.0));
        let node = ResizeAug::from_params(&params).unwrap();
        let img = Value::Tensor(gradient(8, 8, 3));
        let mut rng = StdRng::seed_from_u64(4);
        let out = node.apply_eager_one(img.clone(), &mut rng).unwrap();
        assert_eq!(out.as_tensor().unwrap().shape(), &[8, 8, 3]);
        assert_ne!(out, img);

        let compiled = run_compiled(&node, vec![img], 4).unwrap();
        assert_eq!(compiled[0].as_tensor().unwrap().shape(), &[8, 8, 3]);
    }

    #[test]
    fn test_resize_aug_disabled_is_plain_resize() {
        let node = ResizeAug::from_params(&TransformParams::new().with("image_size", 5)).unwrap();
        let img = Value::Tensor(gradient(10, 10, 3));
        let mut rng = StdRng::seed_from_u64(0);
        let expected = Resize::new(5, 5).apply_eager(vec![img.clone()], &mut rng).unwrap();
        assert_eq!(node.apply_eager(vec![img.clone()], &mut rng).unwrap(), expected);
        assert_eq!(run_compiled(&node, vec![img], 0).unwrap(), expected);
    }
}
