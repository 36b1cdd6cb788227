//! # Transformation nodes
//!
//! A pipeline is a chain of named [`Transformation`]s. Every node has two
//! entry points that must describe the same transformation:
//!
//! - [`Transformation::apply_eager`] runs on concrete values for one item;
//! - [`Transformation::apply_compiled`] appends nodes to a graph through
//!   symbolic [`Tensor`]s, to be executed later by a batched runtime.
//!
//! Both receive a list of values (for paired data: image A and image B) and
//! apply one random draw to the whole list, so paired images stay aligned.
//! Randomized nodes draw their parameters first and then call a kernel from
//! [`crate::ops`]; in a graph the draws become `RandomUniform` /
//! `RandomBernoulli` nodes (or a host function) feeding an `Image` node that
//! runs the same kernel, which keeps the two modes in distribution.
//!
//! Nodes are built by name through [`registry::build_transformation`].

pub mod affine;
pub mod blur_sharpen;
pub mod crop;
pub mod decode;
pub mod flip;
pub mod hsv;
pub mod identity;
pub mod jpeg;
pub mod misc;
pub mod normalize;
pub mod params;
pub mod region_brightness;
pub mod registry;
pub mod resize;

pub use affine::AffineTransform;
pub use blur_sharpen::BlurAndSharpen;
pub use crop::{CenterCrop, LongSideCrop, RandomCrop};
pub use decode::Decode;
pub use flip::Flip;
pub use hsv::HsvJittering;
pub use identity::Identity;
pub use jpeg::JpegCompress;
pub use misc::{switch_between, switch_between_compiled, FunctionOp, Operand};
pub use normalize::Normalize;
pub use params::{NodeSpec, TransformConfig, TransformParams};
pub use region_brightness::RegionBrightness;
pub use registry::{build_node, build_transformation, transformation_types, FromParams};
pub use resize::{ProgressiveResize, Resize, ResizeAug};

use crate::asg::{ImageOp, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::ops;
use crate::tensor::{GraphContext, Tensor};
use rand::RngCore;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The node contract. Implementations hold only their resolved parameters,
/// so one instance serves every eager call and every graph definition.
pub trait Transformation: Send + Sync + fmt::Debug {
    /// Registered type name.
    fn type_name(&self) -> &'static str;

    /// Whether [`Transformation::apply_compiled`] can express this node.
    fn graph_compilable(&self) -> bool;

    /// Whether the compiled form calls back into host code.
    fn uses_opaque_function(&self) -> bool;

    fn apply_eager(&self, data: Vec<Value>, rng: &mut dyn RngCore) -> PipelineResult<Vec<Value>>;

    fn apply_compiled(&self, data: &[Tensor]) -> PipelineResult<Vec<Tensor>>;

    /// Eager form for a single value.
    fn apply_eager_one(&self, value: Value, rng: &mut dyn RngCore) -> PipelineResult<Value> {
        let mut out = self.apply_eager(vec![value], rng)?;
        single(&mut out)
    }

    /// Compiled form for a single node.
    fn apply_compiled_one(&self, tensor: &Tensor) -> PipelineResult<Tensor> {
        let mut out = self.apply_compiled(std::slice::from_ref(tensor))?;
        single(&mut out)
    }
}

fn single<T>(out: &mut Vec<T>) -> PipelineResult<T> {
    if out.len() != 1 {
        return Err(PipelineError::ArityMismatch { expected: 1, got: out.len() });
    }
    out.pop().ok_or(PipelineError::ArityMismatch { expected: 1, got: 0 })
}

/// Runs `op` on every value with the same trailing parameters.
pub(crate) fn eager_map(data: Vec<Value>, op: &ImageOp, params: &[Value]) -> PipelineResult<Vec<Value>> {
    data.into_iter()
        .map(|value| {
            let mut args = Vec::with_capacity(params.len() + 1);
            args.push(value);
            args.extend_from_slice(params);
            ops::run_image_op(op, &args)
        })
        .collect()
}

/// Graph counterpart of [`eager_map`].
pub(crate) fn compiled_map(data: &[Tensor], op: &ImageOp, params: &[&Tensor]) -> Vec<Tensor> {
    data.iter().map(|t| t.image_op(op.clone(), params)).collect()
}

/// Graph owning `data`; `None` for an empty list.
pub(crate) fn context_of(data: &[Tensor]) -> Option<Rc<RefCell<GraphContext>>> {
    data.first().map(|t| Rc::clone(&t.context))
}

/// Keeps `applied` with probability `prob`, else `original`, using one draw
/// for the whole list.
pub(crate) fn gate_compiled(prob: f32, applied: Vec<Tensor>, original: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
    if prob >= 1.0 {
        return Ok(applied);
    }
    let Some(context) = context_of(original) else {
        return Ok(applied);
    };
    if prob <= 0.0 {
        return Ok(original.to_vec());
    }
    let cond = Tensor::random_bernoulli(&context, prob);
    Ok(switch_between_compiled(&cond, Operand::List(applied), Operand::List(original.to_vec()))?.into_vec())
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gate_extremes_do_not_add_random_nodes() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let x = Tensor::new_input(&ctx, "x");
        let flipped = compiled_map(std::slice::from_ref(&x), &ImageOp::FlipHorizontal, &[]);
        let before = ctx.borrow().main_graph().len();
        let kept = gate_compiled(0.0, flipped.clone(), std::slice::from_ref(&x)).unwrap();
        assert_eq!(kept[0].node_id, x.node_id);
        let applied = gate_compiled(1.0, flipped.clone(), std::slice::from_ref(&x)).unwrap();
        assert_eq!(applied[0].node_id, flipped[0].node_id);
        assert_eq!(ctx.borrow().main_graph().len(), before);
    }

    #[test]
    fn test_single_value_helpers() {
        let mut rng = StdRng::seed_from_u64(0);
        let img = Value::Tensor(gradient(2, 3, 1));
        let out = Identity.apply_eager_one(img.clone(), &mut rng).unwrap();
        assert_eq!(out, img);
        let compiled = run_compiled(&Identity, vec![img.clone()], 0).unwrap();
        assert_eq!(compiled, vec![img]);
    }
}
