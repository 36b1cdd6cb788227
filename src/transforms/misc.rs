//! Helpers shared by transformation nodes and datasets: the conditional
//! switch and the host function wrapper.

use crate::asg::{DType, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::runtime::backend::{BackendProvider, HostCall, HostFunction};
use crate::tensor::{GraphContext, Tensor};
use rand::RngCore;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Eager switch: a plain branch.
pub fn switch_between<T>(cond: bool, cond_true: T, cond_false: T) -> T {
    if cond {
        cond_true
    } else {
        cond_false
    }
}

/// Operand of [`switch_between_compiled`]: one node or a list of nodes.
#[derive(Debug, Clone)]
pub enum Operand<T> {
    Single(T),
    List(Vec<T>),
}

impl<T> Operand<T> {
    pub fn len(&self) -> usize {
        match self {
            Operand::Single(_) => 1,
            Operand::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Operand::List(_))
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Operand::Single(item) => vec![item],
            Operand::List(items) => items,
        }
    }
}

/// Graph switch. Every batch element may carry its own condition, so the
/// selection is the branch-free `t * mask + f * (1 - mask)` applied position
/// by position. The result is a single node when either operand was single.
pub fn switch_between_compiled(
    cond: &Tensor,
    cond_true: Operand<Tensor>,
    cond_false: Operand<Tensor>,
) -> PipelineResult<Operand<Tensor>> {
    let is_list = cond_true.is_list() && cond_false.is_list();
    let (true_len, false_len) = (cond_true.len(), cond_false.len());
    if true_len != false_len {
        return Err(PipelineError::SwitchLengthMismatch { true_len, false_len });
    }

    let mask = cond.cast(DType::F32);
    let one = Tensor::scalar(&cond.context, 1.0);
    let inverse = &one - &mask;
    let mut outputs: Vec<Tensor> = cond_true
        .into_vec()
        .iter()
        .zip(cond_false.into_vec().iter())
        .map(|(t, f)| &(t * &mask) + &(f * &inverse))
        .collect();

    if is_list {
        return Ok(Operand::List(outputs));
    }
    outputs
        .pop()
        .map(Operand::Single)
        .ok_or(PipelineError::SwitchLengthMismatch { true_len, false_len })
}

type HostFn<A> = dyn Fn(&A, HostCall<'_>) -> PipelineResult<Value> + Send + Sync;

/// A host callable bound to fixed arguments.
///
/// The same operator can be called directly in eager code or registered in a
/// graph, where the runtime invokes it once per batch element either as an
/// external source or as an opaque host function node.
pub struct FunctionOp<A> {
    name: String,
    function: Arc<HostFn<A>>,
    args: A,
}

impl<A> FunctionOp<A> {
    pub fn new<F>(name: impl Into<String>, args: A, function: F) -> Self
    where
        F: Fn(&A, HostCall<'_>) -> PipelineResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &A {
        &self.args
    }

    pub fn call(&self, call: HostCall<'_>) -> PipelineResult<Value> {
        (self.function)(&self.args, call)
    }

    /// Calls the function outside of any batch.
    pub fn call_with(&self, sample_id: usize, inputs: &[Value], rng: &mut dyn RngCore) -> PipelineResult<Value> {
        self.call(HostCall {
            batch_index: 0,
            sample_id,
            inputs,
            rng,
        })
    }
}

impl<A> FunctionOp<A>
where
    A: Send + Sync + fmt::Debug + 'static,
{
    /// Registers the operator as the external source of a graph and splits
    /// its tuple output into `num_outputs` tensors.
    ///
    /// Fails when the provider has no graph backend: a source node is only
    /// useful to a runtime that can execute it.
    pub fn graph_source(
        self,
        context: &Rc<RefCell<GraphContext>>,
        provider: &BackendProvider,
        num_outputs: usize,
    ) -> PipelineResult<Vec<Tensor>> {
        provider.backend()?;
        Ok(Tensor::external_source(context, Arc::new(self), num_outputs))
    }

    /// Appends an opaque host call node taking `inputs`.
    pub fn host_call(self, context: &Rc<RefCell<GraphContext>>, inputs: &[&Tensor]) -> Tensor {
        Tensor::host_call(context, Arc::new(self), inputs)
    }
}

impl<A> HostFunction for FunctionOp<A>
where
    A: Send + Sync + fmt::Debug,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, call: HostCall<'_>) -> PipelineResult<Value> {
        self.call(call)
    }
}

impl<A: Clone> Clone for FunctionOp<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            function: Arc::clone(&self.function),
            args: self.args.clone(),
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for FunctionOp<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionOp")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::NodeType;
    use crate::runtime::backend::{BatchFeed, GraphBackend};
    use crate::runtime::cpu_backend::CpuBackend;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_eager_switch() {
        assert_eq!(switch_between(true, "a", "b"), "a");
        assert_eq!(switch_between(false, vec![1], vec![2]), vec![2]);
    }

    #[test]
    fn test_compiled_switch_selects_per_element() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let cond = Tensor::new_input(&ctx, "cond");
        let a = Tensor::new_input(&ctx, "a");
        let b = Tensor::new_input(&ctx, "b");
        let out = switch_between_compiled(&cond, Operand::List(vec![a]), Operand::List(vec![b])).unwrap();
        assert!(out.is_list());
        let out = out.into_vec().remove(0);

        let def = ctx.borrow().finish(&[("out".to_string(), out)]);
        let feed = BatchFeed::default()
            .with_input("cond", vec![Value::ScalarBool(true), Value::ScalarBool(false)])
            .with_input("a", vec![Value::ScalarF32(1.0); 2])
            .with_input("b", vec![Value::ScalarF32(0.0); 2]);
        let mut rng = StdRng::seed_from_u64(0);
        let result = CpuBackend::new().run(&def, &feed, &mut rng).unwrap();
        assert_eq!(result[0], vec![Value::ScalarF32(1.0), Value::ScalarF32(0.0)]);
    }

    #[test]
    fn test_compiled_switch_single_and_mismatch() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let cond = Tensor::random_bernoulli(&ctx, 0.5);
        let a = Tensor::scalar(&ctx, 1.0);
        let b = Tensor::scalar(&ctx, 2.0);
        let out = switch_between_compiled(&cond, Operand::Single(a.clone()), Operand::List(vec![b.clone()])).unwrap();
        assert!(!out.is_list());

        let err = switch_between_compiled(&cond, Operand::List(vec![a.clone(), a]), Operand::Single(b)).unwrap_err();
        assert!(matches!(err, PipelineError::SwitchLengthMismatch { true_len: 2, false_len: 1 }));
    }

    #[test]
    fn test_function_op_binds_arguments() {
        let op = FunctionOp::new("offset", 10usize, |base: &usize, call: HostCall<'_>| {
            Ok(Value::ScalarI64((*base + call.sample_id) as i64))
        });
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(op.call_with(5, &[], &mut rng).unwrap(), Value::ScalarI64(15));
        assert_eq!(op.clone().args(), &10);
        assert!(format!("{op:?}").contains("offset"));
    }

    #[test]
    fn test_graph_source_requires_a_backend() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let op = FunctionOp::new("pair", (), |_: &(), call: HostCall<'_>| {
            Ok(Value::Tuple(vec![Value::ScalarI64(call.sample_id as i64), Value::ScalarBool(false)]))
        });
        let err = op.clone().graph_source(&ctx, &BackendProvider::unavailable(), 2).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Capability);

        let outputs = op.graph_source(&ctx, &BackendProvider::cpu(), 2).unwrap();
        assert_eq!(outputs.len(), 2);
        let graph = ctx.borrow();
        let node = graph.main_graph().get_node(outputs[1].node_id).unwrap();
        assert!(matches!(node.node_type, NodeType::TupleGet(_, 1)));
        assert!(graph.host_functions().contains_key("pair"));
    }
}
