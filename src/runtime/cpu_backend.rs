//! Reference batched executor for pipeline graphs on the CPU.
//!
//! The backend walks the graph in dependency order and evaluates every node
//! for the whole batch at once, keeping one value per batch element. Random
//! nodes draw independently per element; image operators and host functions
//! run element by element through the same kernels eager mode uses.

use super::backend::{BatchFeed, GraphBackend, HostCall, Memo};
use crate::analysis::graph_check::GraphCheck;
use crate::asg::{AsgId, DType, NodeId, NodeType, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::ops;
use crate::tensor::GraphDefinition;
use rand::RngCore;
use tracing::debug;

/// Execution state of one graph run.
struct ExecutionContext<'a> {
    graph: &'a GraphDefinition,
    feed: &'a BatchFeed,
    batch_size: usize,
    memo: Memo<Value>,
}

impl<'a> ExecutionContext<'a> {
    fn new(graph: &'a GraphDefinition, feed: &'a BatchFeed) -> Self {
        Self {
            graph,
            feed,
            batch_size: feed.batch_size(),
            memo: Memo::new(),
        }
    }

    fn asg_id(&self) -> AsgId {
        self.graph.asg.id
    }

    fn operand(&self, node_id: NodeId) -> PipelineResult<&Vec<Value>> {
        self.memo.get(&(self.asg_id(), node_id)).ok_or_else(|| {
            PipelineError::Runtime(format!("node {node_id} was used before it was evaluated"))
        })
    }

    /// Per-element argument lists for a node with several inputs.
    fn gather(&self, inputs: &[NodeId]) -> PipelineResult<Vec<Vec<Value>>> {
        let columns = inputs
            .iter()
            .map(|id| self.operand(*id))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok((0..self.batch_size)
            .map(|b| columns.iter().map(|col| col[b].clone()).collect())
            .collect())
    }

    fn sample_id(&self, batch_index: usize) -> usize {
        self.feed.sample_ids.get(batch_index).copied().unwrap_or(batch_index)
    }

    fn host_function(&self, name: &str) -> PipelineResult<&'a std::sync::Arc<dyn super::backend::HostFunction>> {
        self.graph
            .host_functions
            .get(name)
            .ok_or_else(|| PipelineError::Runtime(format!("host function `{name}` is not registered")))
    }

    fn evaluate_node(&mut self, node_id: NodeId, rng: &mut dyn RngCore) -> PipelineResult<()> {
        let node = self.graph.asg.get_node(node_id)?;
        let batch = self.batch_size;

        let values: Vec<Value> = match &node.node_type {
            NodeType::Input { name } => {
                let fed = self.feed.inputs.get(name).ok_or_else(|| {
                    PipelineError::Runtime(format!("missing value for input `{name}` (node {node_id})"))
                })?;
                if fed.len() != batch {
                    return Err(PipelineError::ArityMismatch { expected: batch, got: fed.len() });
                }
                fed.clone()
            }
            NodeType::Literal(value) => vec![value.clone(); batch],
            NodeType::ExternalSource { function } => {
                let function = self.host_function(function)?;
                (0..batch)
                    .map(|b| {
                        function.invoke(HostCall {
                            batch_index: b,
                            sample_id: self.sample_id(b),
                            inputs: &[],
                            rng: &mut *rng,
                        })
                    })
                    .collect::<PipelineResult<_>>()?
            }
            NodeType::HostFunction { function, inputs } => {
                let function = self.host_function(function)?;
                let args = self.gather(inputs)?;
                args.iter()
                    .enumerate()
                    .map(|(b, element)| {
                        function.invoke(HostCall {
                            batch_index: b,
                            sample_id: self.sample_id(b),
                            inputs: element,
                            rng: &mut *rng,
                        })
                    })
                    .collect::<PipelineResult<_>>()?
            }
            NodeType::TupleGet(source, index) => self
                .operand(*source)?
                .iter()
                .map(|value| op_tuple_get(value, *index))
                .collect::<PipelineResult<_>>()?,
            NodeType::Add(l, r) | NodeType::Subtract(l, r) | NodeType::Multiply(l, r) => {
                let lhs = self.operand(*l)?;
                let rhs = self.operand(*r)?;
                let (name, f): (&str, fn(f32, f32) -> f32) = match &node.node_type {
                    NodeType::Add(..) => ("add", |a, b| a + b),
                    NodeType::Subtract(..) => ("subtract", |a, b| a - b),
                    _ => ("multiply", |a, b| a * b),
                };
                lhs.iter()
                    .zip(rhs.iter())
                    .map(|(a, b)| op_binary(name, a, b, f))
                    .collect::<PipelineResult<_>>()?
            }
            NodeType::Cast(source, dtype) => self
                .operand(*source)?
                .iter()
                .map(|value| op_cast(value, *dtype))
                .collect::<PipelineResult<_>>()?,
            NodeType::Clamp(source, min_val, max_val) => self
                .operand(*source)?
                .iter()
                .map(|value| op_clamp(value, *min_val, *max_val))
                .collect::<PipelineResult<_>>()?,
            NodeType::RandomUniform { low, high } => (0..batch)
                .map(|_| Value::ScalarF32(ops::uniform(&mut *rng, *low, *high)))
                .collect(),
            NodeType::RandomBernoulli { prob } => (0..batch)
                .map(|_| Value::ScalarBool(ops::coin(&mut *rng, *prob)))
                .collect(),
            NodeType::Image { op, inputs } => self
                .gather(inputs)?
                .iter()
                .map(|args| ops::run_image_op(op, args))
                .collect::<PipelineResult<_>>()?,
        };

        self.memo.insert((self.asg_id(), node_id), values);
        Ok(())
    }
}

fn op_tuple_get(value: &Value, index: usize) -> PipelineResult<Value> {
    match value {
        Value::Tuple(items) => items.get(index).cloned().ok_or(PipelineError::ArityMismatch {
            expected: index + 1,
            got: items.len(),
        }),
        other => Err(PipelineError::type_mismatch("tuple_get", "tuple", other.type_name())),
    }
}

/// Elementwise arithmetic. Scalars broadcast over tensors; two tensors must
/// have identical shapes.
fn op_binary(name: &str, lhs: &Value, rhs: &Value, f: fn(f32, f32) -> f32) -> PipelineResult<Value> {
    match (lhs, rhs) {
        (Value::Tensor(a), Value::Tensor(b)) => {
            if a.shape() != b.shape() {
                return Err(PipelineError::type_mismatch(
                    name,
                    format!("tensor of shape {:?}", a.shape()),
                    format!("tensor of shape {:?}", b.shape()),
                ));
            }
            let mut out = a.clone();
            out.zip_mut_with(b, |x, &y| *x = f(*x, y));
            Ok(Value::Tensor(out))
        }
        (Value::Tensor(a), scalar) => {
            let s = scalar_operand(name, scalar)?;
            Ok(Value::Tensor(a.mapv(|x| f(x, s))))
        }
        (scalar, Value::Tensor(b)) => {
            let s = scalar_operand(name, scalar)?;
            Ok(Value::Tensor(b.mapv(|y| f(s, y))))
        }
        (a, b) => Ok(Value::ScalarF32(f(scalar_operand(name, a)?, scalar_operand(name, b)?))),
    }
}

fn scalar_operand(name: &str, value: &Value) -> PipelineResult<f32> {
    match value {
        Value::ScalarF32(_) | Value::ScalarI64(_) | Value::ScalarBool(_) => value
            .as_f32()
            .ok_or_else(|| PipelineError::type_mismatch(name, "scalar", value.type_name())),
        other => Err(PipelineError::type_mismatch(name, "scalar", other.type_name())),
    }
}

fn op_cast(value: &Value, dtype: DType) -> PipelineResult<Value> {
    let mismatch = || PipelineError::type_mismatch("cast", format!("value castable to {dtype}"), value.type_name());
    match (dtype, value) {
        (DType::F32, Value::Tensor(_)) => Ok(value.clone()),
        (DType::F32, _) => value.as_f32().map(Value::ScalarF32).ok_or_else(mismatch),
        (DType::Bool, _) => value.as_bool().map(Value::ScalarBool).ok_or_else(mismatch),
        (DType::I64, _) => value
            .as_f32()
            .map(|v| Value::ScalarI64(v as i64))
            .ok_or_else(mismatch),
    }
}

fn op_clamp(value: &Value, min_val: f32, max_val: f32) -> PipelineResult<Value> {
    match value {
        Value::Tensor(arr) => Ok(Value::Tensor(arr.mapv(|x| x.clamp(min_val, max_val)))),
        Value::ScalarF32(v) => Ok(Value::ScalarF32(v.clamp(min_val, max_val))),
        other => Err(PipelineError::type_mismatch("clamp", "f32 tensor or scalar", other.type_name())),
    }
}

/// CPU implementation of [`GraphBackend`].
#[derive(Debug, Default, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl GraphBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn run(
        &self,
        graph: &GraphDefinition,
        feed: &BatchFeed,
        rng: &mut dyn RngCore,
    ) -> PipelineResult<Vec<Vec<Value>>> {
        let order = GraphCheck::run(graph)?;
        let mut context = ExecutionContext::new(graph, feed);
        debug!(nodes = order.len(), batch = context.batch_size, "running graph on cpu");

        for node_id in order {
            context.evaluate_node(node_id, rng)?;
        }

        graph
            .asg
            .outputs
            .iter()
            .map(|id| context.operand(*id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::backend::HostFunction;
    use crate::tensor::{GraphContext, Tensor};
    use ndarray::{ArrayD, IxDyn};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Counter;

    impl HostFunction for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn invoke(&self, call: HostCall<'_>) -> PipelineResult<Value> {
            Ok(Value::Tuple(vec![
                Value::ScalarI64(call.sample_id as i64),
                Value::ScalarBool(call.sample_id % 2 == 1),
            ]))
        }
    }

    #[test]
    fn test_arithmetic_with_scalar_broadcast() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let x = Tensor::new_input(&ctx, "x");
        let half = Tensor::scalar(&ctx, 0.5);
        let y = &(&x * &half) - &half;
        let def = ctx.borrow().finish(&[("y".to_string(), y)]);

        let feed = crate::runtime::backend::BatchFeed::default().with_input(
            "x",
            vec![
                Value::Tensor(ArrayD::from_elem(IxDyn(&[2, 2, 1]), 4.0)),
                Value::ScalarF32(1.0),
            ],
        );
        let mut rng = StdRng::seed_from_u64(0);
        let out = CpuBackend::new().run(&def, &feed, &mut rng).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0], Value::Tensor(ArrayD::from_elem(IxDyn(&[2, 2, 1]), 1.5)));
        assert_eq!(out[0][1], Value::ScalarF32(0.0));
    }

    #[test]
    fn test_external_source_and_cast() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let outputs = Tensor::external_source(&ctx, Arc::new(Counter), 2);
        let mask = outputs[1].cast(DType::F32);
        let def = ctx.borrow().finish(&[
            ("index".to_string(), outputs[0].clone()),
            ("mask".to_string(), mask),
        ]);
        let mut rng = StdRng::seed_from_u64(0);
        let out = CpuBackend::new()
            .run(&def, &BatchFeed::from_samples([3, 4]), &mut rng)
            .unwrap();
        assert_eq!(out[0], vec![Value::ScalarI64(3), Value::ScalarI64(4)]);
        assert_eq!(out[1], vec![Value::ScalarF32(1.0), Value::ScalarF32(0.0)]);
    }

    #[test]
    fn test_mismatched_tensor_shapes_fail() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let a = Tensor::new_literal(&ctx, Value::Tensor(ArrayD::zeros(IxDyn(&[2, 2, 3]))), "a");
        let b = Tensor::new_literal(&ctx, Value::Tensor(ArrayD::zeros(IxDyn(&[2, 2, 1]))), "b");
        let c = &a * &b;
        let def = ctx.borrow().finish(&[("c".to_string(), c)]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = CpuBackend::new()
            .run(&def, &BatchFeed::from_samples([0]), &mut rng)
            .unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_input_is_reported() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let x = Tensor::new_input(&ctx, "x");
        let def = ctx.borrow().finish(&[("x".to_string(), x)]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = CpuBackend::new()
            .run(&def, &BatchFeed::from_samples([0]), &mut rng)
            .unwrap_err();
        assert!(err.to_string().contains("missing value for input `x`"));
    }
}
