//! `Tensor` and `GraphContext`: the symbolic side of graph mode.
//!
//! A `Tensor` holds no data. It is a lightweight handle to a node of the ASG
//! owned by a shared `GraphContext`; every operation on it appends a node
//! instead of computing anything. Transformation nodes receive and return
//! tensors from their `apply_compiled` entry point, so the same pipeline
//! definition that runs eagerly can be emitted as a static batched graph.
//!
//! Opaque host callbacks (external sources, parameter generators) cannot live
//! in the serializable `Asg`, so the context keeps them in a side table keyed
//! by name. Both halves travel together in a [`GraphDefinition`].

use crate::asg::{Asg, DType, ImageOp, NodeId, NodeType, Value};
use crate::runtime::backend::HostFunction;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Add, Mul, Sub};
use std::rc::Rc;
use std::sync::Arc;

/// Owns the graph under construction and the host functions it references.
///
/// Wrapped in `Rc<RefCell<>>` so that many `Tensor` handles can share it.
#[derive(Debug, Clone)]
pub struct GraphContext {
    main_graph: Asg,
    host_functions: HashMap<String, Arc<dyn HostFunction>>,
}

impl GraphContext {
    pub fn new() -> Self {
        Self {
            main_graph: Asg::new(0, Some("main".to_string())),
            host_functions: HashMap::new(),
        }
    }

    pub fn main_graph_mut(&mut self) -> &mut Asg {
        &mut self.main_graph
    }

    pub fn main_graph(&self) -> &Asg {
        &self.main_graph
    }

    /// Registers a host function under its own name. Registering the same
    /// name twice keeps the first instance.
    pub fn register_host_function(&mut self, function: Arc<dyn HostFunction>) -> String {
        let name = function.name().to_string();
        self.host_functions.entry(name.clone()).or_insert(function);
        name
    }

    pub fn host_functions(&self) -> &HashMap<String, Arc<dyn HostFunction>> {
        &self.host_functions
    }

    /// Freezes the context into a definition with the given named outputs.
    pub fn finish(&self, outputs: &[(String, Tensor)]) -> GraphDefinition {
        let mut asg = self.main_graph.clone();
        asg.set_outputs(outputs.iter().map(|(_, t)| t.node_id).collect());
        GraphDefinition {
            asg,
            host_functions: self.host_functions.clone(),
            output_names: outputs.iter().map(|(name, _)| name.clone()).collect(),
        }
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete, static graph handed to a [`crate::runtime::backend::GraphBackend`].
#[derive(Debug, Clone)]
pub struct GraphDefinition {
    pub asg: Asg,
    pub host_functions: HashMap<String, Arc<dyn HostFunction>>,
    /// One name per entry of `asg.outputs`.
    pub output_names: Vec<String>,
}

/// Symbolic handle to one node of the graph.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub node_id: NodeId,
    pub context: Rc<RefCell<GraphContext>>,
}

impl Tensor {
    fn from_node(context: &Rc<RefCell<GraphContext>>, name: Option<&str>, node_type: NodeType) -> Self {
        let node_id = context
            .borrow_mut()
            .main_graph_mut()
            .add_node(name.map(str::to_string), node_type);
        Self {
            node_id,
            context: Rc::clone(context),
        }
    }

    fn derive(&self, node_type: NodeType) -> Self {
        Self::from_node(&self.context, None, node_type)
    }

    /// Creates a named graph input that the runtime feeds per batch element.
    pub fn new_input(context: &Rc<RefCell<GraphContext>>, name: &str) -> Self {
        let tensor = Self::from_node(context, Some(name), NodeType::Input { name: name.to_string() });
        context.borrow_mut().main_graph_mut().inputs.push(tensor.node_id);
        tensor
    }

    /// Embeds a constant into the graph.
    pub fn new_literal(context: &Rc<RefCell<GraphContext>>, value: Value, name: &str) -> Self {
        Self::from_node(context, Some(name), NodeType::Literal(value))
    }

    pub fn scalar(context: &Rc<RefCell<GraphContext>>, value: f32) -> Self {
        Self::from_node(context, None, NodeType::Literal(Value::ScalarF32(value)))
    }

    /// One draw from `U[low, high)` per batch element.
    pub fn random_uniform(context: &Rc<RefCell<GraphContext>>, low: f32, high: f32) -> Self {
        Self::from_node(context, None, NodeType::RandomUniform { low, high })
    }

    /// One boolean draw with `P(true) = prob` per batch element.
    pub fn random_bernoulli(context: &Rc<RefCell<GraphContext>>, prob: f32) -> Self {
        Self::from_node(context, None, NodeType::RandomBernoulli { prob })
    }

    /// Creates an external source node backed by `function`, split into
    /// `num_outputs` tensors.
    pub fn external_source(
        context: &Rc<RefCell<GraphContext>>,
        function: Arc<dyn HostFunction>,
        num_outputs: usize,
    ) -> Vec<Self> {
        let name = context.borrow_mut().register_host_function(function);
        let source = Self::from_node(
            context,
            Some(&name),
            NodeType::ExternalSource { function: name.clone() },
        );
        (0..num_outputs).map(|i| source.tuple_get(i)).collect()
    }

    /// Calls an opaque host function with the given inputs.
    pub fn host_call(
        context: &Rc<RefCell<GraphContext>>,
        function: Arc<dyn HostFunction>,
        inputs: &[&Tensor],
    ) -> Self {
        let name = context.borrow_mut().register_host_function(function);
        Self::from_node(
            context,
            None,
            NodeType::HostFunction {
                function: name,
                inputs: inputs.iter().map(|t| t.node_id).collect(),
            },
        )
    }

    pub fn tuple_get(&self, index: usize) -> Self {
        self.derive(NodeType::TupleGet(self.node_id, index))
    }

    pub fn cast(&self, dtype: DType) -> Self {
        self.derive(NodeType::Cast(self.node_id, dtype))
    }

    pub fn clamp(&self, min_val: f32, max_val: f32) -> Self {
        self.derive(NodeType::Clamp(self.node_id, min_val, max_val))
    }

    /// Applies an image operator; `params` follow the image in input order.
    pub fn image_op(&self, op: ImageOp, params: &[&Tensor]) -> Self {
        let mut inputs = Vec::with_capacity(params.len() + 1);
        inputs.push(self.node_id);
        inputs.extend(params.iter().map(|t| t.node_id));
        self.derive(NodeType::Image { op, inputs })
    }
}

// Operator sugar: `&a + &b` appends a node.

impl Add<&Tensor> for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: &Tensor) -> Self::Output {
        self.derive(NodeType::Add(self.node_id, rhs.node_id))
    }
}

impl Sub<&Tensor> for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Self::Output {
        self.derive(NodeType::Subtract(self.node_id, rhs.node_id))
    }
}

impl Mul<&Tensor> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Self::Output {
        self.derive(NodeType::Multiply(self.node_id, rhs.node_id))
    }
}
