//! ASG: the abstract semantic graph that describes a preprocessing pipeline.
//!
//! A graph is a flat table of nodes keyed by [`NodeId`]. Every node produces
//! exactly one [`Value`] per batch element; nodes with several logical
//! outputs produce a [`Value::Tuple`] that is split with [`NodeType::TupleGet`].

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Node identifier.
pub type NodeId = usize;
/// Graph identifier.
pub type AsgId = usize;
/// Tensor shape.
pub type Shape = Vec<usize>;

pub type AsgResult<T> = std::result::Result<T, AsgError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsgError {
    #[error("Node with ID {0} not found")]
    NodeNotFound(NodeId),
    #[error("Node {node} references missing node {missing}")]
    DanglingReference { node: NodeId, missing: NodeId },
    #[error("Host function `{0}` is referenced by the graph but was never registered")]
    UnknownHostFunction(String),
    #[error("Graph contains a cycle through node {0}")]
    Cycle(NodeId),
    #[error("Graph has no outputs")]
    NoOutputs,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
    I64,
    Bool,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::I64 => write!(f, "i64"),
            DType::Bool => write!(f, "bool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node ID (duplicates the HashMap key for convenience)
    pub id: NodeId,
    pub name: Option<String>,
    pub node_type: NodeType,
    pub dtype: Option<DType>,
}

/// Image operators. Every variant is an opaque kernel from [`crate::ops`];
/// the first input is always the HWC image, the remaining inputs are
/// per-element scalar (or matrix) parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageOp {
    /// bytes -> image
    Decode { channels: usize, return_square: bool, center_crop: bool },
    CenterCrop { height: usize, width: usize },
    /// inputs: image, fx, fy (offset fractions in [0, 1])
    Crop { height: usize, width: usize },
    LongSideCrop,
    Resize { height: usize, width: usize },
    FlipHorizontal,
    FlipVertical,
    /// inputs: image, 2x3 matrix
    Warp { height: usize, width: usize },
    /// inputs: image, hue shift, saturation scale, value scale
    HsvShift,
    /// inputs: image, kernel size (sigma follows from the size)
    Blur,
    /// inputs: image, amount
    Sharpen,
    /// inputs: image, quality
    JpegQuality,
    /// inputs: image, factor
    Downsample,
    Normalize { min_val: f32, max_val: f32 },
}

impl ImageOp {
    /// Number of inputs the operator consumes, image included.
    pub fn arity(&self) -> usize {
        match self {
            ImageOp::HsvShift => 4,
            ImageOp::Crop { .. } => 3,
            ImageOp::Warp { .. }
            | ImageOp::Blur
            | ImageOp::Sharpen
            | ImageOp::JpegQuality
            | ImageOp::Downsample => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeType {
    // Data
    Input { name: String },
    Literal(Value),
    /// Per-element source driven by a registered host function.
    ExternalSource { function: String },
    /// Opaque host-side call; the runtime invokes it once per element.
    HostFunction { function: String, inputs: Vec<NodeId> },
    TupleGet(NodeId, usize),

    // Arithmetic (scalar operands broadcast, tensors must agree in shape)
    Add(NodeId, NodeId),
    Subtract(NodeId, NodeId),
    Multiply(NodeId, NodeId),
    Cast(NodeId, DType),
    Clamp(NodeId, f32, f32),

    // Random draws, one per batch element
    RandomUniform { low: f32, high: f32 },
    RandomBernoulli { prob: f32 },

    Image { op: ImageOp, inputs: Vec<NodeId> },
}

impl NodeType {
    /// IDs of the nodes this node reads from.
    pub fn dependencies(&self) -> Vec<NodeId> {
        match self {
            NodeType::Add(a, b) | NodeType::Subtract(a, b) | NodeType::Multiply(a, b) => {
                vec![*a, *b]
            }
            NodeType::Cast(a, _) | NodeType::Clamp(a, _, _) | NodeType::TupleGet(a, _) => vec![*a],
            NodeType::HostFunction { inputs, .. } | NodeType::Image { inputs, .. } => inputs.clone(),
            NodeType::Input { .. }
            | NodeType::Literal(_)
            | NodeType::ExternalSource { .. }
            | NodeType::RandomUniform { .. }
            | NodeType::RandomBernoulli { .. } => vec![],
        }
    }

    /// Name of the host function the node calls, if any.
    pub fn host_function(&self) -> Option<&str> {
        match self {
            NodeType::ExternalSource { function } | NodeType::HostFunction { function, .. } => {
                Some(function)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Tensor(ArrayD<f32>),
    Bytes(Vec<u8>),
    ScalarF32(f32),
    ScalarI64(i64),
    ScalarBool(bool),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Tensor(_) => "tensor",
            Value::Bytes(_) => "bytes",
            Value::ScalarF32(_) => "f32",
            Value::ScalarI64(_) => "i64",
            Value::ScalarBool(_) => "bool",
            Value::Tuple(_) => "tuple",
        }
    }

    pub fn as_tensor(&self) -> Option<&ArrayD<f32>> {
        match self {
            Value::Tensor(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn into_tensor(self) -> Option<ArrayD<f32>> {
        match self {
            Value::Tensor(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Numeric view of a scalar value. Booleans map to 0/1.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::ScalarF32(v) => Some(*v),
            Value::ScalarI64(v) => Some(*v as f32),
            Value::ScalarBool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Tensor(arr) if arr.len() == 1 => arr.iter().next().copied(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::ScalarBool(v) => Some(*v),
            Value::ScalarI64(v) => Some(*v != 0),
            Value::ScalarF32(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::ScalarI64(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asg {
    pub id: AsgId,
    pub name: Option<String>,
    pub nodes: HashMap<NodeId, Node>,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
}

impl Asg {
    pub fn new(id: AsgId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            nodes: HashMap::new(),
            inputs: vec![],
            outputs: vec![],
        }
    }

    pub fn add_node(&mut self, name: Option<String>, node_type: NodeType) -> NodeId {
        let new_id = self.nodes.len();
        let dtype = match &node_type {
            NodeType::Literal(Value::Tensor(_))
            | NodeType::Literal(Value::ScalarF32(_))
            | NodeType::RandomUniform { .. }
            | NodeType::Image { .. }
            | NodeType::Clamp(..) => Some(DType::F32),
            NodeType::Literal(Value::ScalarI64(_)) => Some(DType::I64),
            NodeType::Literal(Value::ScalarBool(_)) | NodeType::RandomBernoulli { .. } => {
                Some(DType::Bool)
            }
            NodeType::Cast(_, dtype) => Some(*dtype),
            _ => None,
        };
        let node = Node {
            id: new_id,
            name,
            node_type,
            dtype,
        };
        self.nodes.insert(new_id, node);
        new_id
    }

    pub fn set_output(&mut self, node_id: NodeId) {
        self.outputs = vec![node_id];
    }

    pub fn set_outputs(&mut self, node_ids: Vec<NodeId>) {
        self.outputs = node_ids;
    }

    pub fn get_node(&self, id: NodeId) -> AsgResult<&Node> {
        self.nodes.get(&id).ok_or(AsgError::NodeNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of every host function referenced by the graph, sorted.
    pub fn host_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .values()
            .filter_map(|node| node.node_type.host_function().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_assigns_sequential_ids() {
        let mut asg = Asg::new(0, Some("main".into()));
        let a = asg.add_node(None, NodeType::Literal(Value::ScalarF32(1.0)));
        let b = asg.add_node(None, NodeType::RandomBernoulli { prob: 0.5 });
        let c = asg.add_node(Some("sum".into()), NodeType::Add(a, b));
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(asg.get_node(a).unwrap().dtype, Some(DType::F32));
        assert_eq!(asg.get_node(b).unwrap().dtype, Some(DType::Bool));
        assert_eq!(asg.get_node(c).unwrap().node_type.dependencies(), vec![0, 1]);
        assert_eq!(asg.get_node(7), Err(AsgError::NodeNotFound(7)));
    }

    #[test]
    fn test_host_functions_are_collected_once() {
        let mut asg = Asg::new(0, None);
        let src = asg.add_node(None, NodeType::ExternalSource { function: "raw".into() });
        asg.add_node(None, NodeType::HostFunction { function: "mask".into(), inputs: vec![src] });
        asg.add_node(None, NodeType::HostFunction { function: "mask".into(), inputs: vec![src] });
        assert_eq!(asg.host_functions(), vec!["mask".to_string(), "raw".to_string()]);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::ScalarBool(true).as_f32(), Some(1.0));
        assert_eq!(Value::ScalarF32(0.0).as_bool(), Some(false));
        assert_eq!(Value::Bytes(vec![1]).as_f32(), None);
        assert_eq!(ImageOp::HsvShift.arity(), 4);
        assert_eq!(ImageOp::Blur.arity(), 2);
        assert_eq!(ImageOp::Sharpen.arity(), 2);
        assert_eq!(ImageOp::FlipVertical.arity(), 1);
    }
}
