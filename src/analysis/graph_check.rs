//! Static checks on an emitted graph definition.
//!
//! Before a graph is handed to a runtime we make sure it is complete:
//! every referenced node exists, there are no cycles, every host function
//! is registered, and image operators receive the number of inputs they
//! consume. The traversal order produced here is also the evaluation order
//! used by the reference CPU backend.

use crate::asg::{Asg, AsgError, NodeId, NodeType};
use crate::tensor::GraphDefinition;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphCheckError {
    #[error("Graph error: {0}")]
    AsgError(#[from] AsgError),

    #[error("Image operator at node {node_id} expects {expected} inputs, got {actual}")]
    OperatorArity {
        node_id: NodeId,
        expected: usize,
        actual: usize,
    },

    #[error("Graph declares {outputs} outputs but {names} output names")]
    OutputNames { outputs: usize, names: usize },
}

type Result<T> = std::result::Result<T, GraphCheckError>;

/// Graph validation passes.
pub struct GraphCheck;

impl GraphCheck {
    /// Validates a full definition: structure, host functions and output naming.
    pub fn run(definition: &GraphDefinition) -> Result<Vec<NodeId>> {
        let asg = &definition.asg;
        if asg.outputs.is_empty() {
            return Err(AsgError::NoOutputs.into());
        }
        if asg.outputs.len() != definition.output_names.len() {
            return Err(GraphCheckError::OutputNames {
                outputs: asg.outputs.len(),
                names: definition.output_names.len(),
            });
        }
        for name in asg.host_functions() {
            if !definition.host_functions.contains_key(&name) {
                return Err(AsgError::UnknownHostFunction(name).into());
            }
        }
        let order = Self::topological_sort(asg)?;
        for node_id in &order {
            let node = asg.get_node(*node_id)?;
            if let NodeType::Image { op, inputs } = &node.node_type {
                if inputs.len() != op.arity() {
                    return Err(GraphCheckError::OperatorArity {
                        node_id: *node_id,
                        expected: op.arity(),
                        actual: inputs.len(),
                    });
                }
            }
        }
        Ok(order)
    }

    /// Orders the nodes reachable from the outputs so that every node comes
    /// after its dependencies.
    pub fn topological_sort(asg: &Asg) -> Result<Vec<NodeId>> {
        let mut sorted = Vec::new();
        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();
        // all outputs, not just the first one
        for output_id in &asg.outputs {
            Self::visit(*output_id, asg, &mut visited, &mut in_progress, &mut sorted)?;
        }
        Ok(sorted)
    }

    fn visit(
        node_id: NodeId,
        asg: &Asg,
        visited: &mut HashSet<NodeId>,
        in_progress: &mut HashSet<NodeId>,
        sorted: &mut Vec<NodeId>,
    ) -> Result<()> {
        if visited.contains(&node_id) {
            return Ok(());
        }
        if !in_progress.insert(node_id) {
            return Err(AsgError::Cycle(node_id).into());
        }

        let node = asg.get_node(node_id)?;
        for input_id in node.node_type.dependencies() {
            if !asg.nodes.contains_key(&input_id) {
                return Err(AsgError::DanglingReference {
                    node: node_id,
                    missing: input_id,
                }
                .into());
            }
            Self::visit(input_id, asg, visited, in_progress, sorted)?;
        }

        in_progress.remove(&node_id);
        visited.insert(node_id);
        sorted.push(node_id);
        Ok(())
    }
}
