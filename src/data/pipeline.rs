//! Ordered, named set of instantiated transformation nodes.

use crate::error::{PipelineError, PipelineResult};
use crate::transforms::{build_node, NodeSpec, TransformConfig, Transformation};
use std::fmt;

pub struct PipelineNode {
    pub name: String,
    pub spec: NodeSpec,
    pub transform: Box<dyn Transformation>,
}

impl fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineNode")
            .field("name", &self.name)
            .field("type", &self.transform.type_name())
            .finish()
    }
}

/// Nodes are built once; the aggregated capability flags are computed at
/// construction and never change afterwards.
#[derive(Debug)]
pub struct Pipeline {
    nodes: Vec<PipelineNode>,
    graph_compilable: bool,
    uses_opaque_function: bool,
}

impl Pipeline {
    /// Instantiates every entry of `config` through the registry, in order.
    pub fn build(config: &TransformConfig) -> PipelineResult<Self> {
        let mut pipeline = Self::empty();
        pipeline.extend(config)?;
        Ok(pipeline)
    }

    /// Builds and appends every entry of `config`.
    pub fn extend(&mut self, config: &TransformConfig) -> PipelineResult<()> {
        for (name, spec) in config.iter() {
            let transform = build_node(spec)?;
            self.push(name, spec.clone(), transform);
        }
        Ok(())
    }

    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            graph_compilable: true,
            uses_opaque_function: false,
        }
    }

    /// Appends an already built node.
    pub fn push(&mut self, name: &str, spec: NodeSpec, transform: Box<dyn Transformation>) {
        self.graph_compilable &= transform.graph_compilable();
        self.uses_opaque_function |= transform.uses_opaque_function();
        self.nodes.push(PipelineNode {
            name: name.to_string(),
            spec,
            transform,
        });
    }

    pub fn get(&self, name: &str) -> PipelineResult<&dyn Transformation> {
        self.nodes
            .iter()
            .find(|node| node.name == name)
            .map(|node| node.transform.as_ref())
            .ok_or_else(|| PipelineError::MissingTransformation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|node| node.name == name)
    }

    pub fn graph_compilable(&self) -> bool {
        self.graph_compilable
    }

    pub fn uses_opaque_function(&self) -> bool {
        self.uses_opaque_function
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.name.as_str()).collect()
    }

    /// `(name, type)` pairs in order.
    pub fn node_types(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .map(|node| (node.name.clone(), node.transform.type_name().to_string()))
            .collect()
    }

    /// Names of the nodes that prevent graph compilation.
    pub fn non_compilable(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| !node.transform.graph_compilable())
            .map(|node| node.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::TransformParams;

    fn config(entries: &[(&str, &str)]) -> TransformConfig {
        let mut config = TransformConfig::new();
        for (name, transform_type) in entries {
            let params = match *transform_type {
                "Resize" | "ProgressiveResize" => TransformParams::new().with("image_size", 16),
                _ => TransformParams::new(),
            };
            config.set(name, NodeSpec::new(transform_type, params));
        }
        config
    }

    #[test]
    fn test_flags_aggregate_over_nodes() {
        let pipeline = Pipeline::build(&config(&[("decode", "Decode"), ("resize", "Resize")])).unwrap();
        assert!(pipeline.graph_compilable());
        assert!(!pipeline.uses_opaque_function());
        assert_eq!(pipeline.names(), vec!["decode", "resize"]);

        let pipeline = Pipeline::build(&config(&[
            ("decode", "Decode"),
            ("resize", "ProgressiveResize"),
            ("normalize", "Normalize"),
        ]))
        .unwrap();
        assert!(!pipeline.graph_compilable());
        assert_eq!(pipeline.non_compilable(), vec!["resize"]);
    }

    #[test]
    fn test_opaque_function_is_or_aggregated() {
        let mut config = config(&[("decode", "Decode")]);
        config.set(
            "affine",
            NodeSpec::new(
                "AffineTransform",
                TransformParams::new().with("image_size", 16).with("prob", 0.5),
            ),
        );
        let pipeline = Pipeline::build(&config).unwrap();
        assert!(pipeline.graph_compilable());
        assert!(pipeline.uses_opaque_function());
    }

    #[test]
    fn test_missing_node_is_a_contract_error() {
        let pipeline = Pipeline::build(&config(&[("decode", "Decode")])).unwrap();
        assert_eq!(pipeline.get("decode").unwrap().type_name(), "Decode");
        let err = pipeline.get("resize").unwrap_err();
        assert!(matches!(err, PipelineError::MissingTransformation(name) if name == "resize"));
    }

    #[test]
    fn test_unknown_type_fails_the_build() {
        let err = Pipeline::build(&config(&[("x", "Sepia")])).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTransformationType { .. }));
    }
}
