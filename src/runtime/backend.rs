//! Interfaces between the pipeline and graph execution runtimes.
//!
//! The pipeline only emits a [`GraphDefinition`]; executing it is the job
//! of a [`GraphBackend`]. Whether such a backend exists is an explicit fact
//! supplied at startup through a [`BackendProvider`], never discovered lazily.

use crate::asg::{AsgId, NodeId, Value};
use crate::error::{PipelineError, PipelineResult};
use crate::tensor::GraphDefinition;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Cache of evaluated nodes: one value per batch element.
pub type Memo<T> = HashMap<(AsgId, NodeId), Vec<T>>;

/// Arguments of one host function invocation (one batch element).
pub struct HostCall<'a> {
    /// Position of the element inside the batch.
    pub batch_index: usize,
    /// Sample identifier the runtime is pulling for this element.
    pub sample_id: usize,
    /// Evaluated inputs of the calling node.
    pub inputs: &'a [Value],
    pub rng: &'a mut dyn RngCore,
}

/// Host-side callable that a graph runtime can only invoke as an opaque,
/// non-inlined step.
pub trait HostFunction: Send + Sync + fmt::Debug {
    /// Unique name under which the graph references the function.
    fn name(&self) -> &str;

    fn invoke(&self, call: HostCall<'_>) -> PipelineResult<Value>;
}

/// One batch worth of data for a graph run.
#[derive(Debug, Clone, Default)]
pub struct BatchFeed {
    /// Sample identifiers handed to external sources, one per element.
    pub sample_ids: Vec<usize>,
    /// Values for named `Input` nodes, one per element.
    pub inputs: HashMap<String, Vec<Value>>,
}

impl BatchFeed {
    pub fn from_samples(sample_ids: impl IntoIterator<Item = usize>) -> Self {
        Self {
            sample_ids: sample_ids.into_iter().collect(),
            inputs: HashMap::new(),
        }
    }

    pub fn with_input(mut self, name: &str, values: Vec<Value>) -> Self {
        self.inputs.insert(name.to_string(), values);
        self
    }

    pub fn batch_size(&self) -> usize {
        if !self.sample_ids.is_empty() {
            return self.sample_ids.len();
        }
        self.inputs.values().map(Vec::len).max().unwrap_or(0)
    }
}

/// A batched graph execution runtime.
pub trait GraphBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Executes the graph over one batch.
    ///
    /// Returns one vector per graph output, each holding one value per batch
    /// element, in the order of `graph.output_names`.
    fn run(
        &self,
        graph: &GraphDefinition,
        feed: &BatchFeed,
        rng: &mut dyn RngCore,
    ) -> PipelineResult<Vec<Vec<Value>>>;
}

/// Injectable answer to "is a graph backend available here?".
#[derive(Debug, Clone, Default)]
pub struct BackendProvider {
    backend: Option<Arc<dyn GraphBackend>>,
}

impl BackendProvider {
    /// No graph backend: graph mode requests fail with a capability error.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: impl GraphBackend + 'static) -> Self {
        Self {
            backend: Some(Arc::new(backend)),
        }
    }

    /// The in-crate reference executor.
    pub fn cpu() -> Self {
        Self::with_backend(super::cpu_backend::CpuBackend::new())
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> PipelineResult<&Arc<dyn GraphBackend>> {
        self.backend.as_ref().ok_or_else(|| PipelineError::BackendUnavailable {
            requested: "graph".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_unavailable_provider_is_a_capability_error() {
        let provider = BackendProvider::unavailable();
        assert!(!provider.is_available());
        let err = provider.backend().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
    }

    #[test]
    fn test_cpu_provider() {
        let provider = BackendProvider::cpu();
        assert!(provider.is_available());
        assert_eq!(provider.backend().unwrap().name(), "cpu");
    }

    #[test]
    fn test_batch_size_prefers_sample_ids() {
        let feed = BatchFeed::from_samples([4, 5, 6]);
        assert_eq!(feed.batch_size(), 3);
        let feed = BatchFeed::default().with_input("x", vec![Value::ScalarF32(1.0); 2]);
        assert_eq!(feed.batch_size(), 2);
    }
}
