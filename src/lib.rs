//! # asg-pipeline: paired-image preprocessing with eager and graph execution
//!
//! A dataset is described once, as a chain of named transformation nodes
//! resolved from keyword configuration. The same chain then runs in two
//! ways:
//!
//! - **eager**: `PairedDataset::get(idx)` fetches, decodes and augments one
//!   item on the calling thread;
//! - **graph**: `PairedDataset::define_graph` emits the chain as an
//!   **Abstract Semantic Graph (ASG)** rooted at an external source node,
//!   for a batched runtime implementing [`runtime::backend::GraphBackend`].
//!
//! ## Usage Example
//!
//! ```no_run
//! use asg_pipeline::data::{DatasetConfig, ExecutionMode, PairedDataset, PairedTransformKwargs};
//! use asg_pipeline::runtime::backend::BackendProvider;
//! use rand::SeedableRng;
//!
//! let config = DatasetConfig {
//!     annotation_meta: Some("pairs.txt".to_string()),
//!     execution_mode: ExecutionMode::Graph,
//!     ..DatasetConfig::new("data/edges2shoes.zip", PairedTransformKwargs::new(128))
//! };
//! let dataset = PairedDataset::new(config, None, BackendProvider::cpu())?;
//!
//! // 1. One item, eagerly
//! let sample = dataset.get(0)?;
//!
//! // 2. A batch through the graph
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let batch = dataset.run_graph(&[0, 1, 2, 3], &mut rng)?;
//! # Ok::<(), asg_pipeline::error::PipelineError>(())
//! ```

// Declare public modules that constitute the core library API.
pub mod analysis;
pub mod asg;
pub mod data;
pub mod error;
pub mod ops;
pub mod reader;
pub mod runtime;
pub mod tensor;
pub mod transforms;
