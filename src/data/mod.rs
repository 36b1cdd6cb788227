//! # Data Loading Module
//!
//! Index, configuration and facade of datasets built on the transformation
//! pipeline.
//!
//! ## Example
//!
//! ```no_run
//! use asg_pipeline::data::{DatasetConfig, PairedDataset, PairedTransformKwargs};
//!
//! let kwargs = PairedTransformKwargs {
//!     hflip_prob: Some(0.5),
//!     ..PairedTransformKwargs::new(256)
//! };
//! let config = DatasetConfig {
//!     annotation_meta: Some("pairs.json".to_string()),
//!     mirror: true,
//!     ..DatasetConfig::new("data/facades", kwargs)
//! };
//! let dataset = PairedDataset::from_config(config)?;
//! let sample = dataset.get(0)?;
//! let image_a = sample["image_A"].as_tensor();
//! # Ok::<(), asg_pipeline::error::PipelineError>(())
//! ```
//!
//! ## Available Components
//!
//! - [`ItemIndex`]: item list loaded from an annotation file or a listing
//! - [`MirrorMapping`]: virtual index -> `(base index, do_mirror)`
//! - [`Pipeline`]: named nodes plus aggregated capability flags
//! - [`PairedTransformKwargs`]: keyword configuration of the paired pipeline
//! - [`PairedDataset`]: eager access and graph definition over image pairs

pub mod config;
pub mod dataset;
pub mod item_index;
pub mod paired_config;
pub mod paired_dataset;
pub mod pipeline;

pub use config::{DatasetConfig, ExecutionMode};
pub use dataset::{Dataset, DatasetInfo, RawStore, Sample};
pub use item_index::{num_samples, parse_annotation, IndexSource, Item, ItemIndex, MirrorMapping};
pub use paired_config::{PairedTransformKwargs, PairedTransformSettings, ResolvedPairedConfig};
pub use paired_dataset::{PairedDataset, PairedSource, RawPair, OUTPUT_KEYS, RAW_OUTPUT_NAMES};
pub use pipeline::{Pipeline, PipelineNode};
