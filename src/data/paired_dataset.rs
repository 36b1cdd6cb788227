//! Dataset of paired images, e.g. for image-to-image translation.
//!
//! Every item of the index names two images, A and B. Both go through the
//! same geometry (one random draw per node for the pair) so they stay
//! aligned; color and degradation augmentations are applied to A only.
//!
//! The fixed node order is written once in [`PairedDataset`]'s `transform`
//! and executed through either an eager or a compiled flow, so `get` and
//! `define_graph` cannot drift apart.

use super::config::{DatasetConfig, ExecutionMode};
use super::dataset::{Dataset, DatasetInfo, RawStore, Sample};
use super::item_index::{ItemIndex, MirrorMapping};
use super::paired_config::PairedTransformSettings;
use super::pipeline::Pipeline;
use crate::analysis::graph_check::GraphCheck;
use crate::asg::Value;
use crate::error::{DataWarning, PipelineError, PipelineResult};
use crate::reader::FileReader;
use crate::runtime::backend::{BackendProvider, BatchFeed, HostCall};
use crate::tensor::{GraphContext, GraphDefinition, Tensor};
use crate::transforms::{
    switch_between, switch_between_compiled, Flip, FunctionOp, NodeSpec, Operand, TransformConfig, TransformParams,
    Transformation,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info};

pub const OUTPUT_KEYS: &[&str] = &["index", "raw_image_A", "raw_image_B", "image_A", "image_B"];

/// Elements of [`RawPair::into_values`], in order.
pub const RAW_OUTPUT_NAMES: &[&str] = &["index", "do_mirror", "buffer_A", "buffer_B"];

/// Name of the unconditional horizontal flip behind mirror doubling.
pub const MIRROR_NODE: &str = "_mirror";

/// Undecoded data of one item.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPair {
    /// Base index into the item list (mirroring already resolved).
    pub index: usize,
    pub do_mirror: bool,
    pub buffer_a: Vec<u8>,
    pub buffer_b: Vec<u8>,
}

impl RawPair {
    pub fn into_values(self) -> Vec<Value> {
        vec![
            Value::ScalarI64(self.index as i64),
            Value::ScalarBool(self.do_mirror),
            Value::Bytes(self.buffer_a),
            Value::Bytes(self.buffer_b),
        ]
    }
}

/// Store, index and mirror mapping: everything needed to fetch raw pairs.
///
/// Shared behind an `Arc` with every graph that pulls from it; the store is
/// closed when the last holder goes away.
#[derive(Debug)]
pub struct PairedSource {
    store: RawStore,
    index: ItemIndex,
    mapping: MirrorMapping,
}

impl PairedSource {
    pub fn new(store: RawStore, index: ItemIndex, max_samples: i64, mirror: bool) -> PipelineResult<Self> {
        if let Some(pos) = index.items().iter().position(|item| item.num_fields() < 2) {
            return Err(PipelineError::Configuration(format!(
                "item {pos} of a paired dataset must name two images, got {:?}",
                index.items()[pos].fields()
            )));
        }
        let mapping = MirrorMapping::new(index.len(), max_samples, mirror);
        Ok(Self { store, index, mapping })
    }

    pub fn len(&self) -> usize {
        self.mapping.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self) -> &ItemIndex {
        &self.index
    }

    pub fn store(&self) -> &RawStore {
        &self.store
    }

    pub fn raw_data(&self, idx: usize) -> PipelineResult<RawPair> {
        let (base, do_mirror) = self.mapping.resolve(idx)?;
        let item = self.index.get(base).ok_or(PipelineError::IndexOutOfRange {
            index: base,
            len: self.index.len(),
        })?;
        let (Some(path_a), Some(path_b)) = (item.field(0), item.field(1)) else {
            return Err(PipelineError::Configuration(format!("item {base} must name two images")));
        };
        Ok(RawPair {
            index: base,
            do_mirror,
            buffer_a: self.store.fetch_file(path_a)?,
            buffer_b: self.store.fetch_file(path_b)?,
        })
    }
}

/// One execution mode of the node chain.
trait Flow {
    type Item: Clone;

    fn apply(&mut self, node: &dyn Transformation, data: Vec<Self::Item>) -> PipelineResult<Vec<Self::Item>>;

    fn switch(
        &mut self,
        cond: &Self::Item,
        cond_true: Vec<Self::Item>,
        cond_false: Vec<Self::Item>,
    ) -> PipelineResult<Vec<Self::Item>>;

    fn apply_one(&mut self, node: &dyn Transformation, item: Self::Item) -> PipelineResult<Self::Item> {
        let [item] = take::<_, 1>(self.apply(node, vec![item])?)?;
        Ok(item)
    }
}

struct EagerFlow<'a> {
    rng: &'a mut dyn RngCore,
}

impl Flow for EagerFlow<'_> {
    type Item = Value;

    fn apply(&mut self, node: &dyn Transformation, data: Vec<Value>) -> PipelineResult<Vec<Value>> {
        node.apply_eager(data, &mut *self.rng)
    }

    fn switch(&mut self, cond: &Value, cond_true: Vec<Value>, cond_false: Vec<Value>) -> PipelineResult<Vec<Value>> {
        let cond = cond
            .as_bool()
            .ok_or_else(|| PipelineError::type_mismatch("switch", "bool", cond.type_name()))?;
        Ok(switch_between(cond, cond_true, cond_false))
    }
}

struct CompiledFlow;

impl Flow for CompiledFlow {
    type Item = Tensor;

    fn apply(&mut self, node: &dyn Transformation, data: Vec<Tensor>) -> PipelineResult<Vec<Tensor>> {
        node.apply_compiled(&data)
    }

    fn switch(&mut self, cond: &Tensor, cond_true: Vec<Tensor>, cond_false: Vec<Tensor>) -> PipelineResult<Vec<Tensor>> {
        Ok(switch_between_compiled(cond, Operand::List(cond_true), Operand::List(cond_false))?.into_vec())
    }
}

fn take<T, const N: usize>(data: Vec<T>) -> PipelineResult<[T; N]> {
    <[T; N]>::try_from(data).map_err(|data| PipelineError::ArityMismatch {
        expected: N,
        got: data.len(),
    })
}

#[derive(Debug)]
pub struct PairedDataset {
    source: Arc<PairedSource>,
    config: DatasetConfig,
    settings: PairedTransformSettings,
    transform_config: TransformConfig,
    pipeline: Pipeline,
    warnings: Vec<DataWarning>,
    provider: BackendProvider,
}

impl PairedDataset {
    /// Opens the store, loads the index and builds every node.
    ///
    /// `reader` replaces the reader normally picked from `file_format`. In
    /// [`ExecutionMode::Graph`] construction fails unless the whole pipeline
    /// is graph-compilable and `provider` has a backend.
    pub fn new(
        config: DatasetConfig,
        reader: Option<Box<dyn FileReader>>,
        provider: BackendProvider,
    ) -> PipelineResult<Self> {
        let store = match reader {
            Some(reader) => RawStore::with_reader(&config.root_dir, reader),
            None => RawStore::open(&config.root_dir, config.file_format.as_deref())?,
        };
        // From here on an early return drops `store`, which closes it.
        let index = ItemIndex::load(
            store.reader(),
            store.root(),
            config.annotation_path.as_deref(),
            config.annotation_meta.as_deref(),
            config.annotation_format.as_deref(),
        )?;
        let source = PairedSource::new(store, index, config.max_samples, config.mirror)?;

        let resolved = config.transform_kwargs.resolve()?;
        let mut pipeline = Pipeline::empty();
        pipeline.push(
            MIRROR_NODE,
            NodeSpec::new(
                "Flip",
                TransformParams::new()
                    .with("horizontal_prob", 1.0)
                    .with("vertical_prob", 0.0),
            ),
            Box::new(Flip::mirror()),
        );
        pipeline.extend(&resolved.transform_config)?;

        if config.execution_mode == ExecutionMode::Graph {
            if !pipeline.graph_compilable() {
                return Err(PipelineError::Capability(format!(
                    "graph mode requested but nodes {:?} cannot be compiled",
                    pipeline.non_compilable()
                )));
            }
            provider.backend()?;
        }

        info!(
            root = %config.root_dir.display(),
            format = source.store().format(),
            items = source.index().len(),
            samples = source.len(),
            graph_compilable = pipeline.graph_compilable(),
            uses_opaque_function = pipeline.uses_opaque_function(),
            "paired dataset ready"
        );
        Ok(Self {
            source: Arc::new(source),
            config,
            settings: resolved.settings,
            transform_config: resolved.transform_config,
            pipeline,
            warnings: resolved.warnings,
            provider,
        })
    }

    /// Default reader for the configured format and no graph backend.
    pub fn from_config(config: DatasetConfig) -> PipelineResult<Self> {
        Self::new(config, None, BackendProvider::unavailable())
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn output_keys(&self) -> &'static [&'static str] {
        OUTPUT_KEYS
    }

    pub fn num_raw_outputs(&self) -> usize {
        RAW_OUTPUT_NAMES.len()
    }

    pub fn raw_output_names(&self) -> &'static [&'static str] {
        RAW_OUTPUT_NAMES
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Keyword values actually in effect, defaults included.
    pub fn settings(&self) -> &PairedTransformSettings {
        &self.settings
    }

    pub fn transform_config(&self) -> &TransformConfig {
        &self.transform_config
    }

    pub fn warnings(&self) -> &[DataWarning] {
        &self.warnings
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn graph_compilable(&self) -> bool {
        self.pipeline.graph_compilable()
    }

    pub fn uses_opaque_function(&self) -> bool {
        self.pipeline.uses_opaque_function()
    }

    pub fn get_raw_data(&self, idx: usize) -> PipelineResult<RawPair> {
        self.source.raw_data(idx)
    }

    /// Sample `idx` with fresh thread-local randomness.
    pub fn get(&self, idx: usize) -> PipelineResult<Sample> {
        self.get_with_rng(idx, &mut rand::rng())
    }

    pub fn get_seeded(&self, idx: usize, seed: u64) -> PipelineResult<Sample> {
        self.get_with_rng(idx, &mut StdRng::seed_from_u64(seed))
    }

    pub fn get_with_rng(&self, idx: usize, rng: &mut dyn RngCore) -> PipelineResult<Sample> {
        let raw = self.get_raw_data(idx)?;
        let outputs = self.transform_eager(raw, rng)?;
        if outputs.len() != OUTPUT_KEYS.len() {
            return Err(PipelineError::ArityMismatch {
                expected: OUTPUT_KEYS.len(),
                got: outputs.len(),
            });
        }
        Ok(OUTPUT_KEYS.iter().map(|key| key.to_string()).zip(outputs).collect())
    }

    /// Runs the node chain on one raw pair, outputs in [`OUTPUT_KEYS`] order.
    pub fn transform_eager(&self, raw: RawPair, rng: &mut dyn RngCore) -> PipelineResult<Vec<Value>> {
        let raw = take::<_, 4>(raw.into_values())?;
        self.transform(&mut EagerFlow { rng }, raw)
    }

    /// Threads graph nodes for the raw outputs (see [`RAW_OUTPUT_NAMES`])
    /// through the node chain and returns one node per output key.
    pub fn define_graph(&self, raw_data: &[Tensor]) -> PipelineResult<Vec<Tensor>> {
        if !self.pipeline.graph_compilable() {
            return Err(PipelineError::Capability(format!(
                "nodes {:?} cannot be compiled into a graph",
                self.pipeline.non_compilable()
            )));
        }
        let raw = take::<_, 4>(raw_data.to_vec())?;
        let outputs = self.transform(&mut CompiledFlow, raw)?;
        if outputs.len() != OUTPUT_KEYS.len() {
            return Err(PipelineError::ArityMismatch {
                expected: OUTPUT_KEYS.len(),
                got: outputs.len(),
            });
        }
        Ok(outputs)
    }

    /// Host function producing the raw outputs of the sample a runtime asks
    /// for. Fails when `provider` has no backend to call it.
    pub fn external_source(&self, provider: &BackendProvider) -> PipelineResult<FunctionOp<Arc<PairedSource>>> {
        provider.backend()?;
        Ok(FunctionOp::new(
            "PairedDataset.get_raw_data",
            Arc::clone(&self.source),
            |source: &Arc<PairedSource>, call: HostCall<'_>| Ok(Value::Tuple(source.raw_data(call.sample_id)?.into_values())),
        ))
    }

    /// Complete graph from the external source to the named outputs.
    pub fn build_graph(&self) -> PipelineResult<GraphDefinition> {
        let context = Rc::new(RefCell::new(GraphContext::new()));
        let raw = self
            .external_source(&self.provider)?
            .graph_source(&context, &self.provider, RAW_OUTPUT_NAMES.len())?;
        let outputs = self.define_graph(&raw)?;
        let named: Vec<(String, Tensor)> = OUTPUT_KEYS.iter().map(|key| key.to_string()).zip(outputs).collect();
        let graph = context.borrow().finish(&named);
        let order = GraphCheck::run(&graph)?;
        debug!(nodes = order.len(), outputs = named.len(), "paired dataset graph defined");
        Ok(graph)
    }

    /// Builds the graph and runs it for `indices` on the provider's backend.
    pub fn run_graph(&self, indices: &[usize], rng: &mut dyn RngCore) -> PipelineResult<Vec<Sample>> {
        let graph = self.build_graph()?;
        let backend = self.provider.backend()?;
        let columns = backend.run(&graph, &BatchFeed::from_samples(indices.iter().copied()), rng)?;
        if columns.len() != graph.output_names.len() {
            return Err(PipelineError::ArityMismatch {
                expected: graph.output_names.len(),
                got: columns.len(),
            });
        }
        (0..indices.len())
            .map(|b| -> PipelineResult<Sample> {
                graph
                    .output_names
                    .iter()
                    .zip(&columns)
                    .map(|(name, column)| -> PipelineResult<(String, Value)> {
                        let value = column.get(b).cloned().ok_or(PipelineError::ArityMismatch {
                            expected: indices.len(),
                            got: column.len(),
                        })?;
                        Ok((name.clone(), value))
                    })
                    .collect()
            })
            .collect()
    }

    pub fn describe(&self) -> DatasetInfo {
        DatasetInfo {
            dataset_type: "PairedDataset".to_string(),
            root_dir: self.config.root_dir.clone(),
            file_format: self.source.store().format().to_string(),
            annotation_path: self.config.annotation_path.clone(),
            annotation_meta: self.config.annotation_meta.clone(),
            annotation_format: self.source.index().annotation_format().map(str::to_string),
            dataset_samples: self.source.index().len(),
            max_samples: self.config.max_samples,
            mirror: self.config.mirror,
            num_samples: self.len(),
            graph_compilable: self.graph_compilable(),
            uses_opaque_function: self.uses_opaque_function(),
            transform_kwargs: self.settings.clone(),
            transform_config: self.transform_config.clone(),
            nodes: self.pipeline.node_types(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }

    /// The fixed node order, shared by both execution modes.
    fn transform<F: Flow>(&self, flow: &mut F, raw: [F::Item; 4]) -> PipelineResult<Vec<F::Item>> {
        let pipeline = &self.pipeline;
        let [index, do_mirror, buffer_a, buffer_b] = raw;

        let raw_a = flow.apply_one(pipeline.get("decode_A")?, buffer_a)?;
        let raw_b = flow.apply_one(pipeline.get("decode_B")?, buffer_b)?;
        let mut raw_data = vec![raw_a, raw_b];
        for name in ["center_crop", "resize"] {
            raw_data = flow.apply(pipeline.get(name)?, raw_data)?;
        }
        let mirrored = flow.apply(pipeline.get(MIRROR_NODE)?, raw_data.clone())?;
        let raw_data = flow.switch(&do_mirror, mirrored, raw_data)?;

        let mut data = raw_data.clone();
        for name in ["random_region_brightness", "random_affine", "random_crop", "random_flip"] {
            data = flow.apply(pipeline.get(name)?, data)?;
        }
        let [image_a, image_b] = if pipeline.contains("random_hsv_B") {
            let [image_a, image_b] = take(data)?;
            [
                flow.apply_one(pipeline.get("random_hsv")?, image_a)?,
                flow.apply_one(pipeline.get("random_hsv_B")?, image_b)?,
            ]
        } else {
            take(flow.apply(pipeline.get("random_hsv")?, data)?)?
        };
        let mut image_a = image_a;
        for name in ["random_blur_sharpen", "random_compress", "random_downsample"] {
            image_a = flow.apply_one(pipeline.get(name)?, image_a)?;
        }
        let [image_a, image_b] = take(flow.apply(pipeline.get("normalize")?, vec![image_a, image_b])?)?;

        let [raw_a, raw_b] = take(raw_data)?;
        Ok(vec![index, raw_a, raw_b, image_a, image_b])
    }
}

impl Dataset for PairedDataset {
    fn name(&self) -> &str {
        "PairedDataset"
    }

    fn len(&self) -> usize {
        PairedDataset::len(self)
    }

    fn output_keys(&self) -> &[&'static str] {
        OUTPUT_KEYS
    }

    fn get(&self, index: usize) -> PipelineResult<Sample> {
        PairedDataset::get(self, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::paired_config::PairedTransformKwargs;
    use crate::reader::DirectoryReader;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_pair(root: &Path, name: &str, w: u32, h: u32) {
        let a = RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
        let b = RgbImage::from_fn(w, h, |x, _| Rgb([if x < w / 2 { 0 } else { 255 }, 30, 60]));
        a.save(root.join(format!("{name}_A.png"))).unwrap();
        b.save(root.join(format!("{name}_B.png"))).unwrap();
    }

    fn setup(n: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut items = Vec::new();
        for i in 0..n {
            write_pair(dir.path(), &format!("{i}"), 24, 20);
            items.push(vec![format!("{i}_A.png"), format!("{i}_B.png")]);
        }
        std::fs::write(dir.path().join("pairs.json"), serde_json::to_string(&items).unwrap()).unwrap();
        dir
    }

    fn config(root: &Path, kwargs: PairedTransformKwargs) -> DatasetConfig {
        DatasetConfig {
            annotation_meta: Some("pairs.json".to_string()),
            ..DatasetConfig::new(root, kwargs)
        }
    }

    #[test]
    fn test_get_zips_output_keys() {
        let dir = setup(2);
        let dataset = PairedDataset::from_config(config(dir.path(), PairedTransformKwargs::new(16))).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.num_raw_outputs(), 4);

        let sample = dataset.get(1).unwrap();
        assert_eq!(sample.len(), OUTPUT_KEYS.len());
        assert_eq!(sample["index"], Value::ScalarI64(1));
        for key in ["raw_image_A", "raw_image_B", "image_A", "image_B"] {
            assert_eq!(sample[key].as_tensor().unwrap().shape(), &[16, 16, 3], "{key}");
        }
    }

    #[test]
    fn test_mirror_flips_second_half() {
        let dir = setup(2);
        let cfg = DatasetConfig {
            mirror: true,
            ..config(dir.path(), PairedTransformKwargs::new(16))
        };
        let dataset = PairedDataset::from_config(cfg).unwrap();
        assert_eq!(dataset.len(), 4);

        let raw = dataset.get_raw_data(3).unwrap();
        assert_eq!(raw.index, 1);
        assert!(raw.do_mirror);

        let plain = dataset.get_seeded(1, 0).unwrap();
        let mirrored = dataset.get_seeded(3, 0).unwrap();
        assert_eq!(mirrored["index"], Value::ScalarI64(1));
        let plain_a = plain["raw_image_A"].as_tensor().unwrap();
        let mirrored_a = mirrored["raw_image_A"].as_tensor().unwrap();
        assert_eq!(mirrored_a[[3, 0, 0]], plain_a[[3, 15, 0]]);
        assert_eq!(mirrored_a[[3, 15, 1]], plain_a[[3, 0, 1]]);
    }

    #[test]
    fn test_single_path_items_are_rejected() {
        let dir = setup(1);
        let cfg = DatasetConfig::new(dir.path(), PairedTransformKwargs::new(16));
        let err = PairedDataset::new(cfg, Some(Box::new(DirectoryReader::new())), BackendProvider::unavailable())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_mirror_node_is_first() {
        let dir = setup(1);
        let dataset = PairedDataset::from_config(config(dir.path(), PairedTransformKwargs::new(16))).unwrap();
        let names = dataset.pipeline().names();
        assert_eq!(names[0], MIRROR_NODE);
        assert_eq!(names.len(), 15);
        assert!(!dataset.transform_config().contains(MIRROR_NODE));
    }

    #[test]
    fn test_define_graph_checks_arity() {
        let dir = setup(1);
        let dataset = PairedDataset::from_config(config(dir.path(), PairedTransformKwargs::new(16))).unwrap();
        let context = Rc::new(RefCell::new(GraphContext::new()));
        let inputs: Vec<Tensor> = (0..3).map(|i| Tensor::new_input(&context, &format!("in{i}"))).collect();
        let err = dataset.define_graph(&inputs).unwrap_err();
        assert!(matches!(err, PipelineError::ArityMismatch { expected: 4, got: 3 }));
    }

    #[test]
    fn test_external_source_needs_a_backend() {
        let dir = setup(1);
        let dataset = PairedDataset::from_config(config(dir.path(), PairedTransformKwargs::new(16))).unwrap();
        assert!(dataset.external_source(&BackendProvider::unavailable()).is_err());
        assert!(dataset.build_graph().is_err());

        let source = dataset.external_source(&BackendProvider::cpu()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let raw = source.call_with(0, &[], &mut rng).unwrap();
        match raw {
            Value::Tuple(items) => {
                assert_eq!(items.len(), 4);
                assert_eq!(items[0], Value::ScalarI64(0));
                assert_eq!(items[1], Value::ScalarBool(false));
            }
            other => panic!("expected a tuple, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_describe_reports_counts_and_flags() {
        let dir = setup(3);
        let cfg = DatasetConfig {
            max_samples: 2,
            mirror: true,
            ..config(dir.path(), PairedTransformKwargs::new(16))
        };
        let info = PairedDataset::from_config(cfg).unwrap().describe();
        assert_eq!(info.dataset_type, "PairedDataset");
        assert_eq!(info.file_format, "dir");
        assert_eq!(info.dataset_samples, 3);
        assert_eq!(info.num_samples, 4);
        assert_eq!(info.annotation_format.as_deref(), Some("json"));
        assert!(info.graph_compilable);
        assert!(!info.uses_opaque_function);
        assert_eq!(info.nodes[0], (MIRROR_NODE.to_string(), "Flip".to_string()));
        assert_eq!(info.transform_kwargs.image_size, 16);
        assert_eq!(info.transform_kwargs.crop_size, 16);
        assert_eq!(info.transform_kwargs.min_val, -1.0);
        assert_eq!(info.transform_config.type_of("random_flip"), Some("Identity"));

        // reported values are the effective ones, never unset keys
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["transform_kwargs"]["crop_size"], serde_json::json!(16));
        assert_eq!(json["transform_kwargs"]["image_channels_A"], serde_json::json!(3));
        assert_eq!(json["transform_kwargs"]["rb_num_vertices"], serde_json::json!(40));
        assert_eq!(json["transform_config"]["entries"][0][0], serde_json::json!("decode_A"));
    }
}
