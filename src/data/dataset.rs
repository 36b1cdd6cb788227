//! The `Dataset` trait and the raw store handle datasets own.

use super::paired_config::PairedTransformSettings;
use crate::asg::Value;
use crate::error::PipelineResult;
use crate::reader::{build_file_reader, parse_file_format, FileReader};
use crate::transforms::TransformConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One produced sample: output key -> value.
pub type Sample = HashMap<String, Value>;

/// Random-access source of samples.
///
/// `get` takes `&self` and must be callable from several threads at once
/// over different indices.
pub trait Dataset: Send + Sync {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of every produced [`Sample`], in output order.
    fn output_keys(&self) -> &[&'static str];

    fn get(&self, index: usize) -> PipelineResult<Sample>;
}

/// Diagnostic summary of a constructed dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    #[serde(rename = "type")]
    pub dataset_type: String,
    pub root_dir: PathBuf,
    pub file_format: String,
    pub annotation_path: Option<PathBuf>,
    pub annotation_meta: Option<String>,
    pub annotation_format: Option<String>,
    pub dataset_samples: usize,
    pub max_samples: i64,
    pub mirror: bool,
    pub num_samples: usize,
    pub graph_compilable: bool,
    pub uses_opaque_function: bool,
    /// Keyword configuration with every default filled in.
    pub transform_kwargs: PairedTransformSettings,
    /// Per-node parameters as built, mirror node excluded.
    pub transform_config: TransformConfig,
    /// `(node name, node type)` in application order.
    pub nodes: Vec<(String, String)>,
    pub warnings: Vec<String>,
}

/// A [`FileReader`] bound to one root. Closes the root when dropped, so the
/// handle is released on every exit path.
pub struct RawStore {
    root: PathBuf,
    reader: Box<dyn FileReader>,
}

impl RawStore {
    /// Opens `root` with the reader for `format`, guessed from the path when
    /// not given.
    pub fn open(root: impl Into<PathBuf>, format: Option<&str>) -> PipelineResult<Self> {
        let root = root.into();
        let format = format
            .map(str::to_string)
            .or_else(|| parse_file_format(&root))
            .unwrap_or_else(|| "dir".to_string());
        let reader = build_file_reader(&format)?;
        Ok(Self::with_reader(root, reader))
    }

    pub fn with_reader(root: impl Into<PathBuf>, reader: Box<dyn FileReader>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), format = reader.format(), "raw store opened");
        Self { root, reader }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> &'static str {
        self.reader.format()
    }

    pub fn reader(&self) -> &dyn FileReader {
        self.reader.as_ref()
    }

    pub fn fetch_file(&self, path: &str) -> PipelineResult<Vec<u8>> {
        self.reader.fetch_file(&self.root, path)
    }

    pub fn open_annotation(&self, meta_name: &str) -> PipelineResult<Box<dyn Read + Send>> {
        self.reader.open_annotation(&self.root, meta_name)
    }

    pub fn list_items(&self) -> PipelineResult<Vec<String>> {
        self.reader.list_items(&self.root)
    }
}

impl fmt::Debug for RawStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawStore")
            .field("root", &self.root)
            .field("format", &self.reader.format())
            .finish()
    }
}

impl Drop for RawStore {
    fn drop(&mut self) {
        debug!(root = %self.root.display(), "raw store closed");
        self.reader.close(&self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct CountingReader(Arc<AtomicUsize>);

    impl FileReader for CountingReader {
        fn format(&self) -> &'static str {
            "counting"
        }

        fn open_annotation(&self, _root: &Path, meta_name: &str) -> PipelineResult<Box<dyn Read + Send>> {
            Err(crate::error::PipelineError::Configuration(format!("no {meta_name}")))
        }

        fn list_items(&self, _root: &Path) -> PipelineResult<Vec<String>> {
            Ok(vec!["a.png".to_string()])
        }

        fn fetch_file(&self, _root: &Path, path: &str) -> PipelineResult<Vec<u8>> {
            Ok(path.as_bytes().to_vec())
        }

        fn close(&self, _root: &Path) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_store_closes_on_drop() {
        let closed = Arc::new(AtomicUsize::new(0));
        let store = RawStore::with_reader("/data", Box::new(CountingReader(Arc::clone(&closed))));
        assert_eq!(store.fetch_file("x.png").unwrap(), b"x.png".to_vec());
        assert_eq!(store.list_items().unwrap(), vec!["a.png"]);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        drop(store);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_guesses_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::open(dir.path(), None).unwrap();
        assert_eq!(store.format(), "dir");

        let err = RawStore::open(dir.path().join("data.lmdb"), None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
