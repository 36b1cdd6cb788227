//! Dataset construction settings, loadable from JSON.

use super::paired_config::PairedTransformKwargs;
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the dataset is going to be consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Item by item through `get`.
    #[default]
    Eager,
    /// As a graph for a batched runtime. Construction fails unless every
    /// node compiles and a backend is available.
    Graph,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory or archive holding the dataset.
    pub root_dir: PathBuf,
    /// `dir`, `zip`, ... Guessed from `root_dir` when absent.
    pub file_format: Option<String>,
    pub annotation_path: Option<PathBuf>,
    /// Annotation file stored inside `root_dir`.
    pub annotation_meta: Option<String>,
    /// `json` or `txt`. Guessed from the annotation name when absent.
    pub annotation_format: Option<String>,
    /// Non-positive means every item.
    pub max_samples: i64,
    pub mirror: bool,
    pub execution_mode: ExecutionMode,
    pub transform_kwargs: PairedTransformKwargs,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            file_format: None,
            annotation_path: None,
            annotation_meta: None,
            annotation_format: None,
            max_samples: -1,
            mirror: false,
            execution_mode: ExecutionMode::Eager,
            transform_kwargs: PairedTransformKwargs::default(),
        }
    }
}

impl DatasetConfig {
    pub fn new(root_dir: impl Into<PathBuf>, transform_kwargs: PairedTransformKwargs) -> Self {
        Self {
            root_dir: root_dir.into(),
            transform_kwargs,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        serde_json::from_str(json).map_err(|source| PipelineError::Json {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text).map_err(|source| PipelineError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatasetConfig::default();
        assert_eq!(config.max_samples, -1);
        assert!(!config.mirror);
        assert_eq!(config.execution_mode, ExecutionMode::Eager);
    }

    #[test]
    fn test_from_json_str_fills_defaults() {
        let config = DatasetConfig::from_json_str(
            r#"{
                "root_dir": "/data/facades",
                "file_format": "zip",
                "mirror": true,
                "execution_mode": "graph",
                "transform_kwargs": {"image_size": 256, "image_channels_B": 1, "hflip_prob": 0.5}
            }"#,
        )
        .unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/data/facades"));
        assert_eq!(config.max_samples, -1);
        assert_eq!(config.execution_mode, ExecutionMode::Graph);
        assert_eq!(config.transform_kwargs.image_size, Some(256));
        assert_eq!(config.transform_kwargs.image_channels_b, Some(1));
        assert_eq!(config.transform_kwargs.hflip_prob, Some(0.5));
    }

    #[test]
    fn test_malformed_config_is_a_configuration_error() {
        let err = DatasetConfig::from_json_str("{").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(matches!(err, PipelineError::Json { .. }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(&path, r#"{"root_dir": "x", "max_samples": 5}"#).unwrap();
        let config = DatasetConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_samples, 5);

        std::fs::write(&path, r#"{"root_dir": "x", "max_samples": "all"}"#).unwrap();
        let err = DatasetConfig::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
