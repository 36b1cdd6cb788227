//! Error taxonomy shared by every layer of the pipeline.
//!
//! Errors fall into four families (see [`ErrorKind`]): configuration
//! problems found at construction, missing graph capabilities, contract
//! violations inside a pipeline definition, and data/I-O failures that are
//! propagated untouched. Non-fatal findings are reported as [`DataWarning`]s
//! instead of errors.

use crate::analysis::graph_check::GraphCheckError;
use crate::asg::AsgError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    Capability,
    ContractViolation,
    Data,
    Runtime,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    // --- Configuration ---
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Item index is empty: no annotation entries and no items listed by the reader")]
    EmptyIndex,

    #[error("Unsupported {what} format `{format}`")]
    UnsupportedFormat { what: &'static str, format: String },

    #[error("Invalid transformation type `{name}`. Types allowed: {allowed:?}")]
    UnknownTransformationType { name: String, allowed: Vec<String> },

    #[error("Invalid value for `{param}` of {transform}: {reason}")]
    InvalidParameter {
        transform: String,
        param: String,
        reason: String,
    },

    #[error("Missing required parameter `{param}` for {transform}")]
    MissingParameter { transform: String, param: String },

    /// Malformed dataset configuration file.
    #[error("Failed to parse JSON from `{path}`: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // --- Capability ---
    #[error("Graph execution is not possible: {0}")]
    Capability(String),

    #[error("Graph backend `{requested}` is not available in this environment")]
    BackendUnavailable { requested: String },

    // --- Contract violations ---
    #[error("Output arity mismatch: expected {expected} values, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Switch operands differ in length: {true_len} (true branch) vs {false_len} (false branch)")]
    SwitchLengthMismatch { true_len: usize, false_len: usize },

    #[error("Type mismatch in `{op}`: expected {expected}, got {actual}")]
    TypeMismatch {
        op: String,
        expected: String,
        actual: String,
    },

    #[error("Transformation `{0}` is not part of the pipeline")]
    MissingTransformation(String),

    #[error("Graph error: {0}")]
    Graph(#[from] AsgError),

    #[error("Invalid graph definition: {0}")]
    InvalidGraph(#[from] GraphCheckError),

    // --- Data ---
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error on `{path}`: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Index {index} is out of range for a dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    // --- Runtime ---
    #[error("Graph execution failed: {0}")]
    Runtime(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_)
            | Self::EmptyIndex
            | Self::UnsupportedFormat { .. }
            | Self::UnknownTransformationType { .. }
            | Self::InvalidParameter { .. }
            | Self::MissingParameter { .. }
            | Self::Json { .. } => ErrorKind::Configuration,
            Self::Capability(_) | Self::BackendUnavailable { .. } => ErrorKind::Capability,
            Self::ArityMismatch { .. }
            | Self::SwitchLengthMismatch { .. }
            | Self::TypeMismatch { .. }
            | Self::MissingTransformation(_)
            | Self::Graph(_)
            | Self::InvalidGraph(_) => ErrorKind::ContractViolation,
            Self::Io { .. }
            | Self::Archive { .. }
            | Self::Decode(_)
            | Self::IndexOutOfRange { .. } => ErrorKind::Data,
            Self::Runtime(_) => ErrorKind::Runtime,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_param(
        transform: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            transform: transform.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(
        op: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            op: op.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Non-fatal finding recorded while a pipeline is composed.
///
/// Warnings downgrade a feature (usually to an identity node) but never stop
/// construction. They are emitted through `tracing` and kept on the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataWarning {
    pub code: String,
    pub message: String,
}

impl DataWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let warning = Self {
            code: code.into(),
            message: message.into(),
        };
        tracing::warn!(code = %warning.code, "{}", warning.message);
        warning
    }
}

impl fmt::Display for DataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_lists_allowed_names() {
        let err = PipelineError::UnknownTransformationType {
            name: "Sepia".to_string(),
            allowed: vec!["Flip".to_string(), "Identity".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Sepia"));
        assert!(msg.contains("Flip"));
        assert!(msg.contains("Identity"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PipelineError::SwitchLengthMismatch { true_len: 1, false_len: 2 }.kind(),
            ErrorKind::ContractViolation
        );
        assert_eq!(
            PipelineError::BackendUnavailable { requested: "cpu".into() }.kind(),
            ErrorKind::Capability
        );
        let io = PipelineError::io(
            "missing.png",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(io.kind(), ErrorKind::Data);
    }

    #[test]
    fn test_warning_display() {
        let warning = DataWarning::new("rb_channel_mismatch", "disabled");
        assert_eq!(warning.to_string(), "[rb_channel_mismatch] disabled");
    }
}
