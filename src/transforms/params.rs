//! Keyword parameters of transformation nodes.
//!
//! Nodes are built from a type name plus a string-keyed map of JSON values,
//! the same shape a configuration file carries. Each node pulls the keys it
//! understands through the typed accessors below and ignores the rest.

use crate::error::{PipelineError, PipelineResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformParams(Map<String, JsonValue>);

/// A size given either as one integer (square) or as `[height, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum SizeParam {
    Square(usize),
    Rect([usize; 2]),
}

impl TransformParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`TransformParams::insert`].
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key`. Values JSON cannot represent (NaN, infinities, maps with
    /// non-string keys) are stored as `null`, which [`get_or`](Self::get_or)
    /// and the accessors built on it reject.
    pub fn insert(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(JsonValue::Null);
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed value of `key`; absent and `null` both read as `None`.
    pub fn parse<T: DeserializeOwned>(&self, transform: &str, key: &str) -> PipelineResult<Option<T>> {
        match self.0.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| PipelineError::invalid_param(transform, key, e.to_string())),
        }
    }

    /// Typed value of `key`, `default` only when the key is absent. An
    /// explicit `null` is an error here.
    pub fn get_or<T: DeserializeOwned>(&self, transform: &str, key: &str, default: T) -> PipelineResult<T> {
        if matches!(self.0.get(key), Some(JsonValue::Null)) {
            return Err(PipelineError::invalid_param(transform, key, "expected a finite value, got null"));
        }
        Ok(self.parse(transform, key)?.unwrap_or(default))
    }

    pub fn require<T: DeserializeOwned>(&self, transform: &str, key: &str) -> PipelineResult<T> {
        self.parse(transform, key)?.ok_or_else(|| PipelineError::MissingParameter {
            transform: transform.to_string(),
            param: key.to_string(),
        })
    }

    /// `(height, width)` from an integer or a two-element list.
    pub fn size(&self, transform: &str, key: &str) -> PipelineResult<Option<(usize, usize)>> {
        let size = match self.parse::<SizeParam>(transform, key)? {
            None => return Ok(None),
            Some(SizeParam::Square(s)) => (s, s),
            Some(SizeParam::Rect([h, w])) => (h, w),
        };
        if size.0 == 0 || size.1 == 0 {
            return Err(PipelineError::invalid_param(transform, key, "size must be positive"));
        }
        Ok(Some(size))
    }

    pub fn require_size(&self, transform: &str, key: &str) -> PipelineResult<(usize, usize)> {
        self.size(transform, key)?.ok_or_else(|| PipelineError::MissingParameter {
            transform: transform.to_string(),
            param: key.to_string(),
        })
    }

    /// Probability in `[0, 1]`, `default` when absent.
    pub fn prob(&self, transform: &str, key: &str, default: f32) -> PipelineResult<f32> {
        let p: f32 = self.get_or(transform, key, default)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(PipelineError::invalid_param(transform, key, format!("probability {p} is outside [0, 1]")));
        }
        Ok(p)
    }

    /// Closed range `(low, high)` with `low <= high`, `default` when absent.
    pub fn range(&self, transform: &str, key: &str, default: (f32, f32)) -> PipelineResult<(f32, f32)> {
        let (low, high): (f32, f32) = self.get_or(transform, key, default)?;
        if low > high {
            return Err(PipelineError::invalid_param(transform, key, format!("range ({low}, {high}) is reversed")));
        }
        Ok((low, high))
    }
}

/// One entry of a transformation config: a registered type name plus its
/// keyword parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub transform_type: String,
    #[serde(flatten)]
    pub params: TransformParams,
}

impl NodeSpec {
    pub fn new(transform_type: &str, params: TransformParams) -> Self {
        Self {
            transform_type: transform_type.to_string(),
            params,
        }
    }

    pub fn identity() -> Self {
        Self::new("Identity", TransformParams::new())
    }

    pub fn is_identity(&self) -> bool {
        self.transform_type == "Identity"
    }
}

/// Named node specs in pipeline order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformConfig {
    entries: Vec<(String, NodeSpec)>,
}

impl TransformConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `name`, or replaces it in place if it already exists.
    pub fn set(&mut self, name: &str, spec: NodeSpec) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((name.to_string(), spec)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<NodeSpec> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, name: &str) -> Option<&NodeSpec> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, spec)| spec)
    }

    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|spec| spec.transform_type.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.entries.iter().map(|(n, spec)| (n.as_str(), spec))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let params = TransformParams::new()
            .with("image_size", 64)
            .with("crop_size", [32, 48])
            .with("prob", 0.25)
            .with("range", (1.0, 2.5))
            .with("blur_y_std", Option::<f32>::None);

        assert_eq!(params.require_size("T", "image_size").unwrap(), (64, 64));
        assert_eq!(params.size("T", "crop_size").unwrap(), Some((32, 48)));
        assert_eq!(params.prob("T", "prob", 0.0).unwrap(), 0.25);
        assert_eq!(params.range("T", "range", (0.0, 0.0)).unwrap(), (1.0, 2.5));
        assert_eq!(params.parse::<f32>("T", "blur_y_std").unwrap(), None);
        assert_eq!(params.get_or("T", "missing", 7usize).unwrap(), 7);
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        let params = TransformParams::new()
            .with("prob", 1.5)
            .with("range", (3.0, 1.0))
            .with("image_size", "big")
            .with("zero", 0);
        assert!(matches!(params.prob("T", "prob", 0.0), Err(PipelineError::InvalidParameter { .. })));
        assert!(params.range("T", "range", (0.0, 1.0)).is_err());
        assert!(params.size("T", "image_size").is_err());
        assert!(params.size("T", "zero").is_err());
        assert!(matches!(
            params.require::<usize>("T", "absent"),
            Err(PipelineError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_non_finite_numbers_do_not_fall_back_to_defaults() {
        let params = TransformParams::new()
            .with("prob", f32::NAN)
            .with("min_val", f32::NEG_INFINITY)
            .with("range", (0.5, f32::INFINITY));
        assert_eq!(params.get("prob"), Some(&JsonValue::Null));
        assert!(matches!(params.prob("T", "prob", 0.0), Err(PipelineError::InvalidParameter { .. })));
        assert!(params.get_or("T", "min_val", -1.0f32).is_err());
        assert!(params.range("T", "range", (0.0, 1.0)).is_err());
        // optional keys still read `null` as unset
        assert_eq!(params.parse::<f32>("T", "prob").unwrap(), None);
    }

    #[test]
    fn test_config_keeps_insertion_order() {
        let mut config = TransformConfig::new();
        config.set("decode", NodeSpec::new("Decode", TransformParams::new()));
        config.set("resize", NodeSpec::new("Resize", TransformParams::new().with("image_size", 8)));
        config.set("flip", NodeSpec::identity());
        config.set("decode", NodeSpec::identity());
        assert_eq!(config.names(), vec!["decode", "resize", "flip"]);
        assert_eq!(config.type_of("decode"), Some("Identity"));
        assert!(config.remove("resize").is_some());
        assert_eq!(config.len(), 2);
        assert!(!config.contains("resize"));
    }

    #[test]
    fn test_node_spec_serializes_flat() {
        let spec = NodeSpec::new("Resize", TransformParams::new().with("image_size", 8));
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["transform_type"], "Resize");
        assert_eq!(json["image_size"], 8);
    }
}
