//! Item list of a dataset and the index arithmetic around it.
//!
//! The list is read once at construction, from the first source available:
//!
//! 1. an annotation file on disk (`annotation_path`);
//! 2. an annotation file stored inside the dataset (`annotation_meta`),
//!    opened through the [`FileReader`];
//! 3. the reader's own listing of stored images.

use crate::error::{PipelineError, PipelineResult};
use crate::reader::{parse_file_format, FileReader};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Annotation formats understood by [`parse_annotation`].
pub const ANNOTATION_FORMATS: &[&str] = &["json", "txt"];

/// One record of the item list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    /// A single resource path.
    Path(String),
    /// Several fields: resource paths first, then inline labels.
    Record(Vec<String>),
}

impl Item {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Item::Path(path) => vec![path.as_str()],
            Item::Record(fields) => fields.iter().map(String::as_str).collect(),
        }
    }

    pub fn field(&self, i: usize) -> Option<&str> {
        match self {
            Item::Path(path) => (i == 0).then_some(path.as_str()),
            Item::Record(fields) => fields.get(i).map(String::as_str),
        }
    }

    pub fn num_fields(&self) -> usize {
        match self {
            Item::Path(_) => 1,
            Item::Record(fields) => fields.len(),
        }
    }
}

/// Where the item list came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IndexSource {
    AnnotationPath(PathBuf),
    AnnotationMeta(String),
    Listing,
}

/// Parses an annotation stream.
///
/// `json` expects a list whose entries are strings or lists of fields.
/// `txt` reads one item per line, fields separated by spaces; a single field
/// becomes [`Item::Path`].
pub fn parse_annotation(reader: impl Read, format: &str) -> PipelineResult<Vec<Item>> {
    let items = match format {
        "json" => {
            let entries: Vec<serde_json::Value> =
                serde_json::from_reader(reader).map_err(|e| PipelineError::Configuration(format!(
                    "annotation is not a JSON list: {e}"
                )))?;
            entries.into_iter().map(json_item).collect::<PipelineResult<Vec<_>>>()?
        }
        "txt" => {
            let mut items = Vec::new();
            for line in BufReader::new(reader).lines() {
                let line = line.map_err(|e| PipelineError::io("<annotation>", e))?;
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                let mut fields: Vec<String> = line.split(' ').map(str::to_string).collect();
                items.push(if fields.len() == 1 {
                    Item::Path(fields.remove(0))
                } else {
                    Item::Record(fields)
                });
            }
            items
        }
        other => {
            return Err(PipelineError::UnsupportedFormat {
                what: "annotation",
                format: other.to_string(),
            })
        }
    };
    if items.is_empty() {
        return Err(PipelineError::EmptyIndex);
    }
    Ok(items)
}

fn json_field(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn json_item(value: serde_json::Value) -> PipelineResult<Item> {
    match value {
        serde_json::Value::String(path) => Ok(Item::Path(path)),
        serde_json::Value::Array(fields) => Ok(Item::Record(fields.into_iter().map(json_field).collect())),
        other => Err(PipelineError::Configuration(format!(
            "annotation entries must be strings or lists, got `{other}`"
        ))),
    }
}

/// Format from `explicit`, else from the extension of `name`, else `json`.
pub fn resolve_annotation_format(explicit: Option<&str>, name: &Path) -> String {
    explicit
        .map(str::to_ascii_lowercase)
        .or_else(|| parse_file_format(name))
        .unwrap_or_else(|| "json".to_string())
}

/// The ordered item list plus where it came from.
#[derive(Debug, Clone)]
pub struct ItemIndex {
    items: Vec<Item>,
    source: IndexSource,
    annotation_format: Option<String>,
}

impl ItemIndex {
    pub fn from_items(items: Vec<Item>) -> PipelineResult<Self> {
        if items.is_empty() {
            return Err(PipelineError::EmptyIndex);
        }
        Ok(Self {
            items,
            source: IndexSource::Listing,
            annotation_format: None,
        })
    }

    /// Builds the list from the first available source (see module docs).
    pub fn load(
        reader: &dyn FileReader,
        root: &Path,
        annotation_path: Option<&Path>,
        annotation_meta: Option<&str>,
        annotation_format: Option<&str>,
    ) -> PipelineResult<Self> {
        let index = match (annotation_path.filter(|p| p.is_file()), annotation_meta) {
            (Some(path), _) => {
                let format = resolve_annotation_format(annotation_format, path);
                let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
                Self {
                    items: parse_annotation(file, &format)?,
                    source: IndexSource::AnnotationPath(path.to_path_buf()),
                    annotation_format: Some(format),
                }
            }
            (None, Some(meta)) => {
                let format = resolve_annotation_format(annotation_format, Path::new(meta));
                let stream = reader.open_annotation(root, meta)?;
                Self {
                    items: parse_annotation(stream, &format)?,
                    source: IndexSource::AnnotationMeta(meta.to_string()),
                    annotation_format: Some(format),
                }
            }
            (None, None) => {
                debug!(root = %root.display(), "no annotation given, listing stored images");
                let items = reader.list_items(root)?.into_iter().map(Item::Path).collect();
                Self::from_items(items)?
            }
        };
        info!(items = index.len(), source = ?index.source, "item index loaded");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Item> {
        self.items.get(i)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn source(&self) -> &IndexSource {
        &self.source
    }

    pub fn annotation_format(&self) -> Option<&str> {
        self.annotation_format.as_deref()
    }
}

/// Number of samples exposed by a dataset: the first `max_samples` items
/// when positive, all items otherwise, doubled when mirrored.
pub fn num_samples(dataset_samples: usize, max_samples: i64, mirror: bool) -> usize {
    let base = if max_samples > 0 {
        dataset_samples.min(max_samples as usize)
    } else {
        dataset_samples
    };
    if mirror {
        base * 2
    } else {
        base
    }
}

/// Pure mapping from a virtual index to `(base index, do_mirror)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorMapping {
    pub num_samples: usize,
    pub mirror: bool,
}

impl MirrorMapping {
    pub fn new(dataset_samples: usize, max_samples: i64, mirror: bool) -> Self {
        Self {
            num_samples: num_samples(dataset_samples, max_samples, mirror),
            mirror,
        }
    }

    pub fn resolve(&self, index: usize) -> PipelineResult<(usize, bool)> {
        if index >= self.num_samples {
            return Err(PipelineError::IndexOutOfRange {
                index,
                len: self.num_samples,
            });
        }
        let half = self.num_samples / 2;
        if self.mirror && index >= half {
            Ok((index - half, true))
        } else {
            Ok((index, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::DirectoryReader;
    use std::io::Write;

    #[test]
    fn test_parse_json_annotation() {
        let json = r#"[["a.png", "b.png"], "c.png", ["d.png", "e.png", 3]]"#;
        let items = parse_annotation(json.as_bytes(), "json").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].fields(), vec!["a.png", "b.png"]);
        assert_eq!(items[1], Item::Path("c.png".into()));
        assert_eq!(items[2].field(2), Some("3"));
    }

    #[test]
    fn test_parse_txt_annotation() {
        let txt = "a.png b.png\nc.png\n\nd.png e.png label\n";
        let items = parse_annotation(txt.as_bytes(), "txt").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Item::Record(vec!["a.png".into(), "b.png".into()]));
        assert_eq!(items[1], Item::Path("c.png".into()));
        assert_eq!(items[2].num_fields(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_annotation("[]".as_bytes(), "json"), Err(PipelineError::EmptyIndex)));
        assert!(matches!(
            parse_annotation("{\"a\": 1}".as_bytes(), "json"),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            parse_annotation("a".as_bytes(), "csv"),
            Err(PipelineError::UnsupportedFormat { what: "annotation", .. })
        ));
    }

    #[test]
    fn test_format_resolution() {
        assert_eq!(resolve_annotation_format(Some("TXT"), Path::new("x.json")), "txt");
        assert_eq!(resolve_annotation_format(None, Path::new("pairs.txt")), "txt");
        assert_eq!(resolve_annotation_format(None, Path::new("pairs")), "json");
    }

    #[test]
    fn test_num_samples_truncates_before_mirroring() {
        assert_eq!(num_samples(10, -1, false), 10);
        assert_eq!(num_samples(10, 0, false), 10);
        assert_eq!(num_samples(10, 4, false), 4);
        assert_eq!(num_samples(10, 40, false), 10);
        assert_eq!(num_samples(10, 4, true), 8);
        assert_eq!(num_samples(3, -1, true), 6);
    }

    #[test]
    fn test_mirror_mapping() {
        let mapping = MirrorMapping::new(10, 3, true);
        assert_eq!(mapping.num_samples, 6);
        assert_eq!(mapping.resolve(0).unwrap(), (0, false));
        assert_eq!(mapping.resolve(2).unwrap(), (2, false));
        for i in 3..6 {
            assert_eq!(mapping.resolve(i).unwrap(), (i - 3, true));
        }
        assert!(matches!(mapping.resolve(6), Err(PipelineError::IndexOutOfRange { index: 6, len: 6 })));

        let plain = MirrorMapping::new(4, -1, false);
        assert_eq!(plain.resolve(3).unwrap(), (3, false));
    }

    #[test]
    fn test_load_prefers_annotation_path_then_meta_then_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.png"), b"not really").unwrap();
        std::fs::write(dir.path().join("meta.txt"), "x.png y.png\n").unwrap();
        let outside = dir.path().join("outside.json");
        let mut f = File::create(&outside).unwrap();
        writeln!(f, r#"[["p.png", "q.png"], ["r.png", "s.png"]]"#).unwrap();

        let reader = DirectoryReader::new();
        let index = ItemIndex::load(&reader, dir.path(), Some(&outside), Some("meta.txt"), None).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.annotation_format(), Some("json"));

        let missing = dir.path().join("missing.json");
        let index = ItemIndex::load(&reader, dir.path(), Some(&missing), Some("meta.txt"), None).unwrap();
        assert_eq!(index.source(), &IndexSource::AnnotationMeta("meta.txt".into()));
        assert_eq!(index.get(0).unwrap().field(1), Some("y.png"));

        let index = ItemIndex::load(&reader, dir.path(), None, None, None).unwrap();
        assert_eq!(index.source(), &IndexSource::Listing);
        assert_eq!(index.items(), &[Item::Path("x.png".into())]);
    }

    #[test]
    fn test_empty_listing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ItemIndex::load(&DirectoryReader::new(), dir.path(), None, None, None).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyIndex));
    }
}
