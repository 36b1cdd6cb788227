//! Reader for collections stored as a plain directory tree.

use super::{is_image_path, FileReader};
use crate::error::{PipelineError, PipelineResult};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct DirectoryReader;

impl DirectoryReader {
    pub fn new() -> Self {
        Self
    }

    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> PipelineResult<()> {
        let entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
            if path.is_dir() {
                Self::walk(root, &path, out)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if is_image_path(&relative) {
                    out.push(relative);
                }
            }
        }
        Ok(())
    }
}

impl FileReader for DirectoryReader {
    fn format(&self) -> &'static str {
        "dir"
    }

    fn open_annotation(&self, root: &Path, meta_name: &str) -> PipelineResult<Box<dyn Read + Send>> {
        let path = root.join(meta_name);
        let file = File::open(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Box::new(file))
    }

    fn list_items(&self, root: &Path) -> PipelineResult<Vec<String>> {
        let mut items = Vec::new();
        Self::walk(root, root, &mut items)?;
        items.sort();
        Ok(items)
    }

    fn fetch_file(&self, root: &Path, path: &str) -> PipelineResult<Vec<u8>> {
        let full = root.join(path);
        fs::read(&full).map_err(|e| PipelineError::io(&full, e))
    }

    fn close(&self, _root: &Path) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_list_fetch_and_annotation() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("A")).unwrap();
        fs::write(dir.path().join("A/2.png"), b"two").unwrap();
        fs::write(dir.path().join("1.jpg"), b"one").unwrap();
        fs::write(dir.path().join("meta.txt"), b"1.jpg A/2.png\n").unwrap();

        let reader = DirectoryReader::new();
        assert_eq!(reader.list_items(dir.path()).unwrap(), vec!["1.jpg", "A/2.png"]);
        assert_eq!(reader.fetch_file(dir.path(), "A/2.png").unwrap(), b"two");

        let mut text = String::new();
        reader
            .open_annotation(dir.path(), "meta.txt")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text.trim(), "1.jpg A/2.png");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryReader::new().fetch_file(dir.path(), "nope.png").unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
