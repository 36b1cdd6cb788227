//! Reader for collections packed into a zip archive.
//!
//! Archives are opened lazily on first use and cached per root until
//! [`FileReader::close`] is called. Access goes through a mutex because
//! `ZipArchive` needs exclusive access to seek.

use super::{is_image_path, FileReader};
use crate::error::{PipelineError, PipelineResult};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use zip::ZipArchive;

#[derive(Default)]
pub struct ZipReader {
    archives: Mutex<HashMap<PathBuf, ZipArchive<File>>>,
}

impl fmt::Debug for ZipReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self.archives.lock().map(|a| a.len()).unwrap_or(0);
        f.debug_struct("ZipReader").field("open_archives", &open).finish()
    }
}

impl ZipReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PipelineResult<MutexGuard<'_, HashMap<PathBuf, ZipArchive<File>>>> {
        self.archives
            .lock()
            .map_err(|_| PipelineError::Runtime("zip reader lock poisoned".to_string()))
    }

    /// Runs `f` on the (possibly freshly opened) archive at `root`.
    fn with_archive<T>(
        &self,
        root: &Path,
        f: impl FnOnce(&mut ZipArchive<File>) -> PipelineResult<T>,
    ) -> PipelineResult<T> {
        let mut archives = self.lock()?;
        if !archives.contains_key(root) {
            let file = File::open(root).map_err(|e| PipelineError::io(root, e))?;
            let archive = ZipArchive::new(file).map_err(|source| PipelineError::Archive {
                path: root.to_path_buf(),
                source,
            })?;
            debug!(root = %root.display(), entries = archive.len(), "opened zip archive");
            archives.insert(root.to_path_buf(), archive);
        }
        match archives.get_mut(root) {
            Some(archive) => f(archive),
            None => Err(PipelineError::Runtime(format!("archive `{}` vanished", root.display()))),
        }
    }

    fn read_entry(archive: &mut ZipArchive<File>, root: &Path, path: &str) -> PipelineResult<Vec<u8>> {
        let mut entry = archive.by_name(path).map_err(|source| PipelineError::Archive {
            path: root.join(path),
            source,
        })?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| PipelineError::io(root.join(path), e))?;
        Ok(bytes)
    }
}

impl FileReader for ZipReader {
    fn format(&self) -> &'static str {
        "zip"
    }

    fn open_annotation(&self, root: &Path, meta_name: &str) -> PipelineResult<Box<dyn Read + Send>> {
        let bytes = self.with_archive(root, |archive| Self::read_entry(archive, root, meta_name))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn list_items(&self, root: &Path) -> PipelineResult<Vec<String>> {
        self.with_archive(root, |archive| {
            let mut items: Vec<String> = archive
                .file_names()
                .filter(|name| !name.ends_with('/') && is_image_path(name))
                .map(str::to_string)
                .collect();
            items.sort();
            Ok(items)
        })
    }

    fn fetch_file(&self, root: &Path, path: &str) -> PipelineResult<Vec<u8>> {
        self.with_archive(root, |archive| Self::read_entry(archive, root, path))
    }

    fn close(&self, root: &Path) {
        if let Ok(mut archives) = self.archives.lock() {
            if archives.remove(root).is_some() {
                debug!(root = %root.display(), "closed zip archive");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_zip_list_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data.zip");
        write_archive(
            &root,
            &[("b.png", b"bee"), ("a.jpg", b"ay"), ("anno.json", b"[]")],
        );

        let reader = ZipReader::new();
        assert_eq!(reader.list_items(&root).unwrap(), vec!["a.jpg", "b.png"]);
        assert_eq!(reader.fetch_file(&root, "b.png").unwrap(), b"bee");

        let mut text = String::new();
        reader.open_annotation(&root, "anno.json").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "[]");

        reader.close(&root);
        reader.close(&root);
        // reopens transparently after close
        assert_eq!(reader.fetch_file(&root, "a.jpg").unwrap(), b"ay");
    }

    #[test]
    fn test_missing_entry_and_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data.zip");
        write_archive(&root, &[("a.png", b"x")]);
        let reader = ZipReader::new();
        assert!(matches!(
            reader.fetch_file(&root, "zzz.png").unwrap_err(),
            PipelineError::Archive { .. }
        ));
        assert!(matches!(
            reader.fetch_file(&dir.path().join("none.zip"), "a.png").unwrap_err(),
            PipelineError::Io { .. }
        ));
    }
}
