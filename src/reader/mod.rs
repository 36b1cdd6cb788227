//! # Raw store adapters
//!
//! A [`FileReader`] gives the dataset access to the raw bytes of a stored
//! collection: the annotation file, the list of stored items, and the content
//! of each item. Every method is keyed by the store root so one reader can
//! serve several roots; `fetch_file` may be called concurrently from worker
//! threads and implementations synchronize internally.
//!
//! | format | reader |
//! |--------|--------|
//! | `dir`  | [`DirectoryReader`] |
//! | `zip`  | [`ZipReader`] |
//!
//! `lmdb` and `tar` are recognised names but are not implemented.

pub mod directory;
pub mod zip_reader;

pub use directory::DirectoryReader;
pub use zip_reader::ZipReader;

use crate::error::{PipelineError, PipelineResult};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// File extensions treated as images when a store is listed.
pub const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

/// Formats recognised by [`build_file_reader`].
pub const FILE_FORMATS: &[&str] = &["dir", "lmdb", "tar", "zip"];

pub trait FileReader: Send + Sync + fmt::Debug {
    /// Short format name (`dir`, `zip`, ...).
    fn format(&self) -> &'static str;

    /// Opens a named annotation file stored inside `root`.
    fn open_annotation(&self, root: &Path, meta_name: &str) -> PipelineResult<Box<dyn Read + Send>>;

    /// Sorted relative paths of every image stored under `root`.
    fn list_items(&self, root: &Path) -> PipelineResult<Vec<String>>;

    /// Raw bytes of `path` (relative to `root`).
    fn fetch_file(&self, root: &Path, path: &str) -> PipelineResult<Vec<u8>>;

    /// Releases any handle held for `root`. Closing twice is a no-op.
    fn close(&self, root: &Path);
}

/// Builds the reader for a file format name (case insensitive).
pub fn build_file_reader(format: &str) -> PipelineResult<Box<dyn FileReader>> {
    match format.to_ascii_lowercase().as_str() {
        "dir" => Ok(Box::new(DirectoryReader::new())),
        "zip" => Ok(Box::new(ZipReader::new())),
        other => Err(PipelineError::UnsupportedFormat {
            what: "file",
            format: other.to_string(),
        }),
    }
}

/// Guesses a format from a path: directories are `dir`, files go by their
/// lowercase extension.
pub fn parse_file_format(path: &Path) -> Option<String> {
    if path.is_dir() {
        return Some("dir".to_string());
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub(crate) fn is_image_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
