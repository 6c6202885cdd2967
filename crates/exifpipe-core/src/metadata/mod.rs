//! Metadata extraction and normalization.
//!
//! Extraction is delegated to a [`MetadataExtractor`] that turns a batch of
//! file paths into raw tag maps. The [`Normalizer`] then turns each raw map
//! into a typed [`Record`](crate::types::Record) with a dedup key.
//!
//! - **exiftool**: one stay-open `exiftool` process per worker, one `-json`
//!   request per batch
//! - **native**: reads EXIF in-process with `kamadak-exif`
//! - **map**: serves fixed tag maps from memory (fixtures and tests)

pub mod datetime;
mod exiftool;
pub mod key;
mod native;
pub mod normalize;

pub use self::exiftool::ExifToolExtractor;
pub use key::dedup_key;
pub use native::NativeExtractor;
pub use normalize::{Normalized, Normalizer};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::InputConfig;
use crate::error::{ConfigError, PipelineError};

/// A raw tag value as reported by an extractor, before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// Raw tag name to value map for one file.
pub type RawTags = BTreeMap<String, RawValue>;

/// Outcome of extracting one file.
pub type FileResult = Result<RawTags, PipelineError>;

/// Turns a batch of files into raw tag maps.
///
/// Implementations are owned by exactly one ingestion worker and may keep
/// per-worker state (a child process, buffers) between batches.
pub trait MetadataExtractor: Send {
    fn name(&self) -> &'static str;

    /// Extract every file in `paths`. The result has one entry per input
    /// path, in the same order; a failure for one file never affects the
    /// others.
    fn extract_batch(&mut self, paths: &[PathBuf]) -> Vec<FileResult>;
}

/// Builds a fresh extractor for each ingestion worker.
pub type ExtractorFactory = Arc<dyn Fn() -> Box<dyn MetadataExtractor> + Send + Sync>;

/// Choose the extraction backend named by `input.extractor`.
pub fn extractor_factory(config: &InputConfig) -> Result<ExtractorFactory, ConfigError> {
    match config.extractor.to_lowercase().as_str() {
        "exiftool" => {
            let program = crate::config::expand_path(&config.exiftool_path);
            Ok(Arc::new(move || {
                Box::new(ExifToolExtractor::new(program.clone())) as Box<dyn MetadataExtractor>
            }))
        }
        "native" => Ok(Arc::new(|| {
            Box::new(NativeExtractor::new()) as Box<dyn MetadataExtractor>
        })),
        other => Err(ConfigError::ValidationError(format!(
            "input.extractor [{other}] is not supported"
        ))),
    }
}

/// Serves pre-built tag maps keyed by path.
///
/// A path with no entry fails extraction, which makes it handy for
/// exercising error handling as well.
#[derive(Debug, Clone, Default)]
pub struct MapExtractor {
    files: HashMap<PathBuf, RawTags>,
}

impl MapExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, tags: RawTags) -> Self {
        self.files.insert(path.into(), tags);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, tags: RawTags) {
        self.files.insert(path.into(), tags);
    }

    fn lookup(&self, path: &Path) -> FileResult {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::Extraction {
                path: path.to_path_buf(),
                message: "no metadata registered for file".to_string(),
            })
    }

    /// Factory that hands every worker its own clone of this map.
    pub fn into_factory(self) -> ExtractorFactory {
        Arc::new(move || Box::new(self.clone()) as Box<dyn MetadataExtractor>)
    }
}

impl MetadataExtractor for MapExtractor {
    fn name(&self) -> &'static str {
        "map"
    }

    fn extract_batch(&mut self, paths: &[PathBuf]) -> Vec<FileResult> {
        paths.iter().map(|p| self.lookup(p)).collect()
    }
}

/// Tags every extractor reports from the file system itself.
pub(crate) fn file_tags(path: &Path, size: u64) -> RawTags {
    let mut tags = RawTags::new();
    if let Some(name) = path.file_name() {
        tags.insert(
            "FileName".to_string(),
            RawValue::Text(name.to_string_lossy().into_owned()),
        );
    }
    if let Some(dir) = path.parent() {
        tags.insert(
            "Directory".to_string(),
            RawValue::Text(dir.to_string_lossy().into_owned()),
        );
    }
    tags.insert("FileSize".to_string(), RawValue::Number(size as f64));
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_extractor_isolates_missing_files() {
        let mut extractor = MapExtractor::new()
            .with_file("/a.jpg", RawTags::from([("Make".into(), "Canon".into())]));
        let results =
            extractor.extract_batch(&[PathBuf::from("/a.jpg"), PathBuf::from("/missing.jpg")]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap()["Make"], RawValue::from("Canon"));
        assert!(matches!(
            results[1],
            Err(PipelineError::Extraction { .. })
        ));
    }

    #[test]
    fn test_extractor_factory_selects_backend() {
        let mut config = InputConfig::default();
        assert_eq!(extractor_factory(&config).unwrap()().name(), "exiftool");
        config.extractor = "native".into();
        assert_eq!(extractor_factory(&config).unwrap()().name(), "native");
        config.extractor = "magic".into();
        assert!(extractor_factory(&config).is_err());
    }

    #[test]
    fn test_file_tags() {
        let tags = file_tags(Path::new("/photos/2020/a.jpg"), 1234);
        assert_eq!(tags["FileName"], RawValue::from("a.jpg"));
        assert_eq!(tags["Directory"], RawValue::from("/photos/2020"));
        assert_eq!(tags["FileSize"], RawValue::Number(1234.0));
    }
}
