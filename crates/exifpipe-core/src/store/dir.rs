//! One JSON file per document under a directory.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{project, Document, DocumentStore, UpsertOutcome};
use crate::error::StoreError;

const EXTENSION: &str = "json";

/// Stores each document as `<dir>/<key>.json`.
///
/// Writes go to a temporary file in the same directory that is then renamed
/// over the target, so readers see either the old or the new document.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Open (and create if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn doc_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }

    fn documents(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == EXTENSION))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl DocumentStore for DirStore {
    fn replace_upsert(&self, key: &str, doc: &Document) -> Result<UpsertOutcome, StoreError> {
        let path = self.doc_path(key)?;
        let existed = path.exists();

        let tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, doc)?;
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| StoreError::Persist {
            key: key.to_string(),
            message: e.error.to_string(),
        })?;

        Ok(if existed {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn find(&self, fields: &[String]) -> Result<Vec<Document>, StoreError> {
        let mut docs = Vec::new();
        for path in self.documents()? {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable document {:?}: {}", path, e);
                    continue;
                }
            };
            match serde_json::from_str::<Document>(&content) {
                Ok(doc) => docs.push(project(&doc, fields)),
                Err(e) => tracing::warn!("Skipping corrupt document {:?}: {}", path, e),
            }
        }
        Ok(docs)
    }

    fn drop_all(&self) -> Result<(), StoreError> {
        let paths = self.documents()?;
        for path in &paths {
            fs::remove_file(path)?;
        }
        tracing::info!("Dropped {} document(s) from {:?}", paths.len(), self.dir);
        Ok(())
    }
}
