//! Batch extraction through a long-running `exiftool -stay_open` process.

use ::exiftool::ExifTool;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

use super::{FileResult, MetadataExtractor, RawTags, RawValue};
use crate::error::PipelineError;

/// Quiet mode twice over: warnings would otherwise reach stdout.
const QUIET: &[&str] = &["-q", "-q"];

/// Owns one `exiftool` process, started on the first batch and reused for
/// every batch the worker extracts after that.
#[derive(Debug)]
pub struct ExifToolExtractor {
    program: PathBuf,
    tool: Option<ExifTool>,
}

impl ExifToolExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            tool: None,
        }
    }

    fn tool(&mut self) -> Result<&mut ExifTool, String> {
        if self.tool.is_none() {
            let tool = ExifTool::with_executable(&self.program)
                .map_err(|e| format!("cannot start {}: {e}", self.program.display()))?;
            tracing::debug!("Started {} in stay-open mode", self.program.display());
            self.tool = Some(tool);
        }
        self.tool
            .as_mut()
            .ok_or_else(|| "exiftool process unavailable".to_string())
    }

    /// One `-json` request for the whole batch. A failed request drops the
    /// process so that the next call starts a fresh one.
    fn request(&mut self, paths: &[PathBuf]) -> Result<Vec<Value>, String> {
        let result = self
            .tool()?
            .json_batch(paths, QUIET)
            .map_err(|e| e.to_string());
        if result.is_err() {
            self.tool = None;
        }
        result
    }
}

impl MetadataExtractor for ExifToolExtractor {
    fn name(&self) -> &'static str {
        "exiftool"
    }

    fn extract_batch(&mut self, paths: &[PathBuf]) -> Vec<FileResult> {
        if paths.is_empty() {
            return vec![];
        }
        match self.request(paths) {
            Ok(entries) => match_entries(entries, paths),
            Err(e) if paths.len() > 1 && self.tool().is_ok() => {
                // One bad file fails the whole request; retry file by file.
                tracing::debug!(
                    "exiftool batch of {} files failed ({}), retrying singly",
                    paths.len(),
                    e
                );
                paths
                    .iter()
                    .flat_map(|path| self.extract_batch(std::slice::from_ref(path)))
                    .collect()
            }
            Err(e) => {
                tracing::error!("exiftool batch of {} files failed: {}", paths.len(), e);
                paths
                    .iter()
                    .map(|p| {
                        Err(PipelineError::Extraction {
                            path: p.clone(),
                            message: e.clone(),
                        })
                    })
                    .collect()
            }
        }
    }
}

/// Match exiftool's JSON entries back to the requested paths by `SourceFile`.
fn match_entries(entries: Vec<Value>, paths: &[PathBuf]) -> Vec<FileResult> {
    let mut by_source: HashMap<String, Map<String, Value>> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Object(mut entry) => match entry.remove("SourceFile") {
                Some(Value::String(source)) => Some((source, entry)),
                _ => None,
            },
            _ => None,
        })
        .collect();

    paths
        .iter()
        .map(|path| {
            let failed = |message: String| PipelineError::Extraction {
                path: path.clone(),
                message,
            };
            let entry = by_source
                .remove(&*path.to_string_lossy())
                .ok_or_else(|| failed("not reported by exiftool".to_string()))?;
            if let Some(error) = entry.get("Error") {
                return Err(failed(display_json(error)));
            }
            Ok(raw_tags(entry))
        })
        .collect()
}

fn raw_tags(entry: Map<String, Value>) -> RawTags {
    entry
        .into_iter()
        .filter_map(|(name, value)| {
            let raw = match value {
                Value::Null => return None,
                Value::Bool(b) => RawValue::Bool(b),
                Value::Number(n) => match n.as_f64() {
                    Some(f) => RawValue::Number(f),
                    None => RawValue::Text(n.to_string()),
                },
                Value::String(s) => RawValue::Text(s),
                other => RawValue::Text(display_json(&other)),
            };
            Some((name, raw))
        })
        .collect()
}

/// Lists join with ", " the way exiftool prints them in text mode.
fn display_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_json)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    #[test]
    fn test_entries_match_source_files() {
        let json = json!([
            {"SourceFile": "/p/b.jpg", "Make": "Nikon", "ISO": 200},
            {"SourceFile": "/p/a.jpg", "Make": "Canon", "Flash": true,
             "Keywords": ["sea", "sky"], "Empty": null}
        ]);
        let paths = vec![PathBuf::from("/p/a.jpg"), PathBuf::from("/p/b.jpg")];
        let results = match_entries(entries(json), &paths);

        let a = results[0].as_ref().unwrap();
        assert_eq!(a["Make"], RawValue::from("Canon"));
        assert_eq!(a["Flash"], RawValue::Bool(true));
        assert_eq!(a["Keywords"], RawValue::from("sea, sky"));
        assert!(!a.contains_key("Empty"));
        assert!(!a.contains_key("SourceFile"));

        let b = results[1].as_ref().unwrap();
        assert_eq!(b["ISO"], RawValue::Number(200.0));
    }

    #[test]
    fn test_error_entries_and_unreported_files_fail_singly() {
        let json = json!([
            {"SourceFile": "/p/bad.jpg", "Error": "File format error"},
            {"SourceFile": "/p/ok.jpg", "Make": "Canon"}
        ]);
        let paths = vec![
            PathBuf::from("/p/bad.jpg"),
            PathBuf::from("/p/gone.jpg"),
            PathBuf::from("/p/ok.jpg"),
        ];
        let results = match_entries(entries(json), &paths);
        match &results[0] {
            Err(PipelineError::Extraction { message, .. }) => {
                assert_eq!(message, "File format error")
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_non_object_entries_are_ignored() {
        let paths = vec![PathBuf::from("/p/a.jpg")];
        let results = match_entries(vec![json!("noise"), json!(42)], &paths);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_missing_program_fails_every_file() {
        let mut extractor = ExifToolExtractor::new("/nonexistent/bin/exiftool");
        let results =
            extractor.extract_batch(&[PathBuf::from("/p/a.jpg"), PathBuf::from("/p/b.jpg")]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_err()));
        assert!(extractor.tool.is_none());
    }
}
