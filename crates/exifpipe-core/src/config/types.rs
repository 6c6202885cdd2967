//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::metadata::datetime::Timezone;

/// General settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Write logs to this file instead of stderr
    pub log_path: Option<PathBuf>,
}

/// Channel settings shared by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max messages buffered between adjacent stages
    pub buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { buffer_size: 16 }
    }
}

/// Concurrency ceiling for the ingestion workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Upper bound on extraction workers; clamped to hardware parallelism.
    /// Zero is treated as one.
    pub max_workers: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Root paths to scan (usually supplied on the command line)
    pub roots: Vec<PathBuf>,

    /// Emit end-of-stream as soon as any file fails
    pub exit_on_error: bool,

    /// Accepted file extensions, without the dot; empty accepts all
    pub file_exts: Vec<String>,

    /// Accepted MIME patterns such as "image/*"; empty accepts all
    pub mime_types: Vec<String>,

    /// Timezone for timestamps without an offset: "local", "UTC", "+HH:MM"
    /// or an IANA name such as "Europe/Berlin"
    pub timezone: String,

    /// Extraction backend: "exiftool" or "native"
    pub extractor: String,

    /// Executable used by the exiftool backend
    pub exiftool_path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            roots: vec![],
            exit_on_error: false,
            file_exts: vec![],
            mime_types: vec![],
            timezone: "local".to_string(),
            extractor: "exiftool".to_string(),
            exiftool_path: PathBuf::from("exiftool"),
        }
    }
}

impl InputConfig {
    /// Resolve `input.timezone`.
    pub fn zone(&self) -> Result<Timezone, ConfigError> {
        Timezone::parse(&self.timezone).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "input.timezone [{}] is not valid",
                self.timezone.trim()
            ))
        })
    }
}

/// Tag normalization rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Tag rename table; an empty target drops the tag
    pub rename: HashMap<String, String>,

    /// Sub-second companion tag to the date tag it replaces
    pub subsec_date: HashMap<String, String>,

    /// If non-empty, only these (renamed) tags are kept
    pub allow: Vec<String>,

    /// Wildcard patterns (`*`, `?`) of tags to drop after coercion
    pub remove: Vec<String>,
}

/// Settings for the `filter` stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Boolean expression; records for which it is not truthy are dropped
    pub expr: String,
}

/// Output and projection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Column expressions: a tag name, "@expression" or "%template [Tag]"
    pub cols: Vec<String>,

    /// Column expression to sort by; unset streams records unsorted
    pub sort: Option<String>,

    /// Invert the sort comparison
    pub reverse: bool,

    /// Output mode: "csv", "json" or "keys"
    pub format: String,

    /// Output file; empty writes to stdout
    pub path: Option<PathBuf>,

    /// Filter expression applied before rendering
    pub filter: Option<String>,

    /// Unresolved template references: "empty" or "placeholder"
    pub missing_tag: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cols: vec![DEFAULT_COLUMN.to_string()],
            sort: None,
            reverse: false,
            format: "csv".to_string(),
            path: None,
            filter: None,
            missing_tag: "empty".to_string(),
        }
    }
}

/// Column rendered when none are configured.
pub const DEFAULT_COLUMN: &str = "FileName";

impl OutputConfig {
    /// The configured columns, or the file name alone when none are set.
    pub fn columns(&self) -> Vec<String> {
        if self.cols.is_empty() {
            vec![DEFAULT_COLUMN.to_string()]
        } else {
            self.cols.clone()
        }
    }
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one JSON document per dedup key
    pub path: PathBuf,

    /// Remove every stored document when the store stage initializes
    pub drop_first: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.exifpipe/store"),
            drop_first: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// The chains available out of the box.
pub fn default_pipelines() -> BTreeMap<String, Vec<String>> {
    let chain = |stages: &[&str]| stages.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        ("default".to_string(), chain(&["input", "output"])),
        ("store".to_string(), chain(&["input", "dbstore"])),
        ("query".to_string(), chain(&["dbquery", "output"])),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_zone_accepts_names_and_rejects_garbage() {
        let mut input = InputConfig {
            timezone: "Asia/Singapore".into(),
            ..Default::default()
        };
        assert!(matches!(input.zone(), Ok(Timezone::Named(_))));
        input.timezone = "+9".into();
        let err = input.zone().unwrap_err();
        assert!(err.to_string().contains("input.timezone [+9]"));
    }

    #[test]
    fn test_empty_output_columns_default_to_file_name() {
        let output = OutputConfig {
            cols: vec![],
            ..Default::default()
        };
        assert_eq!(output.columns(), vec![DEFAULT_COLUMN]);
    }

    #[test]
    fn test_default_pipelines() {
        let pipelines = default_pipelines();
        assert_eq!(pipelines["default"], vec!["input", "output"]);
        assert_eq!(pipelines["query"][0], "dbquery");
    }
}
