//! Error types for the exifpipe metadata pipeline.
//!
//! Errors are organized by concern so that the pipeline can decide which
//! failures are fatal (configuration, explicit exit-on-error) and which are
//! counted and skipped (per-file extraction, per-record persistence).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for exifpipe operations.
#[derive(Error, Debug)]
pub enum ExifPipeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors. All of these abort before any file is read.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// The requested chain is not defined under `[pipelines]`
    #[error("Pipeline chain [{0}] is not defined")]
    UnknownChain(String),

    /// A chain references a stage name with no registered constructor
    #[error("Unknown stage [{name}] in chain [{chain}]")]
    UnknownStage { chain: String, name: String },

    /// A source stage was given an upstream
    #[error("Stage [{0}] does not accept an input")]
    InputNotAccepted(String),

    /// A consuming stage was placed where nothing feeds it
    #[error("Stage [{0}] requires an input but is first in the chain")]
    MissingInput(String),

    /// A producing stage was placed where nothing consumes it
    #[error("Stage [{0}] requires an output but is last in the chain")]
    MissingOutput(String),

    /// A stage rejected its settings during initialization
    #[error("Stage [{stage}] init error: {message}")]
    StageInit { stage: String, message: String },
}

/// Pipeline processing errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The extraction collaborator failed for one file
    #[error("Metadata extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// A lifecycle method was called in the wrong state
    #[error("Stage [{stage}] cannot {action} while {state}")]
    InvalidState {
        stage: String,
        action: &'static str,
        state: String,
    },

    /// A stage task failed while running
    #[error("Stage [{stage}] failed: {message}")]
    Stage { stage: String, message: String },

    /// Writing rendered output failed
    #[error("Output error: {0}")]
    Output(String),

    /// "Exit on first error" stopped the run early
    #[error("Run aborted after first error: {0}")]
    Aborted(String),
}

/// Document store errors. Logged per record and never fatal to a run.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document key: {0:?}")]
    InvalidKey(String),

    #[error("Failed to persist document {key}: {message}")]
    Persist { key: String, message: String },
}

/// Expression evaluation errors.
///
/// These are caught at the call site and converted to a falsy or empty
/// result; they never surface as a pipeline fault.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Type mismatch: cannot apply {op} to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,
}

/// Convenience type alias for exifpipe results.
pub type Result<T> = std::result::Result<T, ExifPipeError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_stage_message_names_chain_and_stage() {
        let err = ConfigError::UnknownStage {
            chain: "default".into(),
            name: "ouput".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ouput"));
        assert!(msg.contains("default"));
    }

    #[test]
    fn test_config_error_converts_to_top_level() {
        let err: ExifPipeError = ConfigError::UnknownChain("nope".into()).into();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
