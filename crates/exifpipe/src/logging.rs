//! Logging initialization and configuration.
//!
//! Uses the `tracing` ecosystem for structured logging with support for
//! both human-readable and JSON output formats.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// # Arguments
///
/// * `verbose` - If true, enables DEBUG level logging; otherwise `level`.
/// * `json_format` - If true, outputs structured JSON logs; otherwise pretty-printed.
/// * `log_path` - Append logs to this file instead of stderr.
///
/// # Notes
///
/// - Log output goes to stderr by default (stdout is reserved for data output)
/// - The RUST_LOG environment variable can override the log level
pub fn init(level: &str, verbose: bool, json_format: bool, log_path: Option<&Path>) {
    // Build the filter, respecting RUST_LOG if set
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = log_path.and_then(|path| match open_log_file(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!(
                "Warning: Cannot open log file {}: {e}. Logging to stderr.",
                path.display()
            );
            None
        }
    });
    let ansi = file.is_none();
    let writer = match file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    if json_format {
        // JSON format for machine parsing
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer))
            .init();
    } else {
        // Pretty format for humans
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(writer)
                    .with_ansi(ansi),
            )
            .init();
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize logging with configuration from Config.
///
/// This variant reads settings from the exifpipe configuration file.
pub fn init_from_config(
    config: &exifpipe_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let log_path = config
        .general
        .log_path
        .as_deref()
        .map(exifpipe_core::config::expand_path);
    let json_format = json_logs_override || config.logging.format == "json";
    init(
        &config.logging.level,
        verbose_override,
        json_format,
        log_path.as_deref(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("exifpipe.log");
        let file = open_log_file(&path);
        assert!(file.is_ok());
        assert!(path.exists());
    }
}
