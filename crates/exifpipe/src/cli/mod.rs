//! CLI command implementations.

pub mod config;
pub mod run;
pub mod stages;

use exifpipe_core::{Config, ConfigError};
use std::path::Path;

/// Load the config named by `--config`, or the default file if present.
///
/// An explicitly named file must exist; a missing default file yields the
/// built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
