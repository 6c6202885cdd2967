//! Configuration validation with range and consistency checks.

use crate::error::ConfigError;

use super::Config;

const OUTPUT_FORMATS: &[&str] = &["csv", "json", "keys"];
const EXTRACTORS: &[&str] = &["exiftool", "native"];
const MISSING_TAG_POLICIES: &[&str] = &["empty", "placeholder"];

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.buffer_size must be > 0".into(),
            ));
        }
        for (name, stages) in &self.pipelines {
            if stages.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "pipelines.{name} must list at least one stage"
                )));
            }
        }
        if !OUTPUT_FORMATS.contains(&self.output.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "output.format must be one of {OUTPUT_FORMATS:?}, got [{}]",
                self.output.format
            )));
        }
        if !EXTRACTORS.contains(&self.input.extractor.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "input.extractor must be one of {EXTRACTORS:?}, got [{}]",
                self.input.extractor
            )));
        }
        if !MISSING_TAG_POLICIES.contains(&self.output.missing_tag.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "output.missing_tag must be one of {MISSING_TAG_POLICIES:?}, got [{}]",
                self.output.missing_tag
            )));
        }
        if self.output.cols.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "output.cols must not contain empty column names".into(),
            ));
        }
        self.input.zone()?;
        Ok(())
    }
}
