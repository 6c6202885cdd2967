//! Source stage that scans the configured roots.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::init_error;
use crate::config::Config;
use crate::error::{ConfigError, PipelineError, PipelineResult};
use crate::metadata::{extractor_factory, ExtractorFactory, Normalizer};
use crate::pipeline::{FileDiscovery, IngestScheduler, PipelineComponent, Receiver, Sender};
use crate::types::ScanStats;

const NAME: &str = "input";

/// Discovers files, extracts and normalizes them on the worker pool, and
/// emits one batch per worker.
#[derive(Default)]
pub struct InputStage {
    output: Option<Sender>,
    extractor: Option<ExtractorFactory>,
    scheduler: Option<IngestScheduler>,
    roots: Vec<PathBuf>,
    stats: Option<ScanStats>,
}

impl InputStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `extractor` instead of the backend named in `input.extractor`.
    pub fn with_extractor(extractor: ExtractorFactory) -> Self {
        Self {
            extractor: Some(extractor),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PipelineComponent for InputStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts_input(&self) -> bool {
        false
    }

    fn requires_output(&self) -> bool {
        true
    }

    fn init(&mut self, config: Arc<Config>) -> Result<(), ConfigError> {
        let extractor = match self.extractor.take() {
            Some(factory) => factory,
            None => extractor_factory(&config.input)?,
        };
        let normalizer = Normalizer::from_config(&config).map_err(|e| init_error(NAME, e))?;

        self.roots = config
            .input
            .roots
            .iter()
            .map(|root| crate::config::expand_path(root))
            .collect();
        self.scheduler = Some(IngestScheduler::new(
            FileDiscovery::new(&config.input),
            Arc::new(normalizer),
            extractor,
            config.throttle.max_workers,
            config.input.exit_on_error,
        ));
        Ok(())
    }

    fn set_input(&mut self, _input: Receiver) -> Result<(), ConfigError> {
        Err(ConfigError::InputNotAccepted(NAME.to_string()))
    }

    fn set_output(&mut self, output: Sender) {
        self.output = Some(output);
    }

    async fn run(&mut self) -> PipelineResult<()> {
        let scheduler = self.scheduler.take().ok_or_else(|| PipelineError::Stage {
            stage: NAME.to_string(),
            message: "not initialized".to_string(),
        })?;
        let output = self.output.take().ok_or_else(|| PipelineError::Stage {
            stage: NAME.to_string(),
            message: "no downstream stage".to_string(),
        })?;
        if self.roots.is_empty() {
            tracing::warn!("No input paths given, nothing to scan");
        }

        let report = scheduler.run(&self.roots, &output).await;
        drop(output);

        tracing::info!(
            "Scanned {} file(s): {} succeeded, {} failed in {:.2}s",
            report.stats.files_seen,
            report.stats.succeeded,
            report.stats.failed,
            report.stats.elapsed_seconds
        );
        self.stats = Some(report.stats);

        match report.aborted {
            Some(message) => Err(PipelineError::Aborted(message)),
            None => Ok(()),
        }
    }

    fn stats(&self) -> Option<ScanStats> {
        self.stats.clone()
    }
}
