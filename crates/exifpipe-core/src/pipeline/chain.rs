//! Stage registry and chain assembly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::channel::bounded_channel;
use super::component::{PipelineComponent, Stage};
use crate::config::Config;
use crate::error::{ConfigError, PipelineError, Result};
use crate::stages::{DbQueryStage, DbStoreStage, FilterStage, InputStage, OutputStage};
use crate::types::ScanStats;

/// Builds a fresh component for one chain position.
pub type StageFactory = Arc<dyn Fn() -> Box<dyn PipelineComponent> + Send + Sync>;

/// Compile-time mapping from stage name to constructor.
#[derive(Clone, Default)]
pub struct Registry {
    factories: BTreeMap<String, StageFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The five built-in stages.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("input", || Box::new(InputStage::new()));
        registry.register("filter", || Box::new(FilterStage::new()));
        registry.register("output", || Box::new(OutputStage::new()));
        registry.register("dbstore", || Box::new(DbStoreStage::new()));
        registry.register("dbquery", || Box::new(DbQueryStage::new()));
        registry
    }

    /// Add or replace a stage constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn PipelineComponent> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn PipelineComponent>> {
        self.factories.get(name).map(|factory| factory())
    }
}

/// Outcome of a completed chain run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub chain: String,

    /// Scan counters from the ingesting stage, if the chain had one
    pub stats: Option<ScanStats>,

    pub elapsed_seconds: f64,
}

/// An assembled, initialized, ordered list of stages.
#[derive(Debug)]
pub struct Chain {
    name: String,
    stages: Vec<Stage>,
}

impl Chain {
    /// Assemble the chain named in `config.pipelines`.
    pub fn from_config(name: &str, registry: &Registry, config: Arc<Config>) -> Result<Self> {
        let names = config.chain(name)?.to_vec();
        Self::assemble(name, &names, registry, config)
    }

    /// Instantiate, wire and initialize `stage_names` in order.
    ///
    /// Fails on the first unknown name, wiring violation or init error;
    /// nothing has run at that point.
    pub fn assemble(
        name: &str,
        stage_names: &[String],
        registry: &Registry,
        config: Arc<Config>,
    ) -> Result<Self> {
        if stage_names.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "pipelines.{name} must list at least one stage"
            ))
            .into());
        }

        let mut stages = stage_names
            .iter()
            .map(|stage_name| {
                registry
                    .create(stage_name)
                    .map(|component| Stage::new(stage_name.clone(), component))
                    .ok_or_else(|| ConfigError::UnknownStage {
                        chain: name.to_string(),
                        name: stage_name.clone(),
                    })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for i in 1..stages.len() {
            let (tx, rx) = bounded_channel(&config.pipeline);
            stages[i - 1].set_output(tx)?;
            stages[i].set_input(rx)?;
        }

        for stage in &mut stages {
            stage.init(Arc::clone(&config))?;
        }

        tracing::info!("Assembled chain [{}]: {}", name, stage_names.join(" -> "));
        Ok(Self {
            name: name.to_string(),
            stages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages in chain order; iterate with `.rev()` to walk back from the sink.
    pub fn stages(&self) -> std::slice::Iter<'_, Stage> {
        self.stages.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// The stage feeding `index`, if any.
    pub fn upstream_of(&self, index: usize) -> Option<&Stage> {
        index.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    /// The stage fed by `index`, if any.
    pub fn downstream_of(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index + 1)
    }

    /// Run every stage concurrently until the sink finishes.
    ///
    /// All stages are awaited even after a failure so that buffered output
    /// is flushed; the first error in chain order is returned.
    pub async fn run(self) -> Result<RunReport> {
        let start = Instant::now();
        let chain = self.name;

        let handles: Vec<_> = self
            .stages
            .into_iter()
            .map(|mut stage| {
                tokio::spawn(async move {
                    let result = stage.run().await;
                    (stage, result)
                })
            })
            .collect();

        let mut stats = None;
        let mut first_error: Option<PipelineError> = None;
        for handle in handles {
            match handle.await {
                Ok((stage, result)) => {
                    if stats.is_none() {
                        stats = stage.stats();
                    }
                    if let Err(e) = result {
                        first_error.get_or_insert(e);
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(PipelineError::Stage {
                        stage: chain.clone(),
                        message: format!("stage task failed: {e}"),
                    });
                }
            }
        }

        let elapsed = start.elapsed();
        tracing::info!("Chain [{}] finished in {:?}", chain, elapsed);
        if let Some(e) = first_error {
            return Err(e.into());
        }
        Ok(RunReport {
            chain,
            stats,
            elapsed_seconds: elapsed.as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExifPipeError;
    use crate::pipeline::component::StageState;

    fn config() -> Arc<Config> {
        Arc::new(Config::default())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_registry_names() {
        let registry = Registry::builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["dbquery", "dbstore", "filter", "input", "output"]);
        assert!(registry.contains("input"));
        assert!(registry.create("nope").is_none());
    }

    #[test]
    fn test_unknown_stage_fails_fast() {
        let err = Chain::assemble(
            "default",
            &names(&["input", "ouput"]),
            &Registry::builtin(),
            config(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExifPipeError::Config(ConfigError::UnknownStage { ref name, .. }) if name == "ouput"
        ));
    }

    #[test]
    fn test_source_in_the_middle_is_rejected() {
        let err = Chain::assemble(
            "bad",
            &names(&["filter", "input"]),
            &Registry::builtin(),
            config(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExifPipeError::Config(ConfigError::InputNotAccepted(_))
        ));
    }

    #[test]
    fn test_consumer_first_is_rejected() {
        let err = Chain::assemble("bad", &names(&["output"]), &Registry::builtin(), config())
            .unwrap_err();
        assert!(matches!(
            err,
            ExifPipeError::Config(ConfigError::MissingInput(_))
        ));
    }

    #[test]
    fn test_unknown_chain() {
        let err = Chain::from_config("missing", &Registry::builtin(), config()).unwrap_err();
        assert!(matches!(
            err,
            ExifPipeError::Config(ConfigError::UnknownChain(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_is_doubly_traversable() {
        let chain = Chain::assemble(
            "scan",
            &names(&["input", "filter", "output"]),
            &Registry::builtin(),
            config(),
        )
        .unwrap();
        assert_eq!(chain.len(), 3);
        let forward: Vec<_> = chain.stages().map(Stage::name).collect();
        let backward: Vec<_> = chain.stages().rev().map(Stage::name).collect();
        assert_eq!(forward, vec!["input", "filter", "output"]);
        assert_eq!(backward, vec!["output", "filter", "input"]);
        assert_eq!(chain.upstream_of(1).map(Stage::name), Some("input"));
        assert_eq!(chain.downstream_of(1).map(Stage::name), Some("output"));
        assert!(chain.upstream_of(0).is_none());
        assert!(chain
            .stages()
            .all(|s| s.state() == StageState::Initialized));
    }
}
