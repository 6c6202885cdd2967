//! Stage that drops records failing a boolean expression.

use async_trait::async_trait;
use std::sync::Arc;

use super::init_error;
use crate::config::Config;
use crate::error::{ConfigError, PipelineResult};
use crate::expr::Expression;
use crate::pipeline::{Batch, PipelineComponent, Ports, Receiver, Sender};

const NAME: &str = "filter";

/// Forwards only the records for which `filter.expr` is truthy. An empty
/// expression passes everything.
#[derive(Debug, Default)]
pub struct FilterStage {
    ports: Ports,
    expr: Option<Expression>,
    passed: usize,
    dropped: usize,
}

impl FilterStage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineComponent for FilterStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, config: Arc<Config>) -> Result<(), ConfigError> {
        let source = config.filter.expr.trim();
        self.expr = if source.is_empty() {
            None
        } else {
            Some(Expression::compile(source).map_err(|e| init_error(NAME, e))?)
        };
        Ok(())
    }

    fn set_input(&mut self, input: Receiver) -> Result<(), ConfigError> {
        self.ports.set_input(input);
        Ok(())
    }

    fn set_output(&mut self, output: Sender) {
        self.ports.set_output(output);
    }

    async fn run(&mut self) -> PipelineResult<()> {
        while let Some(batch) = self.ports.recv().await {
            let records: Vec<_> = match &self.expr {
                Some(expr) => batch
                    .records
                    .iter()
                    .filter(|r| expr.matches(r))
                    .cloned()
                    .collect(),
                None => batch.records.clone(),
            };
            self.passed += records.len();
            self.dropped += batch.records.len() - records.len();

            if !records.is_empty() || batch.error.is_some() {
                self.ports
                    .send(Batch {
                        records,
                        error: batch.error.clone(),
                    })
                    .await;
            }
        }
        self.ports.finish().await;

        tracing::info!(
            "Filter passed {} record(s), dropped {}",
            self.passed,
            self.dropped
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{collect, feed, sink};
    use crate::types::Record;

    fn config(expr: &str) -> Arc<Config> {
        let mut config = Config::default();
        config.filter.expr = expr.to_string();
        Arc::new(config)
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new("/p/a.jpg").with_tag("Make", "Canon"),
            Record::new("/p/b.jpg"),
        ]
    }

    async fn run_filter(expr: &str) -> Vec<Record> {
        let mut stage = FilterStage::new();
        stage.set_input(feed(vec![records()]).await).unwrap();
        let (tx, rx) = sink();
        stage.set_output(tx);
        stage.init(config(expr)).unwrap();
        stage.run().await.unwrap();
        let (records, ended) = collect(rx).await;
        assert!(ended);
        records
    }

    #[tokio::test]
    async fn test_filter_passes_matching_records() {
        let passed = run_filter(r#"@Make == "Canon""#).await;
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].path, std::path::PathBuf::from("/p/a.jpg"));
    }

    #[tokio::test]
    async fn test_empty_filter_passes_everything() {
        assert_eq!(run_filter("").await.len(), 2);
    }

    #[test]
    fn test_bad_expression_fails_init() {
        let mut stage = FilterStage::new();
        let err = stage.init(config("Make ==")).unwrap_err();
        assert!(matches!(err, ConfigError::StageInit { .. }));
    }
}
