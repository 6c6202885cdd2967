//! Source stage that replays stored documents as records.

use async_trait::async_trait;
use std::sync::Arc;

use super::init_error;
use crate::config::Config;
use crate::error::{ConfigError, PipelineError, PipelineResult};
use crate::expr::FieldExpr;
use crate::output::OutputFormat;
use crate::pipeline::{Batch, PipelineComponent, Ports, Receiver, Sender};
use crate::store::{document_record, DirStore, DocumentStore, SOURCE_FIELD};

const NAME: &str = "dbquery";

/// Reads every stored document, projected to the output columns, and emits
/// them as one batch followed by end-of-stream.
#[derive(Default)]
pub struct DbQueryStage {
    ports: Ports,
    store: Option<Arc<dyn DocumentStore>>,
    fields: Vec<String>,
}

impl DbQueryStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query `store` instead of the configured directory.
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }
}

/// Fields to fetch: the plain tag columns (plus the sort column) for CSV
/// output, or every field when a filter, an expression or template column,
/// or a whole-record format needs arbitrary tags.
fn projection(config: &Config) -> Vec<String> {
    let output = &config.output;
    let has_filter = output.filter.as_deref().is_some_and(|f| !f.trim().is_empty())
        || !config.filter.expr.trim().is_empty();
    if has_filter || OutputFormat::parse(&output.format) != Some(OutputFormat::Csv) {
        return vec![];
    }

    let mut fields = vec![SOURCE_FIELD.to_string()];
    let columns = output.columns();
    let columns = columns.iter().chain(output.sort.iter());
    for column in columns {
        match FieldExpr::parse(column.trim()) {
            FieldExpr::Tag(name) => {
                if !fields.contains(&name) {
                    fields.push(name);
                }
            }
            _ => return vec![],
        }
    }
    fields
}

#[async_trait]
impl PipelineComponent for DbQueryStage {
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
        if self.store.is_none() {
            let store = DirStore::open(config.store_dir()).map_err(|e| init_error(NAME, e))?;
            self.store = Some(Arc::new(store));
        }
        self.fields = projection(&config);
        Ok(())
    }

    fn set_input(&mut self, _input: Receiver) -> Result<(), ConfigError> {
        Err(ConfigError::InputNotAccepted(NAME.to_string()))
    }

    fn set_output(&mut self, output: Sender) {
        self.ports.set_output(output);
    }

    async fn run(&mut self) -> PipelineResult<()> {
        let store = self.store.clone().ok_or_else(|| PipelineError::Stage {
            stage: NAME.to_string(),
            message: "not initialized".to_string(),
        })?;
        let fields = self.fields.clone();

        let found = tokio::task::spawn_blocking(move || store.find(&fields))
            .await
            .map_err(|e| PipelineError::Stage {
                stage: NAME.to_string(),
                message: e.to_string(),
            })?;

        let batch = match found {
            Ok(docs) => {
                tracing::info!("Query returned {} document(s)", docs.len());
                Batch::new(docs.iter().map(document_record).collect())
            }
            Err(e) => {
                tracing::error!("Document query failed: {}", e);
                Batch {
                    records: vec![],
                    error: Some(e.to_string()),
                }
            }
        };
        self.ports.send(batch).await;
        self.ports.finish().await;
        Ok(())
    }
}
