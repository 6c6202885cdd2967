//! Persistence stage: upsert every record by its dedup key.

use async_trait::async_trait;
use std::sync::Arc;

use super::init_error;
use crate::config::Config;
use crate::error::{ConfigError, PipelineError, PipelineResult, StoreError};
use crate::metadata::dedup_key;
use crate::pipeline::{PipelineComponent, Ports, Receiver, Sender};
use crate::store::{record_document, DirStore, DocumentStore, UpsertOutcome};
use crate::types::Record;

const NAME: &str = "dbstore";

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    inserted: usize,
    replaced: usize,
    failed: usize,
}

/// Writes each record to the document store after forwarding its batch.
///
/// Store failures are logged per record and never stop the run.
#[derive(Default)]
pub struct DbStoreStage {
    ports: Ports,
    store: Option<Arc<dyn DocumentStore>>,
    drop_first: bool,
}

impl DbStoreStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist into `store` instead of the configured directory.
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }
}

fn upsert(store: &dyn DocumentStore, record: &Record) -> Result<UpsertOutcome, StoreError> {
    let key = match record.dedup_key() {
        Some(key) => key.to_string(),
        None => dedup_key(&record.tags),
    };
    store.replace_upsert(&key, &record_document(record)?)
}

fn persist(store: &dyn DocumentStore, records: &[Record]) -> Tally {
    let mut tally = Tally::default();
    for record in records {
        match upsert(store, record) {
            Ok(UpsertOutcome::Inserted) => tally.inserted += 1,
            Ok(UpsertOutcome::Replaced) => tally.replaced += 1,
            Err(e) => {
                tracing::error!("Failed to store {}: {}", record.label(), e);
                tally.failed += 1;
            }
        }
    }
    tally
}

#[async_trait]
impl PipelineComponent for DbStoreStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, config: Arc<Config>) -> Result<(), ConfigError> {
        if self.store.is_none() {
            let store = DirStore::open(config.store_dir()).map_err(|e| init_error(NAME, e))?;
            tracing::debug!("Document store at {:?}", store.dir());
            self.store = Some(Arc::new(store));
        }
        self.drop_first = config.store.drop_first;
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
        let store = self.store.clone().ok_or_else(|| PipelineError::Stage {
            stage: NAME.to_string(),
            message: "not initialized".to_string(),
        })?;

        if self.drop_first {
            let target = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || target.drop_all()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Failed to clear document store: {}", e),
                Err(e) => tracing::error!("Store task failed: {}", e),
            }
        }

        let mut total = Tally::default();
        while let Some(batch) = self.ports.next_batch().await {
            let target = Arc::clone(&store);
            let task =
                tokio::task::spawn_blocking(move || persist(target.as_ref(), &batch.records));
            match task.await {
                Ok(tally) => {
                    total.inserted += tally.inserted;
                    total.replaced += tally.replaced;
                    total.failed += tally.failed;
                }
                Err(e) => tracing::error!("Store task failed: {}", e),
            }
        }

        tracing::info!(
            "Stored {} new and {} replaced document(s), {} failed",
            total.inserted,
            total.replaced,
            total.failed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{collect, feed, sink};
    use crate::store::MemoryStore;
    use crate::types::DEDUP_KEY_TAG;
    use serde_json::json;

    fn keyed(key: &str, make: &str) -> Record {
        Record::new(format!("/p/{make}.jpg"))
            .with_tag("Make", make)
            .with_tag(DEDUP_KEY_TAG, key)
    }

    #[tokio::test]
    async fn test_same_key_keeps_last_write() {
        let store = Arc::new(MemoryStore::new());
        let mut stage = DbStoreStage::with_store(store.clone());
        stage
            .set_input(feed(vec![vec![keyed("k1", "Canon")], vec![keyed("k1", "Nikon")]]).await)
            .unwrap();
        let (tx, rx) = sink();
        stage.set_output(tx);
        stage.init(Arc::new(Config::default())).unwrap();
        stage.run().await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k1").unwrap()["Make"], json!("Nikon"));
        let (forwarded, ended) = collect(rx).await;
        assert!(ended);
        assert_eq!(forwarded.len(), 2);
    }

    #[tokio::test]
    async fn test_store_errors_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.path = dir.path().to_path_buf();
        config.store.drop_first = true;
        std::fs::write(dir.path().join("old.json"), "{}").unwrap();

        let mut stage = DbStoreStage::new();
        stage
            .set_input(feed(vec![vec![keyed("bad/key", "Canon"), keyed("good", "Nikon")]]).await)
            .unwrap();
        stage.init(Arc::new(config)).unwrap();
        stage.run().await.unwrap();

        assert!(!dir.path().join("old.json").exists());
        assert!(dir.path().join("good.json").exists());
    }

    #[test]
    fn test_missing_key_is_computed() {
        let store = MemoryStore::new();
        let record = Record::new("/p/a.jpg").with_tag("FileName", "a.jpg");
        persist(&store, &[record.clone()]);
        assert!(store.get(&dedup_key(&record.tags)).is_some());
    }
}
