//! Bounded-concurrency ingestion: discover, partition, extract, normalize.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::channel::{Batch, Message, Sender};
use super::discovery::FileDiscovery;
use crate::metadata::{ExtractorFactory, Normalizer};
use crate::types::ScanStats;

/// Result of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub stats: ScanStats,

    /// Set when `exit_on_error` cut the run short
    pub aborted: Option<String>,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    aborted: AtomicBool,
    first_error: Mutex<Option<String>>,
}

impl Counters {
    fn record_failure(&self, message: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut first) = self.first_error.lock() {
            first.get_or_insert_with(|| message.to_string());
        }
    }
}

/// Spreads discovered files over a small pool of extraction workers.
///
/// Each worker owns its own extractor, extracts its whole share in one
/// batch call, and sends one message with the normalized records.
pub struct IngestScheduler {
    discovery: FileDiscovery,
    normalizer: Arc<Normalizer>,
    extractor: ExtractorFactory,
    max_workers: usize,
    exit_on_error: bool,
}

impl IngestScheduler {
    pub fn new(
        discovery: FileDiscovery,
        normalizer: Arc<Normalizer>,
        extractor: ExtractorFactory,
        max_workers: usize,
        exit_on_error: bool,
    ) -> Self {
        Self {
            discovery,
            normalizer,
            extractor,
            max_workers,
            exit_on_error,
        }
    }

    /// Worker count: the configured ceiling clamped to hardware
    /// parallelism, never below one.
    pub fn worker_count(&self) -> usize {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_workers.min(hardware).max(1)
    }

    /// Deal files round-robin into `workers` disjoint lists, preserving
    /// discovery order within each list.
    pub fn partition(files: Vec<PathBuf>, workers: usize) -> Vec<Vec<PathBuf>> {
        let workers = workers.max(1);
        let mut lists = vec![Vec::new(); workers];
        for (i, file) in files.into_iter().enumerate() {
            lists[i % workers].push(file);
        }
        lists
    }

    /// Scan `roots`, send every batch to `output`, then the end-of-stream
    /// sentinel.
    ///
    /// Sends to a closed channel are ignored: after an early sentinel the
    /// remaining workers finish but nobody listens.
    pub async fn run(&self, roots: &[PathBuf], output: &Sender) -> ScanReport {
        let start = Instant::now();

        let discovery = self.discovery.clone();
        let roots_owned = roots.to_vec();
        let files = tokio::task::spawn_blocking(move || discovery.discover_all(&roots_owned))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("File discovery task failed: {}", e);
                vec![]
            });

        let files_seen = files.len();
        let workers = self.worker_count();
        tracing::info!(
            "Found {} file(s) to scan with {} worker(s)",
            files_seen,
            workers
        );

        let counters = Arc::new(Counters::default());
        let mut handles = Vec::with_capacity(workers);
        for (worker_id, paths) in Self::partition(files, workers).into_iter().enumerate() {
            if paths.is_empty() {
                continue;
            }
            let factory = Arc::clone(&self.extractor);
            let normalizer = Arc::clone(&self.normalizer);
            let counters = Arc::clone(&counters);
            let output = output.clone();
            let exit_on_error = self.exit_on_error;

            handles.push(tokio::task::spawn_blocking(move || {
                let mut extractor = factory();
                tracing::debug!(
                    "Worker {} extracting {} file(s) with {}",
                    worker_id,
                    paths.len(),
                    extractor.name()
                );
                let results = extractor.extract_batch(&paths);

                let mut batch = Batch::default();
                for (path, result) in paths.iter().zip(results) {
                    match result {
                        Ok(raw) => {
                            batch.records.push(normalizer.normalize(path, raw).record);
                            counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::error!("Failed: {:?} - {}", path, e);
                            let message = e.to_string();
                            counters.record_failure(&message);
                            batch.error.get_or_insert(message);
                        }
                    }
                }

                let failed = batch.error.is_some();
                let _ = output.blocking_send(Message::Batch(Arc::new(batch)));
                if failed && exit_on_error && !counters.aborted.swap(true, Ordering::SeqCst) {
                    tracing::warn!("Worker {} stopping the run after first error", worker_id);
                    let _ = output.blocking_send(Message::EndOfStream);
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Ingestion worker failed: {}", e);
            }
        }

        let aborted = counters.aborted.load(Ordering::SeqCst);
        if !aborted {
            let _ = output.send(Message::EndOfStream).await;
        }

        let stats = ScanStats {
            files_seen,
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            workers,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        };
        let aborted = aborted.then(|| {
            counters
                .first_error
                .lock()
                .ok()
                .and_then(|first| first.clone())
                .unwrap_or_else(|| "extraction failed".to_string())
        });
        ScanReport { stats, aborted }
    }
}
