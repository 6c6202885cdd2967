//! Bounded message channels between pipeline stages.
//!
//! Every stage talks to its neighbours through one bounded `mpsc` channel
//! per adjacent pair. When a buffer is full the sender waits, which gives
//! backpressure all the way up to the ingestion workers.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::PipelineConfig;
use crate::types::Record;

/// A group of records emitted together, usually by one ingestion worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub records: Vec<Record>,

    /// First error the producer met while building this batch
    pub error: Option<String>,
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            error: None,
        }
    }
}

/// What flows over a stage channel.
///
/// Batches are shared behind an `Arc` so that forwarding a batch downstream
/// never copies its records.
#[derive(Debug, Clone)]
pub enum Message {
    Batch(Arc<Batch>),
    /// No more batches will follow. Always the last message on a channel.
    EndOfStream,
}

pub type Sender = mpsc::Sender<Message>;
pub type Receiver = mpsc::Receiver<Message>;

/// Create a bounded channel pair with the configured buffer size.
pub fn bounded_channel(config: &PipelineConfig) -> (Sender, Receiver) {
    mpsc::channel(config.buffer_size.max(1))
}

/// A stage's input and output ends.
#[derive(Debug, Default)]
pub struct Ports {
    input: Option<Receiver>,
    output: Option<Sender>,
}

impl Ports {
    pub fn set_input(&mut self, input: Receiver) {
        self.input = Some(input);
    }

    pub fn set_output(&mut self, output: Sender) {
        self.output = Some(output);
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Clone of the downstream sender, for producers that fan in from
    /// several tasks.
    pub fn output(&self) -> Option<Sender> {
        self.output.clone()
    }

    /// Wait for the next batch and forward it downstream before returning
    /// it, so the next stage can start while this one does its own work.
    ///
    /// Returns `None` once the upstream ends (sentinel or closed channel),
    /// after passing the sentinel on.
    pub async fn next_batch(&mut self) -> Option<Arc<Batch>> {
        match self.recv().await {
            Some(batch) => {
                self.forward(Message::Batch(Arc::clone(&batch))).await;
                Some(batch)
            }
            None => {
                self.finish().await;
                None
            }
        }
    }

    /// Wait for the next batch without forwarding it, for stages that
    /// rewrite batches. The caller sends the sentinel with [`Ports::finish`].
    pub async fn recv(&mut self) -> Option<Arc<Batch>> {
        let message = match self.input.as_mut() {
            Some(input) => input.recv().await,
            None => None,
        };
        match message {
            Some(Message::Batch(batch)) => Some(batch),
            Some(Message::EndOfStream) | None => None,
        }
    }

    /// Send a batch downstream. A closed downstream is not an error; it
    /// simply stops listening.
    pub async fn send(&mut self, batch: Batch) {
        self.forward(Message::Batch(Arc::new(batch))).await;
    }

    /// Emit the end-of-stream sentinel and release both channel ends.
    pub async fn finish(&mut self) {
        self.input = None;
        if let Some(output) = self.output.take() {
            let _ = output.send(Message::EndOfStream).await;
        }
    }

    async fn forward(&mut self, message: Message) {
        if let Some(output) = &self.output {
            if output.send(message).await.is_err() {
                tracing::debug!("Downstream closed, no longer forwarding");
                self.output = None;
            }
        }
    }
}
