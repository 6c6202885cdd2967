//! Streaming pipeline engine.
//!
//! - **component**: the stage capability and lifecycle state machine
//! - **channel**: bounded message channels between stages
//! - **chain**: stage registry and chain assembly
//! - **discovery**: find input files under the configured roots
//! - **scheduler**: bounded worker pool for extraction and normalization

pub mod chain;
pub mod channel;
pub mod component;
pub mod discovery;
pub mod scheduler;

// Re-exports for convenient access
pub use chain::{Chain, Registry, RunReport, StageFactory};
pub use channel::{bounded_channel, Batch, Message, Ports, Receiver, Sender};
pub use component::{PipelineComponent, Stage, StageState};
pub use discovery::FileDiscovery;
pub use scheduler::{IngestScheduler, ScanReport};
