//! exifpipe core - streaming metadata pipeline library.
//!
//! exifpipe extracts EXIF-style tags from batches of files, normalizes them
//! into typed records with a stable dedup key, and streams them through a
//! configurable chain of stages.
//!
//! # Architecture
//!
//! ```text
//! Discover → Extract (worker pool) → Normalize → [filter] → [dbstore] → Output
//! ```
//!
//! Stages are wired with bounded channels. Each stage forwards a batch
//! downstream before doing its own work on it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use exifpipe_core::{Chain, Config, Registry};
//!
//! #[tokio::main]
//! async fn main() -> exifpipe_core::Result<()> {
//!     let mut config = Config::load()?;
//!     config.input.roots = vec!["./photos".into()];
//!
//!     let chain = Chain::from_config("default", &Registry::builtin(), Arc::new(config))?;
//!     let report = chain.run().await?;
//!     println!("{:?}", report.stats);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod expr;
pub mod metadata;
pub mod output;
pub mod pattern;
pub mod pipeline;
pub mod stages;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::{
    ConfigError, EvalError, ExifPipeError, PipelineError, PipelineResult, Result, StoreError,
};
pub use metadata::{MetadataExtractor, Normalizer};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{Chain, PipelineComponent, Registry, RunReport};
pub use store::{DirStore, DocumentStore, MemoryStore};
pub use types::{Record, ScanStats, TagValue};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
