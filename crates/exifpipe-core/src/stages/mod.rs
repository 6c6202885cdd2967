//! Built-in pipeline stages.
//!
//! - **input**: scans the configured roots through the ingestion scheduler
//! - **filter**: drops records that fail `filter.expr`
//! - **output**: renders records as CSV, JSON Lines or a key summary
//! - **dbstore**: upserts every record into the document store
//! - **dbquery**: emits stored documents as records

mod dbquery;
mod dbstore;
mod filter;
mod input;
mod output;

pub use dbquery::DbQueryStage;
pub use dbstore::DbStoreStage;
pub use filter::FilterStage;
pub use input::InputStage;
pub use output::OutputStage;

use crate::error::ConfigError;

fn init_error(stage: &str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::StageInit {
        stage: stage.to_string(),
        message: message.to_string(),
    }
}
