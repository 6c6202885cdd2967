//! exifpipe CLI - streaming EXIF metadata pipeline.
//!
//! exifpipe extracts metadata tags from batches of files, normalizes them
//! into typed records, and runs them through a configured chain of stages
//! (filtering, persistence, CSV/JSON projection).
//!
//! # Usage
//!
//! ```bash
//! # Print Make and Model for every photo under a directory
//! exifpipe run default ./photos --cols Make,Model
//!
//! # Store records, then query them back sorted by capture time
//! exifpipe run store ./photos
//! exifpipe run query --cols FileName,DateTimeOriginal --sort DateTimeOriginal
//!
//! # View configuration
//! exifpipe config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// exifpipe - extract, normalize, store and project file metadata.
#[derive(Parser, Debug)]
#[command(name = "exifpipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "EXIFPIPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a configured pipeline chain
    Run(cli::run::RunArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),

    /// List the registered stage names
    Stages,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    // Commands reload the config strictly and fail on errors.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default logging settings. \
                 Check your config file with `exifpipe config path`."
            );
            exifpipe_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("exifpipe v{}", exifpipe_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, cli.config).await,
        Commands::Config(args) => cli::config::execute(args, cli.config).await,
        Commands::Stages => cli::stages::execute(),
    }
}
