//! The `exifpipe run` command: assemble and run a configured chain.

use clap::{Args, ValueEnum};
use exifpipe_core::{Chain, Config, Registry, RunReport};
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name of the chain under [pipelines] to run
    pub chain: String,

    /// Files or directories to scan (overrides input.roots)
    pub paths: Vec<PathBuf>,

    /// Output columns: tag names, "@expression" or "%template [Tag]"
    #[arg(long, value_delimiter = ',')]
    pub cols: Vec<String>,

    /// Column to sort by (buffers all output until the end)
    #[arg(long)]
    pub sort: Option<String>,

    /// Reverse the sort order
    #[arg(long)]
    pub reverse: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only output records matching this expression
    #[arg(long)]
    pub filter: Option<String>,

    /// Upper bound on extraction workers
    #[arg(short = 'j', long)]
    pub max_workers: Option<usize>,

    /// Stop the run at the first file that fails extraction
    #[arg(long)]
    pub exit_on_error: bool,

    /// Metadata extraction backend
    #[arg(long, value_enum)]
    pub extractor: Option<Extractor>,
}

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated rows over the output columns
    Csv,
    /// One JSON object per record per line
    Json,
    /// Tag names with occurrence counts and value types
    Keys,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Keys => write!(f, "keys"),
        }
    }
}

/// Supported extraction backends.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Extractor {
    /// External `exiftool -json`
    Exiftool,
    /// Built-in EXIF reader
    Native,
}

impl std::fmt::Display for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Extractor::Exiftool => write!(f, "exiftool"),
            Extractor::Native => write!(f, "native"),
        }
    }
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if !args.paths.is_empty() {
        config.input.roots = args.paths.clone();
    }
    if !args.cols.is_empty() {
        config.output.cols = args.cols.clone();
    }
    if args.sort.is_some() {
        config.output.sort = args.sort.clone();
    }
    if args.reverse {
        config.output.reverse = true;
    }
    if let Some(format) = args.format {
        config.output.format = format.to_string();
    }
    if args.output.is_some() {
        config.output.path = args.output.clone();
    }
    if args.filter.is_some() {
        config.output.filter = args.filter.clone();
    }
    if let Some(workers) = args.max_workers {
        config.throttle.max_workers = workers;
    }
    if args.exit_on_error {
        config.input.exit_on_error = true;
    }
    if let Some(extractor) = args.extractor {
        config.input.extractor = extractor.to_string();
    }
}

/// Execute the run command.
pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;
    let config = Arc::new(config);

    let chain = Chain::from_config(&args.chain, &Registry::builtin(), config)?;
    let report = chain.run().await?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("          Summary [{}]", report.chain);
    eprintln!("  ====================================");
    if let Some(stats) = &report.stats {
        eprintln!("    Files seen:   {:>8}", stats.files_seen);
        eprintln!("    Succeeded:    {:>8}", stats.succeeded);
        if stats.failed > 0 {
            eprintln!("    Failed:       {:>8}", stats.failed);
        }
        eprintln!("    Workers:      {:>8}", stats.workers);
        eprintln!("  ------------------------------------");
    }
    eprintln!("    Duration:     {:>7.1}s", report.elapsed_seconds);
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(chain: &str) -> RunArgs {
        RunArgs {
            chain: chain.to_string(),
            paths: vec![],
            cols: vec![],
            sort: None,
            reverse: false,
            format: None,
            output: None,
            filter: None,
            max_workers: None,
            exit_on_error: false,
            extractor: None,
        }
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let mut config = Config::default();
        apply_overrides(&mut config, &args("default"));
        assert_eq!(config.output.cols, vec!["FileName"]);
        assert_eq!(config.output.format, "csv");
        assert!(config.input.roots.is_empty());
    }

    #[test]
    fn test_overrides_are_applied() {
        let mut config = Config::default();
        let mut args = args("default");
        args.paths = vec![PathBuf::from("./photos")];
        args.cols = vec!["Make".into(), "Model".into()];
        args.format = Some(OutputFormat::Keys);
        args.max_workers = Some(2);
        args.extractor = Some(Extractor::Native);
        args.exit_on_error = true;
        apply_overrides(&mut config, &args);

        assert_eq!(config.input.roots, vec![PathBuf::from("./photos")]);
        assert_eq!(config.output.cols, vec!["Make", "Model"]);
        assert_eq!(config.output.format, "keys");
        assert_eq!(config.throttle.max_workers, 2);
        assert_eq!(config.input.extractor, "native");
        assert!(config.input.exit_on_error);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_chain_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exifpipe.toml");
        std::fs::write(&path, "").unwrap();
        let err = execute(args("missing"), Some(path)).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_run_native_chain_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        std::fs::create_dir(&photos).unwrap();
        std::fs::write(photos.join("note.txt"), "no exif here").unwrap();
        let config_path = dir.path().join("exifpipe.toml");
        std::fs::write(&config_path, "").unwrap();
        let out = dir.path().join("out");

        let mut args = args("default");
        args.paths = vec![photos];
        args.extractor = Some(Extractor::Native);
        args.cols = vec!["FileName".into(), "FileSize".into()];
        args.output = Some(out);
        execute(args, Some(config_path)).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert_eq!(written, "FileName,FileSize\nnote.txt,12\n");
    }
}
