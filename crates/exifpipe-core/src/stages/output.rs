//! Projection stage: renders records to CSV, JSON Lines or a key summary.

use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use super::init_error;
use crate::config::Config;
use crate::error::{ConfigError, PipelineError, PipelineResult};
use crate::expr::{Expression, FieldExpr, MissingTag};
use crate::output::{
    resolve_output_path, sort_by_value, KeySummary, OutputFormat, OutputWriter,
    Rendered, Renderer,
};
use crate::pipeline::{PipelineComponent, Ports, Receiver, Sender};
use crate::types::TagValue;

const NAME: &str = "output";

type Sink = Box<dyn Write + Send>;

struct Settings {
    format: OutputFormat,
    header: Vec<String>,
    renderer: Renderer,
    sort: Option<FieldExpr>,
    reverse: bool,
    filter: Option<Expression>,
    missing: MissingTag,
    destination: Option<PathBuf>,
}

/// Renders every record it sees, after forwarding the batch downstream.
///
/// With `output.sort` set, rendered rows are buffered with their sort value
/// and written once, after end-of-stream.
#[derive(Default)]
pub struct OutputStage {
    ports: Ports,
    settings: Option<Settings>,
    sink: Option<Sink>,
}

impl OutputStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write to `sink` instead of the configured path or stdout.
    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            ..Self::default()
        }
    }

    fn open_sink(&mut self, destination: Option<&PathBuf>) -> io::Result<Sink> {
        if let Some(sink) = self.sink.take() {
            return Ok(sink);
        }
        match destination {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                tracing::info!("Writing output to {:?}", path);
                Ok(Box::new(BufWriter::new(File::create(path)?)))
            }
            None => Ok(Box::new(io::stdout())),
        }
    }
}

fn output_error(e: io::Error) -> PipelineError {
    PipelineError::Output(e.to_string())
}

#[async_trait]
impl PipelineComponent for OutputStage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, config: Arc<Config>) -> Result<(), ConfigError> {
        let output = &config.output;
        let format = OutputFormat::parse(&output.format)
            .ok_or_else(|| init_error(NAME, format!("unknown format [{}]", output.format)))?;
        let missing = MissingTag::from_config(&output.missing_tag);

        let filter = match output.filter.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => {
                Some(Expression::compile(source).map_err(|e| init_error(NAME, e))?)
            }
            _ => None,
        };
        let sort = output
            .sort
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(FieldExpr::parse);

        let cols = output.columns();
        self.settings = Some(Settings {
            format,
            renderer: Renderer::new(format, &cols, missing),
            header: cols,
            sort,
            reverse: output.reverse,
            filter,
            missing,
            destination: config
                .output_path()
                .map(|path| resolve_output_path(&path, format)),
        });
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
        let settings = self.settings.take().ok_or_else(|| PipelineError::Stage {
            stage: NAME.to_string(),
            message: "not initialized".to_string(),
        })?;
        let sink = self
            .open_sink(settings.destination.as_ref())
            .map_err(output_error)?;
        let mut writer = match settings.format {
            OutputFormat::Csv => OutputWriter::csv(sink, &settings.header),
            OutputFormat::Keys => OutputWriter::csv(sink, &KeySummary::header()),
            OutputFormat::Json => Ok(OutputWriter::lines(sink)),
        }
        .map_err(output_error)?;

        let mut buffer: Vec<(Option<TagValue>, Rendered)> = Vec::new();
        let mut keys = KeySummary::default();

        while let Some(batch) = self.ports.next_batch().await {
            for record in &batch.records {
                if let Some(filter) = &settings.filter {
                    if !filter.matches(record) {
                        continue;
                    }
                }
                if settings.format == OutputFormat::Keys {
                    keys.observe(record);
                    continue;
                }

                let rendered = settings.renderer.render(record).map_err(output_error)?;
                match &settings.sort {
                    Some(column) => {
                        buffer.push((column.resolve(record, settings.missing), rendered))
                    }
                    None => writer.write(&rendered).map_err(output_error)?,
                }
            }
        }

        if settings.sort.is_some() {
            let sorted = sort_by_value(
                buffer,
                |(value, _): &(Option<TagValue>, Rendered)| value.as_ref(),
                settings.reverse,
            );
            for (_, rendered) in &sorted {
                writer.write(rendered).map_err(output_error)?;
            }
        }
        if settings.format == OutputFormat::Keys {
            for row in keys.rows() {
                writer.write(&row).map_err(output_error)?;
            }
        }
        writer.flush().map_err(output_error)?;

        tracing::info!(
            "Wrote {} {} row(s)",
            writer.items_written(),
            settings.format.as_str()
        );
        Ok(())
    }
}
