//! Output rendering for CSV, JSON Lines and key summaries.
//!
//! Rendering is split from writing so that a sorted run can buffer rendered
//! rows, sort them once at end-of-stream, and only then write them out.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::expr::{FieldExpr, MissingTag};
use crate::types::{Record, TagValue};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One row per record over the configured columns
    Csv,
    /// One JSON object per line holding the whole tag map
    Json,
    /// Tag names seen across all records, with counts and value types
    Keys,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "jsonl" => Some(Self::Json),
            "keys" => Some(Self::Keys),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Keys => "keys",
        }
    }
}

/// Give an extension-less output path the format's name as extension.
pub fn resolve_output_path(path: &Path, format: OutputFormat) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(format.as_str())
    }
}

/// One rendered record, ready to write.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Row(Vec<String>),
    Line(String),
}

/// Turns records into CSV rows or JSON lines.
#[derive(Debug, Clone)]
pub struct Renderer {
    format: OutputFormat,
    columns: Vec<FieldExpr>,
    missing: MissingTag,
}

impl Renderer {
    pub fn new(format: OutputFormat, cols: &[String], missing: MissingTag) -> Self {
        Self {
            format,
            columns: cols.iter().map(|c| FieldExpr::parse(c)).collect(),
            missing,
        }
    }

    pub fn render(&self, record: &Record) -> io::Result<Rendered> {
        match self.format {
            OutputFormat::Json => serde_json::to_string(&record.tags)
                .map(Rendered::Line)
                .map_err(io::Error::other),
            _ => Ok(Rendered::Row(
                self.columns
                    .iter()
                    .map(|c| c.render(record, self.missing))
                    .collect(),
            )),
        }
    }
}

/// A writer for rendered rows.
///
/// CSV rows go through the `csv` crate for quoting; JSON lines are written
/// as-is, one per line.
pub struct OutputWriter<W: Write> {
    sink: Sink<W>,
    items_written: usize,
}

enum Sink<W: Write> {
    Csv(csv::Writer<W>),
    Lines(W),
}

impl<W: Write> OutputWriter<W> {
    /// CSV writer that emits `header` first.
    pub fn csv(writer: W, header: &[String]) -> io::Result<Self> {
        let mut csv = csv::WriterBuilder::new()
            .flexible(false)
            .from_writer(writer);
        csv.write_record(header).map_err(io::Error::other)?;
        Ok(Self {
            sink: Sink::Csv(csv),
            items_written: 0,
        })
    }

    /// Line-oriented writer for JSON Lines.
    pub fn lines(writer: W) -> Self {
        Self {
            sink: Sink::Lines(writer),
            items_written: 0,
        }
    }

    pub fn write(&mut self, item: &Rendered) -> io::Result<()> {
        match (&mut self.sink, item) {
            (Sink::Csv(csv), Rendered::Row(fields)) => {
                csv.write_record(fields).map_err(io::Error::other)?
            }
            (Sink::Csv(csv), Rendered::Line(line)) => {
                csv.write_record([line]).map_err(io::Error::other)?
            }
            (Sink::Lines(w), Rendered::Line(line)) => writeln!(w, "{line}")?,
            (Sink::Lines(w), Rendered::Row(fields)) => writeln!(w, "{}", fields.join(","))?,
        }
        self.items_written += 1;
        Ok(())
    }

    /// Get the number of items written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Csv(csv) => csv.flush(),
            Sink::Lines(w) => w.flush(),
        }
    }
}

/// Tag occurrence counts and observed types for the `keys` format.
#[derive(Debug, Clone, Default)]
pub struct KeySummary {
    tags: BTreeMap<String, (usize, BTreeSet<&'static str>)>,
}

impl KeySummary {
    pub fn observe(&mut self, record: &Record) {
        for (name, value) in &record.tags {
            let entry = self.tags.entry(name.clone()).or_default();
            entry.0 += 1;
            entry.1.insert(value.type_name());
        }
    }

    pub fn header() -> Vec<String> {
        vec!["Tag".to_string(), "Count".to_string(), "Type".to_string()]
    }

    /// One `Tag,Count,Type` row per tag, sorted by tag name.
    pub fn rows(&self) -> Vec<Rendered> {
        self.tags
            .iter()
            .map(|(name, (count, types))| {
                Rendered::Row(vec![
                    name.clone(),
                    count.to_string(),
                    types.iter().copied().collect::<Vec<_>>().join("|"),
                ])
            })
            .collect()
    }
}

/// Broad value kinds that order meaningfully against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortKind {
    Bool,
    Number,
    Timestamp,
    String,
}

impl SortKind {
    fn of(value: &TagValue) -> Self {
        match value {
            TagValue::Bool(_) => SortKind::Bool,
            TagValue::Int(_) | TagValue::Float(_) => SortKind::Number,
            TagValue::Timestamp(_) => SortKind::Timestamp,
            TagValue::String(_) => SortKind::String,
        }
    }
}

/// Order two values of the same kind. Floats use the IEEE total order.
fn compare_same_kind(a: &TagValue, b: &TagValue) -> Ordering {
    match (a, b) {
        (TagValue::Int(x), TagValue::Int(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.compare(b).unwrap_or(Ordering::Equal),
        },
    }
}

/// The kind most values share; ties go to the kind seen first.
fn dominant_kind<'a>(values: impl Iterator<Item = Option<&'a TagValue>>) -> Option<SortKind> {
    let mut seen: BTreeMap<SortKind, (usize, usize)> = BTreeMap::new();
    for (index, value) in values.enumerate() {
        if let Some(value) = value {
            seen.entry(SortKind::of(value)).or_insert((0, index)).0 += 1;
        }
    }
    seen.into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(kind, _)| kind)
}

/// Stable sort on the sort column's native values.
///
/// Values of the column's dominant kind come first, in ascending order or
/// descending when `reverse` is set. Values of any other kind follow in
/// arrival order, and rows without the column come last.
pub fn sort_by_value<T>(
    mut items: Vec<T>,
    value: impl Fn(&T) -> Option<&TagValue>,
    reverse: bool,
) -> Vec<T> {
    let Some(kind) = dominant_kind(items.iter().map(&value)) else {
        return items;
    };
    let rank = |v: Option<&TagValue>| match v {
        Some(v) if SortKind::of(v) == kind => 0,
        Some(_) => 1,
        None => 2,
    };
    items.sort_by(|a, b| {
        let (a, b) = (value(a), value(b));
        rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
            (Some(x), Some(y)) if rank(a) == 0 => {
                let order = compare_same_kind(x, y);
                if reverse {
                    order.reverse()
                } else {
                    order
                }
            }
            _ => Ordering::Equal,
        })
    });
    items
}

/// A cloneable in-memory sink, handy for capturing output in tests or when
/// embedding the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::other("output buffer lock poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
