//! Core data types flowing through the exifpipe pipeline.
//!
//! A [`Record`] is one file's normalized tag map. Tag values are a closed
//! set of scalar variants ([`TagValue`]) with explicit coercions instead of
//! runtime type inspection.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the tag that carries the deduplication key.
pub const DEDUP_KEY_TAG: &str = "Key";

/// Display format for timestamps. Parses back through the normalizer's
/// fractional-seconds-with-offset pattern.
pub const TIMESTAMP_DISPLAY_FORMAT: &str = "%Y:%m:%d %H:%M:%S%.f%:z";

/// A single typed tag value.
///
/// Serialized untagged so JSON output shows plain values. Variant order
/// matters for deserialization: integers are tried before floats, and
/// timestamps before plain strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<FixedOffset>),
    String(String),
}

impl TagValue {
    /// Convert a float, narrowing to an integer when the fractional part is zero.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite()
            && value.fract() == 0.0
            && value >= i64::MIN as f64
            && value < i64::MAX as f64
        {
            TagValue::Int(value as i64)
        } else {
            TagValue::Float(value)
        }
    }

    /// The zero timestamp substituted for unparseable dates.
    pub fn zero_timestamp() -> Self {
        TagValue::Timestamp(DateTime::<Utc>::default().into())
    }

    /// Name of the value's type, as reported by the `keys` output mode.
    ///
    /// Integers report the narrowest width that holds them.
    pub fn type_name(&self) -> &'static str {
        match self {
            TagValue::Bool(_) => "bool",
            TagValue::Int(i) if (0..=i64::from(u16::MAX)).contains(i) => "uint16",
            TagValue::Int(i) if i32::try_from(*i).is_ok() => "int32",
            TagValue::Int(_) => "int64",
            TagValue::Float(_) => "float64",
            TagValue::Timestamp(_) => "timestamp",
            TagValue::String(_) => "string",
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(i) => Some(*i as f64),
            TagValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty_string(&self) -> bool {
        matches!(self, TagValue::String(s) if s.is_empty())
    }

    /// Compare two values of the same native kind.
    ///
    /// Strings compare lexicographically, numbers by magnitude (integers and
    /// floats are mutually comparable), timestamps chronologically. Returns
    /// `None` for mixed or incomparable kinds.
    pub fn compare(&self, other: &TagValue) -> Option<Ordering> {
        match (self, other) {
            (TagValue::String(a), TagValue::String(b)) => Some(a.cmp(b)),
            (TagValue::Int(a), TagValue::Int(b)) => Some(a.cmp(b)),
            (TagValue::Bool(a), TagValue::Bool(b)) => Some(a.cmp(b)),
            (TagValue::Timestamp(a), TagValue::Timestamp(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{b}"),
            TagValue::Int(i) => write!(f, "{i}"),
            TagValue::Float(x) => write!(f, "{x}"),
            TagValue::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_DISPLAY_FORMAT)),
            TagValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::String(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::String(s)
    }
}

impl From<i64> for TagValue {
    fn from(i: i64) -> Self {
        TagValue::Int(i)
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Bool(b)
    }
}

/// One file's normalized metadata.
///
/// Tag names are unique; the map may be empty. Records are immutable once
/// they leave the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Source file the tags were read from
    pub path: PathBuf,

    /// Tag name to typed value
    pub tags: BTreeMap<String, TagValue>,
}

impl Record {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tags: BTreeMap::new(),
        }
    }

    /// Builder-style insert, mostly useful in tests and fixtures.
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.tags.get(name)
    }

    /// The deduplication key, if the normalizer computed one.
    pub fn dedup_key(&self) -> Option<&str> {
        self.tags.get(DEDUP_KEY_TAG).and_then(TagValue::as_str)
    }

    /// Human-readable label for log lines: the `FileName` tag or the path.
    pub fn label(&self) -> String {
        match self.tags.get("FileName") {
            Some(name) => name.to_string(),
            None => self.path.display().to_string(),
        }
    }
}

/// Counters reported by the ingestion scheduler at end of run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Files that matched the extension/MIME filters
    pub files_seen: usize,

    /// Files normalized into a record
    pub succeeded: usize,

    /// Files the extractor failed on
    pub failed: usize,

    /// Worker count actually used
    pub workers: usize,

    /// Wall-clock time for the scan in seconds
    pub elapsed_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f64_narrows_integral_values() {
        assert_eq!(TagValue::from_f64(100.0), TagValue::Int(100));
        assert_eq!(TagValue::from_f64(-3.0), TagValue::Int(-3));
        assert_eq!(TagValue::from_f64(2.8), TagValue::Float(2.8));
        assert!(matches!(TagValue::from_f64(f64::NAN), TagValue::Float(_)));
        assert!(matches!(TagValue::from_f64(1e20), TagValue::Float(_)));
    }

    #[test]
    fn test_integer_type_names_report_narrowest_width() {
        assert_eq!(TagValue::Int(400).type_name(), "uint16");
        assert_eq!(TagValue::Int(65_536).type_name(), "int32");
        assert_eq!(TagValue::Int(-1).type_name(), "int32");
        assert_eq!(TagValue::Int(5_000_000_000).type_name(), "int64");
    }

    #[test]
    fn test_compare_mixed_numeric_and_incomparable() {
        let a = TagValue::Int(2);
        let b = TagValue::Float(2.5);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(TagValue::from("a").compare(&TagValue::Int(1)), None);
    }

    #[test]
    fn test_untagged_serde_keeps_plain_values() {
        let record = Record::new("/photos/a.jpg")
            .with_tag("Make", "Canon")
            .with_tag("ISO", 400i64)
            .with_tag("Flash", true);
        let json = serde_json::to_string(&record.tags).unwrap();
        assert_eq!(json, r#"{"Flash":true,"ISO":400,"Make":"Canon"}"#);

        let parsed: BTreeMap<String, TagValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("ISO"), Some(&TagValue::Int(400)));
    }

    #[test]
    fn test_timestamp_deserializes_before_string() {
        let json = r#"{"DateTimeOriginal":"2020-01-01T10:00:00+00:00","Make":"Canon"}"#;
        let parsed: BTreeMap<String, TagValue> = serde_json::from_str(json).unwrap();
        assert!(matches!(
            parsed.get("DateTimeOriginal"),
            Some(TagValue::Timestamp(_))
        ));
        assert_eq!(parsed.get("Make"), Some(&TagValue::from("Canon")));
    }

    #[test]
    fn test_record_label_prefers_file_name() {
        let record = Record::new("/x/y/z.jpg");
        assert_eq!(record.label(), "/x/y/z.jpg");
        let record = record.with_tag("FileName", "z.jpg");
        assert_eq!(record.label(), "z.jpg");
    }
}
