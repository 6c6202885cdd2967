//! In-process EXIF reading with `kamadak-exif`.

use exif::{Exif, Field, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::{file_tags, FileResult, MetadataExtractor, RawTags, RawValue};
use crate::error::PipelineError;

/// Reads the primary image's EXIF fields directly from each file.
///
/// Files in formats the reader does not understand, or without EXIF, yield
/// only the file-system tags. Only I/O failures are reported as errors.
#[derive(Debug, Default)]
pub struct NativeExtractor;

impl NativeExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract(path: &Path) -> FileResult {
        let failed = |message: String| PipelineError::Extraction {
            path: path.to_path_buf(),
            message,
        };

        let meta = std::fs::metadata(path).map_err(|e| failed(e.to_string()))?;
        let mut tags = file_tags(path, meta.len());

        let file = File::open(path).map_err(|e| failed(e.to_string()))?;
        let mut reader = BufReader::new(file);
        match Reader::new().read_from_container(&mut reader) {
            Ok(exif) => {
                for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
                    if let Some(value) = raw_value(field) {
                        tags.entry(field.tag.to_string()).or_insert(value);
                    }
                }
                Self::insert_gps(&exif, &mut tags);
                merge_subsec(&mut tags);
            }
            Err(exif::Error::Io(e)) => return Err(failed(e.to_string())),
            Err(e) => tracing::debug!("No EXIF in {}: {}", path.display(), e),
        }
        Ok(tags)
    }

    /// Replace the degree/minute/second triples with signed decimal degrees.
    fn insert_gps(exif: &Exif, tags: &mut RawTags) {
        for (coord, reference) in [
            (Tag::GPSLatitude, Tag::GPSLatitudeRef),
            (Tag::GPSLongitude, Tag::GPSLongitudeRef),
        ] {
            if let Some(degrees) = gps_coord(exif, coord, reference) {
                tags.insert(coord.to_string(), RawValue::Number(degrees));
            }
        }
    }
}

impl MetadataExtractor for NativeExtractor {
    fn name(&self) -> &'static str {
        "native"
    }

    fn extract_batch(&mut self, paths: &[PathBuf]) -> Vec<FileResult> {
        paths.iter().map(|p| Self::extract(p)).collect()
    }
}

/// Date tags and the ASCII fraction-of-second tags that refine them.
const SUBSEC_TAGS: &[(&str, &str)] = &[
    ("DateTime", "SubSecTime"),
    ("DateTimeOriginal", "SubSecTimeOriginal"),
    ("DateTimeDigitized", "SubSecTimeDigitized"),
];

/// Append each SubSecTime* fraction to its date tag, so that
/// "2020:01:01 10:00:00" with "042" becomes "2020:01:01 10:00:00.042".
fn merge_subsec(tags: &mut RawTags) {
    for (date_tag, subsec_tag) in SUBSEC_TAGS {
        let digits = match tags.get(*subsec_tag) {
            Some(RawValue::Text(s)) => s.trim().to_string(),
            Some(RawValue::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => format!("{n}"),
            _ => continue,
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Some(RawValue::Text(date)) = tags.get_mut(*date_tag) {
            if !date.contains('.') {
                date.push('.');
                date.push_str(&digits);
            }
        }
    }
}

fn raw_value(field: &Field) -> Option<RawValue> {
    let value = match &field.value {
        Value::Ascii(parts) => {
            let text = parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                .collect::<Vec<_>>()
                .join(", ");
            RawValue::Text(text)
        }
        Value::Short(v) => numbers(v.iter().map(|&x| f64::from(x))),
        Value::Long(v) => numbers(v.iter().map(|&x| f64::from(x))),
        Value::SShort(v) => numbers(v.iter().map(|&x| f64::from(x))),
        Value::SLong(v) => numbers(v.iter().map(|&x| f64::from(x))),
        Value::Float(v) => numbers(v.iter().map(|&x| f64::from(x))),
        Value::Double(v) => numbers(v.iter().copied()),
        Value::Rational(v) if v.len() == 1 => {
            rational(f64::from(v[0].num), f64::from(v[0].denom))
        }
        Value::SRational(v) if v.len() == 1 => {
            rational(f64::from(v[0].num), f64::from(v[0].denom))
        }
        Value::Rational(_) | Value::SRational(_) => {
            RawValue::Text(field.display_value().to_string())
        }
        Value::Byte(v) | Value::Undefined(v, _) => {
            RawValue::Text(format!("(Binary data {} bytes)", v.len()))
        }
        Value::SByte(v) => RawValue::Text(format!("(Binary data {} bytes)", v.len())),
        _ => return None,
    };
    Some(value)
}

/// A single number stays numeric; lists become space-separated text.
fn numbers(values: impl Iterator<Item = f64>) -> RawValue {
    let values: Vec<f64> = values.collect();
    match values.as_slice() {
        [single] => RawValue::Number(*single),
        many => RawValue::Text(
            many.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

/// Proper fractions keep their `n/d` form; everything else is a number.
fn rational(num: f64, denom: f64) -> RawValue {
    if denom == 0.0 || (num != 0.0 && num.abs() < denom.abs()) {
        RawValue::Text(format!("{num}/{denom}"))
    } else {
        RawValue::Number(num / denom)
    }
}

/// GPS coordinate in signed decimal degrees.
fn gps_coord(exif: &Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let coord = exif.get_field(coord_tag, In::PRIMARY)?;
    let degrees = match &coord.value {
        Value::Rational(r) if r.len() >= 3 => {
            r[0].to_f64() + r[1].to_f64() / 60.0 + r[2].to_f64() / 3600.0
        }
        _ => return None,
    };

    let reference = exif
        .get_field(ref_tag, In::PRIMARY)
        .map(|f| f.display_value().to_string())
        .unwrap_or_default();
    let sign = if reference.contains('S') || reference.contains('W') {
        -1.0
    } else {
        1.0
    };
    Some(sign * degrees)
}
