//! Raw tag map to typed record.
//!
//! Steps run in a fixed order: rename, allow-list, value coercion
//! (including sub-second date merging), remove-list, dedup key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use super::datetime::{parse_timestamp, Timezone};
use super::key::dedup_key;
use super::{RawTags, RawValue};
use crate::config::{Config, NormalizeConfig};
use crate::error::ConfigError;
use crate::pattern::wildcard_match;
use crate::types::{Record, TagValue, DEDUP_KEY_TAG};

/// Prefix extractors use in place of binary payloads.
pub const BINARY_MARKER: &str = "(Binary data";

/// Suffix appended to a rational tag's name for its float companion.
pub const RATIONAL_SUFFIX: &str = ".v";

const SERIAL_NUMBER_TAG: &str = "SerialNumber";
const UNIT_SUFFIXES: &[&str] = &[" mm", " m"];

/// A normalized record plus the coercion problems met along the way.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: Record,
    pub warnings: Vec<String>,
}

/// Applies the configured normalization rules. Immutable and shareable
/// across workers.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rename: HashMap<String, String>,
    subsec_date: HashMap<String, String>,
    allow: HashSet<String>,
    remove: Vec<String>,
    zone: Timezone,
}

impl Normalizer {
    pub fn new(rules: &NormalizeConfig, zone: Timezone) -> Self {
        Self {
            rename: rules.rename.clone(),
            subsec_date: rules.subsec_date.clone(),
            allow: rules.allow.iter().cloned().collect(),
            remove: rules.remove.clone(),
            zone,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(&config.normalize, config.input.zone()?))
    }

    /// Normalize one file's raw tags into a record.
    pub fn normalize(&self, path: &Path, raw: RawTags) -> Normalized {
        let mut warnings = Vec::new();

        let mut tags = self.rename(raw);
        if !self.allow.is_empty() {
            tags.retain(|name, _| self.allow.contains(name));
        }
        let mut tags = self.coerce(tags, &mut warnings);
        if !self.remove.is_empty() {
            tags.retain(|name, _| !self.remove.iter().any(|p| wildcard_match(p, name)));
        }
        let key = dedup_key(&tags);
        tags.insert(DEDUP_KEY_TAG.to_string(), TagValue::String(key));

        for warning in &warnings {
            tracing::warn!("{}: {}", path.display(), warning);
        }

        Normalized {
            record: Record {
                path: path.to_path_buf(),
                tags,
            },
            warnings,
        }
    }

    /// Renamed tags never displace a tag already present under the target.
    fn rename(&self, raw: RawTags) -> RawTags {
        let mut kept = RawTags::new();
        let mut renamed = Vec::new();
        for (name, value) in raw {
            match self.rename.get(&name) {
                Some(target) if target.is_empty() => {}
                Some(target) => renamed.push((target.clone(), value)),
                None => {
                    kept.insert(name, value);
                }
            }
        }
        for (target, value) in renamed {
            kept.entry(target).or_insert(value);
        }
        kept
    }

    fn coerce(&self, raw: RawTags, warnings: &mut Vec<String>) -> BTreeMap<String, TagValue> {
        let mut out = BTreeMap::new();
        let mut merged = Vec::new();

        for (name, value) in raw {
            let text = match value {
                RawValue::Bool(b) => {
                    out.insert(name, TagValue::Bool(b));
                    continue;
                }
                RawValue::Number(n) if name == SERIAL_NUMBER_TAG => {
                    out.insert(name, TagValue::String(TagValue::from_f64(n).to_string()));
                    continue;
                }
                RawValue::Number(n) => {
                    out.insert(name, TagValue::from_f64(n));
                    continue;
                }
                RawValue::Text(s) => s,
            };

            let text = text.trim();
            if text.is_empty() || text.starts_with(BINARY_MARKER) {
                continue;
            }

            if let Some(target) = self.subsec_date.get(&name) {
                match parse_timestamp(text, &self.zone) {
                    Some(ts) => merged.push((target.clone(), TagValue::Timestamp(ts))),
                    None => {
                        warnings.push(format!(
                            "{name}: [{text}] is not a timestamp, using zero time"
                        ));
                        out.insert(name, TagValue::zero_timestamp());
                    }
                }
                continue;
            }

            if name == SERIAL_NUMBER_TAG {
                out.insert(name, TagValue::String(text.to_string()));
            } else if name.contains("Date") {
                let value = match parse_timestamp(text, &self.zone) {
                    Some(ts) => TagValue::Timestamp(ts),
                    None => {
                        warnings.push(format!(
                            "{name}: [{text}] is not a timestamp, using zero time"
                        ));
                        TagValue::zero_timestamp()
                    }
                };
                out.insert(name, value);
            } else if let Some(ratio) = parse_rational(text) {
                out.insert(format!("{name}{RATIONAL_SUFFIX}"), TagValue::Float(ratio));
                out.insert(name, TagValue::String(text.to_string()));
            } else if let Some(number) = UNIT_SUFFIXES.iter().find_map(|s| text.strip_suffix(s)) {
                match number.trim().parse::<f64>() {
                    Ok(n) => {
                        out.insert(name, TagValue::from_f64(n));
                    }
                    Err(_) => {
                        warnings.push(format!("{name}: [{text}] is not a measurement"));
                        out.insert(name, TagValue::String(text.to_string()));
                    }
                }
            } else {
                out.insert(name, TagValue::String(text.to_string()));
            }
        }

        // Sub-second values are more precise than their base tag.
        for (target, value) in merged {
            out.insert(target, value);
        }
        out
    }
}

/// `n/d` with a leading digit and a non-zero denominator.
fn parse_rational(text: &str) -> Option<f64> {
    if !text.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let (num, den) = text.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den != 0.0).then(|| num / den)
}
