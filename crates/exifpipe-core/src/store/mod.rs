//! Document store boundary for the persistence stages.
//!
//! Documents are flat JSON objects keyed by the record's dedup key. The
//! store's replace-or-insert is atomic per key, so concurrent writers never
//! need locking above this layer.

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

use serde_json::{json, Map, Value};

use crate::error::StoreError;
use crate::types::{Record, TagValue};

/// A stored document.
pub type Document = Map<String, Value>;

/// Document field holding the source file path.
pub const SOURCE_FIELD: &str = "SourceFile";

/// Document field holding the GeoJSON point built from GPS tags.
pub const LOCATION_FIELD: &str = "Location";

/// What a replace-or-insert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Persistence collaborator.
pub trait DocumentStore: Send + Sync {
    /// Replace the document stored under `key`, inserting it if absent.
    fn replace_upsert(&self, key: &str, doc: &Document) -> Result<UpsertOutcome, StoreError>;

    /// All documents, ordered by key, projected to `fields` (all fields
    /// when empty).
    fn find(&self, fields: &[String]) -> Result<Vec<Document>, StoreError>;

    /// Remove every document.
    fn drop_all(&self) -> Result<(), StoreError>;
}

/// Keep only the listed fields; an empty list keeps everything.
pub fn project(doc: &Document, fields: &[String]) -> Document {
    if fields.is_empty() {
        return doc.clone();
    }
    fields
        .iter()
        .filter_map(|f| doc.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}

/// Build the stored form of a record: its tags, the source path, and a
/// GeoJSON `Location` when both GPS coordinates are numeric.
pub fn record_document(record: &Record) -> Result<Document, StoreError> {
    let mut doc = match serde_json::to_value(&record.tags)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    doc.insert(
        SOURCE_FIELD.to_string(),
        Value::String(record.path.display().to_string()),
    );

    let lat = record.get("GPSLatitude").and_then(|v| v.as_f64());
    let lon = record.get("GPSLongitude").and_then(|v| v.as_f64());
    if let (Some(lat), Some(lon)) = (lat, lon) {
        doc.insert(
            LOCATION_FIELD.to_string(),
            json!({ "type": "Point", "coordinates": [lon, lat] }),
        );
    }
    Ok(doc)
}

/// Turn a stored document back into a record.
///
/// The path comes from `SourceFile`; fields that are not scalar tag values
/// (such as the GeoJSON location) are left out.
pub fn document_record(doc: &Document) -> Record {
    let path = doc
        .get(SOURCE_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut record = Record::new(path);
    for (name, value) in doc {
        if let Ok(tag) = serde_json::from_value::<TagValue>(value.clone()) {
            record.tags.insert(name.clone(), tag);
        }
    }
    record
}
