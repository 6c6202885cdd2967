//! Deduplication key for idempotent upserts.

use blake3::Hasher;
use std::collections::BTreeMap;

use crate::types::TagValue;

/// Identifying tags hashed into the key, in priority order.
pub const KEY_TAGS: [&str; 4] = ["ImageUniqueID", "FileName", "SerialNumber", "DateTimeOriginal"];

/// Separates fields so that ("ab", "c") and ("a", "bc") hash differently.
const FIELD_SEPARATOR: &[u8] = b"\x1f";

/// BLAKE3 hex digest over the record's identifying tags.
///
/// Missing tags contribute an empty string, so the key is always defined
/// and always 64 hex characters.
pub fn dedup_key(tags: &BTreeMap<String, TagValue>) -> String {
    let mut hasher = Hasher::new();
    for (i, name) in KEY_TAGS.iter().enumerate() {
        if i > 0 {
            hasher.update(FIELD_SEPARATOR);
        }
        if let Some(value) = tags.get(*name) {
            hasher.update(value.to_string().as_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
