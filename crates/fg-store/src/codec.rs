//! Persisted JSON shapes
//!
//! Decoding is deliberately tolerant: the store has been through several
//! on-disk revisions, and a gating mechanism must fail closed rather than
//! refuse to start. A list entry may be a bare string (legacy shape,
//! active immediately) or a `{domain, activateAt}` object; anything else
//! is skipped. A payload that is not valid JSON, or not an array, decodes
//! as the empty list.

use log::warn;
use serde::Serialize;
use serde_json::Value;

use fg_core::AccessEntry;

/// Canonical serialized entry shape.
#[derive(Debug, Serialize)]
struct EntryRecord<'a> {
    domain: &'a str,
    #[serde(rename = "activateAt")]
    activate_at: u64,
}

/// Coerce a JSON value to epoch milliseconds; anything non-numeric or
/// negative is zero (active immediately).
fn coerce_at(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

fn entry_from_value(value: &Value) -> Option<AccessEntry> {
    match value {
        Value::String(s) => {
            let key = s.trim().to_lowercase();
            if key.is_empty() {
                return None;
            }
            Some(AccessEntry {
                key,
                activate_at: 0,
            })
        }
        Value::Object(map) => {
            let raw = map.get("domain").or_else(|| map.get("key"))?.as_str()?;
            let key = raw.trim().to_lowercase();
            if key.is_empty() {
                return None;
            }
            Some(AccessEntry {
                key,
                activate_at: coerce_at(map.get("activateAt")),
            })
        }
        _ => None,
    }
}

/// Decode a persisted list payload. Malformed data yields an empty list;
/// nothing is permitted by default.
pub fn decode_entries(raw: &str) -> Vec<AccessEntry> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("discarding unparsable list payload: {e}");
            return Vec::new();
        }
    };
    let Value::Array(items) = parsed else {
        warn!("discarding non-array list payload");
        return Vec::new();
    };
    items.iter().filter_map(entry_from_value).collect()
}

/// Encode entries canonically, sorted by key for stable output.
pub fn encode_entries<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a AccessEntry>,
{
    let mut records: Vec<EntryRecord<'_>> = entries
        .into_iter()
        .map(|e| EntryRecord {
            domain: &e.key,
            activate_at: e.activate_at,
        })
        .collect();
    records.sort_by(|a, b| a.domain.cmp(b.domain));
    // Serializing a Vec of string/u64 pairs cannot fail.
    serde_json::to_string(&records).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a persisted integer (delay minutes or an activation timestamp).
/// Anything unparsable is zero.
pub fn decode_u64(raw: &str) -> u64 {
    raw.trim().parse::<u64>().unwrap_or(0)
}
