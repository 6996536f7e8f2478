use crate::foundation::Hash32;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deterministic digest of structured data: keys sorted recursively, the
/// result serialized to compact JSON, hashed with a single SHA-256.
///
/// Byte-identical across processes regardless of map insertion order. Any
/// remote signature over structured data is computed against this digest,
/// so the canonical form must never change.
pub fn canonical_digest(value: &Value) -> Hash32 {
    let canonical = canonicalize(value);
    let encoded = canonical.to_string();
    let digest = Sha256::digest(encoded.as_bytes());
    digest.into()
}

/// Canonical JSON bytes of a value (sorted keys, compact separators).
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    canonicalize(value).to_string().into_bytes()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            // serde_json's map preserves no particular order guarantee for
            // callers; rebuild sorted to pin the byte layout.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key.clone(), canonicalize(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
