//! Hashing System - SHA-256 for Manifests
//!
//! Deterministic hashes over canonical JSON. The content hash identifies a
//! format's render inputs so callers can memoize; the manifest hash covers
//! the deliverable's manifest minus its volatile fields.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Hash of a serialized manifest.
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(manifest)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// content_hash = sha256(format_id + source_hash + canonical_inputs + engine_version)
pub fn compute_content_hash(
    format_id: &str,
    source_hash: &str,
    inputs: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical_inputs = canonical_json(inputs)?;
    let combined = format!(
        "{}:{}:{}:{}",
        format_id, source_hash, canonical_inputs, engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": {"y": 2, "b": 3}, "m": [ {"k": 1, "c": 2} ]});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":{"b":3,"y":2},"m":[{"c":2,"k":1}],"z":1}"#);
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_manifest_hash_ignores_key_order() {
        let a = json!({"formatId": "sklik-300x250", "fileSizeKB": 42.0});
        let b = json!({"fileSizeKB": 42.0, "formatId": "sklik-300x250"});
        assert_eq!(compute_manifest_hash(&a).unwrap(), compute_manifest_hash(&b).unwrap());
    }

    #[test]
    fn test_content_hash_depends_on_format() {
        let inputs = json!({"headline": "Black Friday"});
        let h1 = compute_content_hash("sklik-300x250", "abc", &inputs, "1.0.0").unwrap();
        let h2 = compute_content_hash("sklik-728x90", "abc", &inputs, "1.0.0").unwrap();
        let h3 = compute_content_hash("sklik-300x250", "abc", &inputs, "1.0.0").unwrap();
        assert_ne!(h1, h2);
        assert_eq!(h1, h3);
    }
}
