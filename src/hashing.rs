//! Audit Hashing - SHA-256 over canonical JSON
//!
//! Identical inputs give identical hashes, independent of map ordering.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Canonical JSON: object keys sorted at every depth, no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Hash of a priced quote. Callers blank `quote_hash` itself before hashing.
pub fn compute_quote_hash<T: Serialize>(quote: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(quote)?.as_bytes()))
}

/// input_hash = sha256(canonical_candidates ":" canonical_config ":" tables_version ":" engine_version)
pub fn compute_input_hash(
    candidates: &impl Serialize,
    config: &impl Serialize,
    tables_version: &str,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let combined = format!(
        "{}:{}:{}:{}",
        canonical_json(candidates)?,
        canonical_json(config)?,
        tables_version,
        engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"quantities": [1, 10], "markup": {"z": 1, "a": 2}});
        assert_eq!(
            canonical_json(&obj).unwrap(),
            r#"{"markup":{"a":2,"z":1},"quantities":[1,10]}"#
        );
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_input_hash_ignores_key_order() {
        let a = json!({"threshold": 0.5, "markup_percent": 15.0});
        let b = json!({"markup_percent": 15.0, "threshold": 0.5});
        let candidates = json!([]);
        assert_eq!(
            compute_input_hash(&candidates, &a, "1.0.0", "1.0.0").unwrap(),
            compute_input_hash(&candidates, &b, "1.0.0", "1.0.0").unwrap()
        );
        assert_ne!(
            compute_input_hash(&candidates, &a, "1.0.0", "1.0.0").unwrap(),
            compute_input_hash(&candidates, &a, "1.1.0", "1.0.0").unwrap()
        );
    }
}
