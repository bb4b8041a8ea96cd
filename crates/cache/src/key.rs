use crate::error::{CacheError, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

const SEPARATOR: char = '#';
const FINGERPRINT_HEX: usize = 16;

/// `"{tree_id}#{fingerprint}"`, where the fingerprint is the first 16 hex chars of the SHA-256
/// of the parameters as canonical JSON (object keys sorted).
///
/// Equal parameters always produce equal keys, regardless of field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<P: Serialize + ?Sized>(tree_id: &str, params: &P) -> Result<Self> {
        if tree_id.is_empty() || tree_id.contains(SEPARATOR) {
            return Err(CacheError::MalformedKey(format!(
                "tree id {tree_id:?} must be non-empty and must not contain '{SEPARATOR}'"
            )));
        }
        let value =
            serde_json::to_value(params).map_err(|err| CacheError::Fingerprint(err.to_string()))?;
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);
        Ok(Self(format!(
            "{tree_id}{SEPARATOR}{}",
            fingerprint(canonical.as_bytes())
        )))
    }

    /// Accepts a key previously rendered with [`CacheKey::as_str`] (e.g. an index handle).
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || CacheError::MalformedKey(raw.to_string());
        let (tree_id, fingerprint) = raw.rsplit_once(SEPARATOR).ok_or_else(malformed)?;
        if tree_id.is_empty()
            || tree_id.contains(SEPARATOR)
            || fingerprint.len() != FINGERPRINT_HEX
            || !fingerprint.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(malformed());
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest
        .iter()
        .take(FINGERPRINT_HEX / 2)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_order_does_not_matter() {
        let a = CacheKey::new("file", &json!({"depth": 2, "node": "1:2"})).unwrap();
        let b = CacheKey::new("file", &json!({"node": "1:2", "depth": 2})).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("file#"));
        assert_eq!(a.as_str().len(), "file#".len() + FINGERPRINT_HEX);
    }

    #[test]
    fn different_params_differ() {
        let a = CacheKey::new("file", &json!({"depth": 2})).unwrap();
        let b = CacheKey::new("file", &json!({"depth": 3})).unwrap();
        let c = CacheKey::new("other", &json!({"depth": 2})).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn parse_round_trips_and_rejects_garbage() {
        let key = CacheKey::new("file", &json!({"x": [1, {"b": 1, "a": 2}]})).unwrap();
        assert_eq!(CacheKey::parse(key.as_str()).unwrap(), key);
        assert!(CacheKey::parse("no-separator").is_err());
        assert!(CacheKey::parse("file#short").is_err());
        assert!(CacheKey::parse("#0123456789abcdef").is_err());
    }

    #[test]
    fn separator_in_tree_id_is_rejected() {
        assert!(CacheKey::new("a#b", &json!({})).is_err());
        assert!(CacheKey::new("", &json!({})).is_err());
    }
}
