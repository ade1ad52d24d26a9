//! Entity tags: deterministic content hashes of canonical documents.
//!
//! An ETag is `"<base64url(sha224(canonical_json(doc)))>"`. The canonical
//! serialization sorts object keys recursively, uses compact separators
//! and writes non-ASCII characters as raw UTF-8, so two documents that
//! differ only in key order produce the same tag.

use std::collections::BTreeSet;
use std::fmt;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha224};

use crate::models::Document;

/// An HTTP entity tag in header form, quotes and optional `W/` included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

/// Set of candidate ETags from an `If-Match`/`If-None-Match` header.
pub type ETagSet = BTreeSet<ETag>;

impl ETag {
    /// Wrap a tag exactly as it appears on the wire.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_weak(&self) -> bool {
        self.0.starts_with("W/")
    }

    /// The quoted opaque tag with any weak indicator removed.
    pub fn opaque(&self) -> &str {
        self.0.strip_prefix("W/").unwrap_or(&self.0)
    }

    /// Weak comparison (RFC 7232 §2.3.2): opaque tags equal, `W/` ignored.
    pub fn weak_eq(&self, other: &ETag) -> bool {
        self.opaque() == other.opaque()
    }

    /// Strong comparison: neither tag weak and both identical.
    pub fn strong_eq(&self, other: &ETag) -> bool {
        !self.is_weak() && !other.is_weak() && self.0 == other.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True when any candidate weakly matches `current`.
pub fn matches_weak(current: &ETag, candidates: &ETagSet) -> bool {
    candidates.iter().any(|c| c.weak_eq(current))
}

/// True when any candidate strongly matches `current`.
pub fn matches_strong(current: &ETag, candidates: &ETagSet) -> bool {
    candidates.iter().any(|c| c.strong_eq(current))
}

/// Compute the ETag of a document.
pub fn compute_etag(doc: &Document) -> ETag {
    let canonical = canonical_json_object(doc);
    let digest = Sha224::digest(canonical.as_bytes());
    ETag(format!("\"{}\"", URL_SAFE.encode(digest)))
}

/// Canonical serialization of an arbitrary JSON value.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn canonical_json_object(doc: &Document) -> String {
    let mut out = String::new();
    write_object(doc, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // serde_json escapes only what JSON requires; non-ASCII stays UTF-8
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &serde_json::Map<String, Value>, out: &mut String) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::from(key.as_str()).to_string());
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_etag_is_deterministic() {
        let d = doc(json!({"dct:title": "x", "n": 1}));
        assert_eq!(compute_etag(&d), compute_etag(&d));
    }

    #[test]
    fn test_etag_ignores_key_order() {
        let a: Document =
            serde_json::from_str(r#"{"b": {"y": 1, "x": [1, {"q": 1, "p": 2}]}, "a": "é"}"#)
                .unwrap();
        let b: Document =
            serde_json::from_str(r#"{"a": "é", "b": {"x": [1, {"p": 2, "q": 1}], "y": 1}}"#)
                .unwrap();
        assert_eq!(compute_etag(&a), compute_etag(&b));
    }

    #[test]
    fn test_etag_changes_with_content() {
        let a = doc(json!({"dct:title": "x"}));
        let b = doc(json!({"dct:title": "y"}));
        assert_ne!(compute_etag(&a), compute_etag(&b));
    }

    #[test]
    fn test_etag_array_order_is_significant() {
        let a = doc(json!({"k": [1, 2]}));
        let b = doc(json!({"k": [2, 1]}));
        assert_ne!(compute_etag(&a), compute_etag(&b));
    }

    #[test]
    fn test_etag_shape() {
        let tag = compute_etag(&doc(json!({"a": 1})));
        let s = tag.as_str();
        assert!(s.starts_with('"') && s.ends_with('"'));
        // 28-byte digest encodes to 40 base64 characters
        assert_eq!(s.len(), 42);
        assert!(s[1..41]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '='));
        assert!(!tag.is_weak());
    }

    #[test]
    fn test_canonical_json_sorts_and_compacts() {
        let v = json!({"b": 1, "a": {"d": [true, null], "c": "ü"}});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":{"c":"ü","d":[true,null]},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_quotes() {
        let v = json!({"a\"b": "line\nbreak"});
        assert_eq!(canonical_json(&v), r#"{"a\"b":"line\nbreak"}"#);
    }

    #[test]
    fn test_weak_and_strong_comparison() {
        let strong = ETag::new("\"abc\"");
        let weak = ETag::new("W/\"abc\"");
        assert!(weak.is_weak());
        assert_eq!(weak.opaque(), "\"abc\"");
        assert!(strong.weak_eq(&weak));
        assert!(!strong.strong_eq(&weak));
        assert!(strong.strong_eq(&ETag::new("\"abc\"")));
    }

    #[test]
    fn test_set_matching() {
        let current = ETag::new("\"abc\"");
        let set: ETagSet = [ETag::new("\"zzz\""), ETag::new("W/\"abc\"")]
            .into_iter()
            .collect();
        assert!(matches_weak(&current, &set));
        assert!(!matches_strong(&current, &set));
    }
}
