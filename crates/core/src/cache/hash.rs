//! Snapshot digest generation for dirty detection.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::document::Document;

/// Compute the snapshot digest of a document's application fields.
///
/// The revision marker is stripped before hashing, so two documents equal in
/// every field except `_rev` produce the same digest. Fields are folded into
/// the hash with sorted object keys at every level, making the digest
/// independent of map iteration order.
///
/// The digest is used only for equality testing; hash collisions are treated
/// as equality. That is an accepted false-negative risk of SHA-256, not a
/// correctness guarantee.
pub fn snapshot_digest(document: &Document) -> String {
    let stripped = document.without_rev();
    let mut hasher = Sha256::new();
    hash_object(stripped.fields(), &mut hasher);
    hex::encode(hasher.finalize())
}

fn hash_object(map: &Map<String, Value>, hasher: &mut Sha256) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    hasher.update(b"{");
    for key in keys {
        hash_string(key, hasher);
        hasher.update(b":");
        hash_value(&map[key.as_str()], hasher);
        hasher.update(b",");
    }
    hasher.update(b"}");
}

/// Strings and keys are folded in JSON-escaped form so content bytes can
/// never collide with the structural bytes of the canonical form.
fn hash_string(s: &str, hasher: &mut Sha256) {
    hasher.update(Value::from(s).to_string().as_bytes());
}

fn hash_value(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Null => hasher.update(b"null"),
        Value::Bool(true) => hasher.update(b"true"),
        Value::Bool(false) => hasher.update(b"false"),
        Value::Number(n) => hasher.update(n.to_string().as_bytes()),
        Value::String(s) => hash_string(s, hasher),
        Value::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(item, hasher);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        Value::Object(map) => hash_object(map, hasher),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::try_from(value).unwrap()
    }

    #[test]
    fn test_digest_stability() {
        let a = doc(json!({"_id": "a", "name": "foo"}));
        assert_eq!(snapshot_digest(&a), snapshot_digest(&a));
    }

    #[test]
    fn test_digest_ignores_rev() {
        let first = doc(json!({"_id": "a", "_rev": "1-x", "name": "foo"}));
        let second = doc(json!({"_id": "a", "_rev": "2-y", "name": "foo"}));
        let none = doc(json!({"_id": "a", "name": "foo"}));

        assert_eq!(snapshot_digest(&first), snapshot_digest(&second));
        assert_eq!(snapshot_digest(&first), snapshot_digest(&none));
    }

    #[test]
    fn test_digest_sensitive_to_content() {
        let foo = doc(json!({"_id": "a", "name": "foo"}));
        let bar = doc(json!({"_id": "a", "name": "bar"}));
        assert_ne!(snapshot_digest(&foo), snapshot_digest(&bar));
    }

    #[test]
    fn test_digest_independent_of_insertion_order() {
        let mut forward = Document::with_id("a");
        forward.insert("first", 1);
        forward.insert("second", 2);

        let mut reverse = Document::with_id("a");
        reverse.insert("second", 2);
        reverse.insert("first", 1);

        assert_eq!(snapshot_digest(&forward), snapshot_digest(&reverse));
    }

    #[test]
    fn test_digest_nested_values() {
        let nested = doc(json!({"_id": "a", "tags": ["x", "y"], "meta": {"n": 1, "b": true}}));
        let same = doc(json!({"_id": "a", "meta": {"b": true, "n": 1}, "tags": ["x", "y"]}));
        let reordered_array = doc(json!({"_id": "a", "tags": ["y", "x"], "meta": {"n": 1, "b": true}}));

        assert_eq!(snapshot_digest(&nested), snapshot_digest(&same));
        assert_ne!(snapshot_digest(&nested), snapshot_digest(&reordered_array));
    }

    #[test]
    fn test_digest_escapes_string_delimiters() {
        let embedded = doc(json!({"_id": "a", "tags": ["x\",\"y"]}));
        let split = doc(json!({"_id": "a", "tags": ["x", "y"]}));
        assert_ne!(snapshot_digest(&embedded), snapshot_digest(&split));
    }

    #[test]
    fn test_digest_escapes_key_delimiters() {
        let embedded = doc(json!({"_id": "a", "x\":1,\"y": 0}));
        let split = doc(json!({"_id": "a", "x": 1, "y": 0}));
        assert_ne!(snapshot_digest(&embedded), snapshot_digest(&split));
    }

    #[test]
    fn test_digest_format() {
        let digest = snapshot_digest(&doc(json!({"_id": "a"})));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
