//! Merge-write semantics
//!
//! Fields present in the write replace the stored value, except nested objects
//! which merge recursively. Fields absent from the write are never removed.

use serde_json::Value;
use syncnote_protocol::Document;

/// Merge `fields` into `target` in place
pub fn deep_merge(target: &mut Document, fields: Document) {
    for (name, incoming) in fields {
        match (target.get_mut(&name), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            (_, incoming) => {
                target.insert(name, incoming);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let mut doc = obj(json!({ "content": "old", "pinned": true }));
        deep_merge(&mut doc, obj(json!({ "content": "new" })));
        assert_eq!(Value::Object(doc), json!({ "content": "new", "pinned": true }));
    }

    #[test]
    fn test_merge_replaces_arrays_wholesale() {
        let mut doc = obj(json!({ "items": ["a", "b"] }));
        deep_merge(&mut doc, obj(json!({ "items": [] })));
        assert_eq!(Value::Object(doc), json!({ "items": [] }));
    }

    #[test]
    fn test_merge_recurses_into_objects() {
        let mut doc = obj(json!({ "meta": { "a": 1, "b": 2 } }));
        deep_merge(&mut doc, obj(json!({ "meta": { "b": 3 } })));
        assert_eq!(Value::Object(doc), json!({ "meta": { "a": 1, "b": 3 } }));
    }
}
