//! Key transformers, applied to object keys after the codec walk.

use serde_json::Value;

/// Renames object keys between the user-facing and wire representations.
pub trait KeyTransformer: Send + Sync + std::fmt::Debug {
    /// User-facing key → wire key.
    fn serialize_key(&self, key: &str) -> String;

    /// Wire key → user-facing key.
    fn deserialize_key(&self, key: &str) -> String;

    /// Whether nested object keys are transformed too (top level only by
    /// default).
    fn transform_nested(&self) -> bool {
        false
    }
}

/// camelCase (user land) ↔ snake_case (wire).
///
/// Keys starting with `$` (operators) and the `_id` field are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Camel2SnakeCase {
    nested: bool,
}

impl Camel2SnakeCase {
    /// Transforms top-level keys only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transforms keys at every depth.
    pub fn nested() -> Self {
        Self { nested: true }
    }
}

impl KeyTransformer for Camel2SnakeCase {
    fn serialize_key(&self, key: &str) -> String {
        if is_exempt(key) {
            return key.to_string();
        }
        camel_to_snake(key)
    }

    fn deserialize_key(&self, key: &str) -> String {
        if is_exempt(key) {
            return key.to_string();
        }
        snake_to_camel(key)
    }

    fn transform_nested(&self) -> bool {
        self.nested
    }
}

fn is_exempt(key: &str) -> bool {
    key.starts_with('$') || key == "_id"
}

fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Which direction a key pass runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyDirection {
    Serialize,
    Deserialize,
}

/// Applies a transformer to a value tree's object keys.
pub(crate) fn transform_keys(
    value: Value,
    transformer: &dyn KeyTransformer,
    direction: KeyDirection,
) -> Value {
    transform_at(value, transformer, direction, 0)
}

fn transform_at(
    value: Value,
    transformer: &dyn KeyTransformer,
    direction: KeyDirection,
    depth: usize,
) -> Value {
    match value {
        Value::Object(map) => {
            let rename = depth == 0 || transformer.transform_nested();
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                let key = if rename {
                    match direction {
                        KeyDirection::Serialize => transformer.serialize_key(&key),
                        KeyDirection::Deserialize => transformer.deserialize_key(&key),
                    }
                } else {
                    key
                };
                out.insert(key, transform_at(item, transformer, direction, depth + 1));
            }
            Value::Object(out)
        }
        Value::Array(items) if transformer.transform_nested() => Value::Array(
            items
                .into_iter()
                .map(|item| transform_at(item, transformer, direction, depth + 1))
                .collect(),
        ),
        settled => settled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_and_snake_invert_each_other() {
        for key in ["fullName", "aBC", "plain", "with2Numbers"] {
            assert_eq!(snake_to_camel(&camel_to_snake(key)), key);
        }
    }

    #[test]
    fn operators_and_id_are_exempt() {
        let t = Camel2SnakeCase::new();
        assert_eq!(t.serialize_key("$setOnInsert"), "$setOnInsert");
        assert_eq!(t.serialize_key("_id"), "_id");
        assert_eq!(t.serialize_key("fullName"), "full_name");
    }

    #[test]
    fn top_level_only_by_default() {
        let value = json!({ "fullName": { "firstName": "a" } });
        let out = transform_keys(value, &Camel2SnakeCase::new(), KeyDirection::Serialize);
        assert_eq!(out, json!({ "full_name": { "firstName": "a" } }));
    }

    #[test]
    fn nested_transforms_every_depth() {
        let value = json!({ "fullName": { "firstName": "a" }, "tags": [{ "tagName": "x" }] });
        let out = transform_keys(value, &Camel2SnakeCase::nested(), KeyDirection::Serialize);
        assert_eq!(
            out,
            json!({ "full_name": { "first_name": "a" }, "tags": [{ "tag_name": "x" }] })
        );
    }

    #[test]
    fn deserialize_direction_restores_camel() {
        let value = json!({ "full_name": "a" });
        let out = transform_keys(value, &Camel2SnakeCase::new(), KeyDirection::Deserialize);
        assert_eq!(out, json!({ "fullName": "a" }));
    }
}
