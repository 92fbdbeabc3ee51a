//! The Data API command envelope.
//!
//! Every Data API request body is a JSON object with exactly one key, the
//! command name, whose value is the parameter object:
//!
//! ```json
//! { "insertOne": { "document": { "name": "t" } } }
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A single Data API command ready for serialization.
///
/// Built incrementally with [`arg`](Self::arg) / [`arg_opt`](Self::arg_opt);
/// serializes to the single-key envelope shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    body: Map<String, Value>,
}

impl Command {
    /// Creates an empty command with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Map::new(),
        }
    }

    /// Sets a parameter on the command body.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Sets a parameter only if `value` is `Some`.
    pub fn arg_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.arg(key, value),
            None => self,
        }
    }

    /// The command name (the envelope's single key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parameter object.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Mutable access to the parameter object.
    pub fn body_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.body
    }

    /// Consumes the command into its envelope `Value`.
    pub fn into_value(self) -> Value {
        let mut envelope = Map::with_capacity(1);
        envelope.insert(self.name, Value::Object(self.body));
        Value::Object(envelope)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.body)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_is_single_key() {
        let cmd = Command::new("insertOne").arg("document", json!({ "name": "t" }));
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value, json!({ "insertOne": { "document": { "name": "t" } } }));
    }

    #[test]
    fn arg_opt_skips_none() {
        let cmd = Command::new("find")
            .arg("filter", json!({}))
            .arg_opt("sort", None::<Value>)
            .arg_opt("options", Some(json!({ "limit": 10 })));
        let value = cmd.into_value();
        assert_eq!(
            value,
            json!({ "find": { "filter": {}, "options": { "limit": 10 } } })
        );
    }

    #[test]
    fn empty_body_serializes_to_empty_object() {
        let value = Command::new("estimatedDocumentCount").into_value();
        assert_eq!(value, json!({ "estimatedDocumentCount": {} }));
    }
}
