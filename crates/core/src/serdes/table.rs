//! Default codecs for tables.
//!
//! Outbound, tables speak bare scalars (RFC 3339 timestamps rather than
//! `$date` objects). Inbound, the server-returned projection schema drives
//! normalization of container columns into shapes plain serde types can
//! absorb.

use std::sync::Arc;

use astra_protocol::schema::ColumnKind;
use serde_json::Value;

use crate::datatypes::{DataApiTimestamp, DataApiVector};
use crate::errors::SerializationError;

use super::codec::{Codec, CodecRegistry, CodecSignal};
use super::ctx::{DesCtx, SerCtx, render_path};

/// Rewrites `{"$date": <millis>}` (the form [`DataApiTimestamp`] emits)
/// into the RFC 3339 string tables expect.
struct TimestampOutCodec;

fn is_date_object(value: &Value) -> bool {
    matches!(value.as_object(), Some(map) if map.len() == 1 && map.get("$date").is_some_and(Value::is_number))
}

impl Codec for TimestampOutCodec {
    fn serialize(
        &self,
        value: &Value,
        ctx: &mut SerCtx,
    ) -> Result<CodecSignal, SerializationError> {
        let millis = value
            .get("$date")
            .and_then(Value::as_i64)
            .ok_or_else(|| SerializationError::at(render_path(&ctx.path), "malformed $date"))?;
        let timestamp = DataApiTimestamp::from_epoch_millis(millis).ok_or_else(|| {
            SerializationError::at(render_path(&ctx.path), "epoch millis out of range")
        })?;
        Ok(CodecSignal::Done(Value::String(timestamp.to_rfc3339())))
    }
}

/// Normalizes map columns: text-keyed maps become JSON objects, everything
/// else becomes `[[k, v], ...]` entry pairs.
struct MapColumnCodec;

fn is_text_kind(kind: ColumnKind) -> bool {
    matches!(kind, ColumnKind::Text | ColumnKind::Ascii | ColumnKind::Varchar)
}

impl Codec for MapColumnCodec {
    fn deserialize(
        &self,
        value: &Value,
        ctx: &mut DesCtx<'_>,
    ) -> Result<CodecSignal, SerializationError> {
        let text_keys = ctx
            .column()
            .and_then(|column| column.key_kind())
            .is_some_and(is_text_kind);

        match (value, text_keys) {
            (Value::Array(entries), true) => {
                let mut out = serde_json::Map::with_capacity(entries.len());
                for entry in entries {
                    let Some([key, item]) = entry.as_array().map(Vec::as_slice) else {
                        return Err(SerializationError::at(
                            render_path(&ctx.path),
                            "map column entries must be [key, value] pairs",
                        ));
                    };
                    let key = match key {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    out.insert(key, item.clone());
                }
                Ok(CodecSignal::Recurse(Some(Value::Object(out))))
            }
            (Value::Object(map), false) => {
                let pairs = map
                    .iter()
                    .map(|(key, item)| Value::Array(vec![Value::String(key.clone()), item.clone()]))
                    .collect();
                Ok(CodecSignal::Recurse(Some(Value::Array(pairs))))
            }
            _ => Ok(CodecSignal::Recurse(None)),
        }
    }
}

/// Expands `{"$binary": ...}` vector columns into plain number arrays.
struct VectorColumnCodec;

impl Codec for VectorColumnCodec {
    fn deserialize(
        &self,
        value: &Value,
        ctx: &mut DesCtx<'_>,
    ) -> Result<CodecSignal, SerializationError> {
        let Some(encoded) = value.get("$binary").and_then(Value::as_str) else {
            return Ok(CodecSignal::Nevermind);
        };
        let vector = DataApiVector::from_base64(encoded)
            .map_err(|reason| SerializationError::at(render_path(&ctx.path), reason))?;
        let components = vector
            .as_slice()
            .iter()
            .map(|component| {
                serde_json::Number::from_f64(f64::from(*component))
                    .map(Value::Number)
                    .ok_or_else(|| {
                        SerializationError::at(
                            render_path(&ctx.path),
                            "non-finite vector component",
                        )
                    })
            })
            .collect::<Result<Vec<Value>, SerializationError>>()?;
        Ok(CodecSignal::Done(Value::Array(components)))
    }
}

/// The built-in table codec set.
pub(crate) fn default_codecs() -> CodecRegistry {
    CodecRegistry::new()
        .for_guard(is_date_object, Arc::new(TimestampOutCodec))
        .for_type(ColumnKind::Map, Arc::new(MapColumnCodec))
        .for_type(ColumnKind::Vector, Arc::new(VectorColumnCodec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serdes::ctx::SerdesTarget;
    use crate::serdes::walk::{deserialize_walk, serialize_walk};
    use astra_protocol::schema::{ColumnDesc, ColumnTypeRef, ProjectionSchema};
    use serde_json::json;

    fn ser(value: Value) -> Value {
        let mut ctx = SerCtx {
            path: Vec::new(),
            target: SerdesTarget::Record,
            big_numbers: false,
        };
        serialize_walk(value, &mut ctx, &default_codecs()).unwrap()
    }

    fn des(value: Value, schema: &ProjectionSchema) -> Value {
        let mut ctx = DesCtx::new(SerdesTarget::Record, false, Some(schema));
        deserialize_walk(value, &mut ctx, &default_codecs()).unwrap()
    }

    fn map_desc(key: ColumnKind, value: ColumnKind) -> ColumnDesc {
        ColumnDesc {
            kind: ColumnKind::Map,
            key_type: Some(ColumnTypeRef::Name(key)),
            value_type: Some(ColumnTypeRef::Name(value)),
            dimension: None,
        }
    }

    #[test]
    fn outbound_timestamps_become_rfc3339() {
        let ts = DataApiTimestamp::from_epoch_millis(1_700_000_000_000).unwrap();
        let row = json!({ "when": serde_json::to_value(ts).unwrap() });
        let out = ser(row);
        assert_eq!(out["when"], Value::String(ts.to_rfc3339()));
    }

    #[test]
    fn text_keyed_map_pairs_normalize_to_objects() {
        let schema: ProjectionSchema =
            [("attrs".to_string(), map_desc(ColumnKind::Text, ColumnKind::Int))].into();
        let out = des(json!({ "attrs": [["a", 1], ["b", 2]] }), &schema);
        assert_eq!(out["attrs"], json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn non_text_keyed_map_objects_normalize_to_pairs() {
        let schema: ProjectionSchema =
            [("scores".to_string(), map_desc(ColumnKind::Int, ColumnKind::Int))].into();
        let out = des(json!({ "scores": { "1": 10 } }), &schema);
        assert_eq!(out["scores"], json!([["1", 10]]));
    }

    #[test]
    fn binary_vector_columns_expand_to_arrays() {
        let vector = DataApiVector::new(vec![1.0, 2.0]);
        let schema: ProjectionSchema = [(
            "embedding".to_string(),
            ColumnDesc {
                kind: ColumnKind::Vector,
                key_type: None,
                value_type: None,
                dimension: Some(2),
            },
        )]
        .into();

        let out = des(
            json!({ "embedding": { "$binary": vector.to_base64() } }),
            &schema,
        );
        assert_eq!(out["embedding"], json!([1.0, 2.0]));
    }

    #[test]
    fn unrelated_columns_pass_through() {
        let schema: ProjectionSchema = ProjectionSchema::new();
        let out = des(json!({ "name": "t", "n": 3 }), &schema);
        assert_eq!(out, json!({ "name": "t", "n": 3 }));
    }
}
