//! Default codecs for collections.

use std::sync::Arc;

use serde_json::Value;

use crate::errors::SerializationError;

use super::codec::{Codec, CodecRegistry, CodecSignal};
use super::ctx::SerCtx;

/// Rewrites a plain `$vector` number array into the compact
/// `{"$binary": <base64 float32-LE>}` form on the way out.
struct VectorBinaryCodec;

impl Codec for VectorBinaryCodec {
    fn serialize(
        &self,
        value: &Value,
        ctx: &mut SerCtx,
    ) -> Result<CodecSignal, SerializationError> {
        let Value::Array(items) = value else {
            return Ok(CodecSignal::Nevermind);
        };
        let mut components = Vec::with_capacity(items.len());
        for item in items {
            match item.as_f64() {
                Some(f) => components.push(f as f32),
                None => {
                    return Err(SerializationError::at(
                        super::ctx::render_path(&ctx.path),
                        "$vector components must be numbers",
                    ));
                }
            }
        }
        let vector = crate::datatypes::DataApiVector::new(components);
        Ok(CodecSignal::Done(serde_json::json!({
            "$binary": vector.to_base64()
        })))
    }
}

/// The built-in collection codec set.
pub(crate) fn default_codecs() -> CodecRegistry {
    CodecRegistry::new().for_name("$vector", Arc::new(VectorBinaryCodec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serdes::ctx::SerdesTarget;
    use crate::serdes::walk::serialize_walk;
    use serde_json::json;

    fn ser(value: Value) -> Result<Value, SerializationError> {
        let mut ctx = SerCtx {
            path: Vec::new(),
            target: SerdesTarget::Record,
            big_numbers: false,
        };
        serialize_walk(value, &mut ctx, &default_codecs())
    }

    #[test]
    fn vector_arrays_compact_to_binary() {
        let out = ser(json!({ "$vector": [1.0, 2.0], "name": "x" })).unwrap();
        assert!(out["$vector"].get("$binary").is_some());
        assert_eq!(out["name"], "x");
    }

    #[test]
    fn already_binary_vectors_pass_through() {
        let out = ser(json!({ "$vector": { "$binary": "AACAPwAAAEA=" } })).unwrap();
        assert_eq!(out["$vector"]["$binary"], "AACAPwAAAEA=");
    }

    #[test]
    fn non_numeric_components_are_rejected_with_a_path() {
        let err = ser(json!({ "$vector": [1.0, "two"] })).unwrap_err();
        assert_eq!(err.path, vec!["$vector"]);
    }

    #[test]
    fn nested_vector_fields_are_untouched() {
        // The name selector only covers the top-level field.
        let out = ser(json!({ "inner": { "$vector": [1.0] } })).unwrap();
        assert_eq!(out["inner"]["$vector"], json!([1.0]));
    }
}
