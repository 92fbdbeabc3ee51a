//! The codec-driven ser/des engine.
//!
//! Every command payload passes through here on its way to and from the
//! wire. A traversal walks the `serde_json::Value` tree, consulting an
//! ordered [`CodecRegistry`] at every node; codecs are selected by path,
//! top-level name, server column type (deserialize), or value guard
//! (serialize), and steer the walk through [`CodecSignal`]s. Key
//! transformers run after the codec walk; nominal datatype conversion is
//! serde's job (see [`crate::datatypes`]).
//!
//! Collections and tables get different built-in codec sets; user codecs
//! registered through [`SerdesOptions`] always run first.

pub mod codec;
pub mod ctx;
pub mod key_transform;

mod collection;
mod table;
pub(crate) mod walk;

use std::sync::Arc;

use astra_protocol::schema::ProjectionSchema;
use serde_json::Value;

use crate::errors::SerializationError;

pub use codec::{Codec, CodecRegistry, CodecSelector, CodecSignal, ValueGuard};
pub use ctx::{DesCtx, PathMatcher, PathSegment, SerCtx, SerdesTarget};
pub use key_transform::{Camel2SnakeCase, KeyTransformer};

use key_transform::{KeyDirection, transform_keys};

/// User-level serdes configuration; an options monoid.
#[derive(Clone, Default)]
pub struct SerdesOptions {
    /// Custom codecs, tried before the built-in set in the given order.
    pub codecs: Vec<(CodecSelector, Arc<dyn Codec>)>,
    /// Key transformer applied after the codec walk.
    pub key_transformer: Option<Arc<dyn KeyTransformer>>,
    /// Whether arbitrary-precision numbers are surfaced/allowed.
    pub big_numbers: Option<bool>,
}

impl SerdesOptions {
    /// The identity element.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Right-biased merge: the right side's codecs run first, and its
    /// scalar settings win.
    pub fn concat(self, other: SerdesOptions) -> SerdesOptions {
        let mut codecs = other.codecs;
        codecs.extend(self.codecs);
        SerdesOptions {
            codecs,
            key_transformer: other.key_transformer.or(self.key_transformer),
            big_numbers: other.big_numbers.or(self.big_numbers),
        }
    }

    /// Adds a custom codec.
    pub fn codec(mut self, selector: CodecSelector, codec: Arc<dyn Codec>) -> Self {
        self.codecs.push((selector, codec));
        self
    }

    /// Sets the key transformer.
    pub fn key_transformer(mut self, transformer: Arc<dyn KeyTransformer>) -> Self {
        self.key_transformer = Some(transformer);
        self
    }

    /// Enables or disables big-number support.
    pub fn big_numbers(mut self, enabled: bool) -> Self {
        self.big_numbers = Some(enabled);
        self
    }
}

impl std::fmt::Debug for SerdesOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerdesOptions")
            .field("codecs", &self.codecs.len())
            .field("key_transformer", &self.key_transformer)
            .field("big_numbers", &self.big_numbers)
            .finish()
    }
}

/// A resolved ser/des pipeline for one collection or table.
#[derive(Clone)]
pub struct SerDes {
    registry: Arc<CodecRegistry>,
    key_transformer: Option<Arc<dyn KeyTransformer>>,
    big_numbers: bool,
}

impl SerDes {
    /// Builds the pipeline for a collection.
    pub fn collection(options: &SerdesOptions) -> Self {
        Self::build(options, collection::default_codecs())
    }

    /// Builds the pipeline for a table.
    pub fn table(options: &SerdesOptions) -> Self {
        Self::build(options, table::default_codecs())
    }

    fn build(options: &SerdesOptions, defaults: CodecRegistry) -> Self {
        let mut registry = CodecRegistry::new();
        for (selector, codec) in &options.codecs {
            registry.push(selector.clone(), Arc::clone(codec));
        }
        registry.extend(&defaults);

        Self {
            registry: Arc::new(registry),
            key_transformer: options.key_transformer.clone(),
            big_numbers: options.big_numbers.unwrap_or(false),
        }
    }

    /// Whether big numbers are enabled for this pipeline.
    pub fn big_numbers(&self) -> bool {
        self.big_numbers
    }

    /// Transforms a user-land value into its wire form.
    pub fn serialize(
        &self,
        value: Value,
        target: SerdesTarget,
    ) -> Result<Value, SerializationError> {
        let mut ctx = SerCtx {
            path: Vec::new(),
            target,
            big_numbers: self.big_numbers,
        };
        let walked = walk::serialize_walk(value, &mut ctx, &self.registry)?;
        debug_assert!(ctx.path.is_empty(), "path stack must unwind to the root");

        Ok(match &self.key_transformer {
            Some(transformer) => {
                transform_keys(walked, transformer.as_ref(), KeyDirection::Serialize)
            }
            None => walked,
        })
    }

    /// Transforms a wire value into its user-land form, guided by the
    /// server-returned projection schema where available.
    pub fn deserialize(
        &self,
        value: Value,
        target: SerdesTarget,
        schema: Option<&ProjectionSchema>,
    ) -> Result<Value, SerializationError> {
        let mut ctx = DesCtx::new(target, self.big_numbers, schema);
        let walked = walk::deserialize_walk(value, &mut ctx, &self.registry)?;
        debug_assert!(ctx.path.is_empty(), "path stack must unwind to the root");

        Ok(match &self.key_transformer {
            Some(transformer) => {
                transform_keys(walked, transformer.as_ref(), KeyDirection::Deserialize)
            }
            None => walked,
        })
    }
}

impl std::fmt::Debug for SerDes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerDes")
            .field("codecs", &self.registry.len())
            .field("big_numbers", &self.big_numbers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct UppercaseCodec;

    impl Codec for UppercaseCodec {
        fn serialize(
            &self,
            value: &Value,
            _ctx: &mut SerCtx,
        ) -> Result<CodecSignal, SerializationError> {
            match value.as_str() {
                Some(s) => Ok(CodecSignal::Done(Value::String(s.to_uppercase()))),
                None => Ok(CodecSignal::Nevermind),
            }
        }
    }

    fn serdes(options: SerdesOptions) -> SerDes {
        SerDes::collection(&options)
    }

    #[test]
    fn path_codec_applies_under_wildcards() {
        let options = SerdesOptions::empty().codec(
            CodecSelector::Path(vec![PathMatcher::from("cars"), PathMatcher::Wildcard]),
            Arc::new(UppercaseCodec),
        );
        let out = serdes(options)
            .serialize(
                json!({ "cars": { "a": "golf", "b": "polo" }, "other": "low" }),
                SerdesTarget::Record,
            )
            .unwrap();
        assert_eq!(out["cars"]["a"], "GOLF");
        assert_eq!(out["cars"]["b"], "POLO");
        assert_eq!(out["other"], "low");
    }

    #[test]
    fn name_codec_applies_at_top_level_only() {
        let options = SerdesOptions::empty()
            .codec(CodecSelector::Name("tag".into()), Arc::new(UppercaseCodec));
        let out = serdes(options)
            .serialize(
                json!({ "tag": "a", "nested": { "tag": "b" } }),
                SerdesTarget::Record,
            )
            .unwrap();
        assert_eq!(out["tag"], "A");
        assert_eq!(out["nested"]["tag"], "b");
    }

    #[test]
    fn done_prevents_recursion() {
        struct SealCodec;
        impl Codec for SealCodec {
            fn serialize(
                &self,
                value: &Value,
                _ctx: &mut SerCtx,
            ) -> Result<CodecSignal, SerializationError> {
                Ok(CodecSignal::Done(value.clone()))
            }
        }
        // The inner uppercase codec would fire on children, but the parent
        // was sealed.
        let options = SerdesOptions::empty()
            .codec(CodecSelector::Name("sealed".into()), Arc::new(SealCodec))
            .codec(
                CodecSelector::Path(vec![PathMatcher::from("sealed"), PathMatcher::Wildcard]),
                Arc::new(UppercaseCodec),
            );
        let out = serdes(options)
            .serialize(json!({ "sealed": { "x": "low" } }), SerdesTarget::Record)
            .unwrap();
        assert_eq!(out["sealed"]["x"], "low");
    }

    #[test]
    fn replace_reenters_the_pipeline() {
        struct UnwrapCodec;
        impl Codec for UnwrapCodec {
            fn serialize(
                &self,
                value: &Value,
                _ctx: &mut SerCtx,
            ) -> Result<CodecSignal, SerializationError> {
                match value.get("wrapped") {
                    Some(inner) => Ok(CodecSignal::Replace(inner.clone())),
                    None => Ok(CodecSignal::Nevermind),
                }
            }
        }
        let options = SerdesOptions::empty()
            .codec(CodecSelector::Name("v".into()), Arc::new(UnwrapCodec))
            .codec(CodecSelector::Name("v".into()), Arc::new(UppercaseCodec));
        let out = serdes(options)
            .serialize(
                json!({ "v": { "wrapped": { "wrapped": "deep" } } }),
                SerdesTarget::Record,
            )
            .unwrap();
        // Two replacements unwrapped the onion; the uppercase codec then
        // saw the string on the final pipeline run.
        assert_eq!(out["v"], "DEEP");
    }

    #[test]
    fn runaway_replace_chains_fail_instead_of_hanging() {
        struct ForeverCodec;
        impl Codec for ForeverCodec {
            fn serialize(
                &self,
                value: &Value,
                _ctx: &mut SerCtx,
            ) -> Result<CodecSignal, SerializationError> {
                Ok(CodecSignal::Replace(value.clone()))
            }
        }
        let options = SerdesOptions::empty()
            .codec(CodecSelector::Name("x".into()), Arc::new(ForeverCodec));
        let err = serdes(options)
            .serialize(json!({ "x": 1 }), SerdesTarget::Record)
            .unwrap_err();
        assert!(err.message.contains("replacement chain"));
        assert_eq!(err.path, vec!["x"]);
    }

    #[test]
    fn path_stack_discipline_holds() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        struct SpyCodec(Arc<Mutex<Vec<Vec<String>>>>);
        impl Codec for SpyCodec {
            fn serialize(
                &self,
                _value: &Value,
                ctx: &mut SerCtx,
            ) -> Result<CodecSignal, SerializationError> {
                self.0.lock().push(ctx::render_path(&ctx.path));
                Ok(CodecSignal::Nevermind)
            }
        }

        let options = SerdesOptions::empty().codec(
            CodecSelector::Guard(Arc::new(|_: &Value| true)),
            Arc::new(SpyCodec(Arc::clone(&seen))),
        );
        serdes(options)
            .serialize(json!({ "a": [10, { "b": 1 }] }), SerdesTarget::Record)
            .unwrap();

        let paths = seen.lock().clone();
        assert!(paths.contains(&vec![]));
        assert!(paths.contains(&vec!["a".to_string()]));
        assert!(paths.contains(&vec!["a".to_string(), "0".to_string()]));
        assert!(paths.contains(&vec!["a".to_string(), "1".to_string(), "b".to_string()]));
    }

    #[test]
    fn big_number_emission_requires_the_flag() {
        let huge: Value = serde_json::from_str("{\"n\": 123456789012345678901234567890}").unwrap();

        let disabled = serdes(SerdesOptions::empty());
        let err = disabled
            .serialize(huge.clone(), SerdesTarget::Record)
            .unwrap_err();
        assert!(err.message.contains("big numbers are disabled"));

        let enabled = serdes(SerdesOptions::empty().big_numbers(true));
        let out = enabled.serialize(huge, SerdesTarget::Record).unwrap();
        assert_eq!(out["n"].to_string(), "123456789012345678901234567890");
    }

    #[test]
    fn map_after_runs_on_the_completed_subtree() {
        struct WrapCodec;
        impl Codec for WrapCodec {
            fn deserialize(
                &self,
                _value: &Value,
                ctx: &mut DesCtx<'_>,
            ) -> Result<CodecSignal, SerializationError> {
                ctx.map_after(|subtree| Ok(json!({ "wrapped": subtree })));
                Ok(CodecSignal::Recurse(None))
            }
        }
        struct IncrementCodec;
        impl Codec for IncrementCodec {
            fn deserialize(
                &self,
                value: &Value,
                _ctx: &mut DesCtx<'_>,
            ) -> Result<CodecSignal, SerializationError> {
                match value.as_i64() {
                    Some(n) => Ok(CodecSignal::Done(json!(n + 1))),
                    None => Ok(CodecSignal::Nevermind),
                }
            }
        }
        let options = SerdesOptions::empty()
            .codec(CodecSelector::Name("obj".into()), Arc::new(WrapCodec))
            .codec(
                CodecSelector::Path(vec![PathMatcher::from("obj"), PathMatcher::Wildcard]),
                Arc::new(IncrementCodec),
            );
        let out = serdes(options)
            .deserialize(json!({ "obj": { "n": 1 } }), SerdesTarget::Record, None)
            .unwrap();
        // Children were processed first (n incremented), then the hook
        // wrapped the finished subtree.
        assert_eq!(out["obj"], json!({ "wrapped": { "n": 2 } }));
    }

    #[test]
    fn key_transformer_runs_after_codecs() {
        let options = SerdesOptions::empty()
            .codec(
                CodecSelector::Name("fullName".into()),
                Arc::new(UppercaseCodec),
            )
            .key_transformer(Arc::new(Camel2SnakeCase::new()));
        let out = serdes(options)
            .serialize(json!({ "fullName": "ada" }), SerdesTarget::Record)
            .unwrap();
        // The name codec saw the camelCase key; the wire got snake_case.
        assert_eq!(out, json!({ "full_name": "ADA" }));
    }

    #[test]
    fn options_concat_is_right_biased_and_lawful() {
        let id = SerdesOptions::empty();
        let a = SerdesOptions::empty().big_numbers(false);
        let b = SerdesOptions::empty().big_numbers(true);

        assert_eq!(a.clone().concat(b.clone()).big_numbers, Some(true));
        assert_eq!(b.clone().concat(a.clone()).big_numbers, Some(false));
        assert_eq!(a.clone().concat(id.clone()).big_numbers, a.big_numbers);
        assert_eq!(id.concat(b.clone()).big_numbers, b.big_numbers);
    }

    #[test]
    fn user_codecs_outrank_builtins() {
        struct KeepArrayCodec;
        impl Codec for KeepArrayCodec {
            fn serialize(
                &self,
                value: &Value,
                _ctx: &mut SerCtx,
            ) -> Result<CodecSignal, SerializationError> {
                Ok(CodecSignal::Done(value.clone()))
            }
        }
        // The built-in collection codec would compact $vector to $binary;
        // the user codec wins by running first.
        let options = SerdesOptions::empty().codec(
            CodecSelector::Name("$vector".into()),
            Arc::new(KeepArrayCodec),
        );
        let out = serdes(options)
            .serialize(json!({ "$vector": [1.0, 2.0] }), SerdesTarget::Record)
            .unwrap();
        assert_eq!(out["$vector"], json!([1.0, 2.0]));
    }
}
