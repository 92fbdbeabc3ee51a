//! Codecs, their selectors, and the ordered registry.

use std::sync::Arc;

use astra_protocol::schema::ColumnKind;
use serde_json::Value;

use crate::errors::SerializationError;

use super::ctx::{DesCtx, PathMatcher, SerCtx, path_matches};

/// What a codec tells the walker to do with the current node.
#[derive(Debug, Clone)]
pub enum CodecSignal {
    /// This codec does not apply here; try the next matching codec.
    Nevermind,
    /// Optionally update the value, then try the next matching codec.
    Continue(Option<Value>),
    /// Substitute a new value and re-run the codec pipeline on it.
    Replace(Value),
    /// Accept (optionally updating) and recurse into children. The default
    /// outcome when no codec speaks up.
    Recurse(Option<Value>),
    /// Accept as the final value; do not recurse.
    Done(Value),
}

/// A transformation rule invoked while walking a value tree.
///
/// Both hooks default to [`CodecSignal::Nevermind`], so a codec only
/// implements the direction(s) it cares about.
pub trait Codec: Send + Sync {
    /// Invoked on matching nodes during serialization.
    fn serialize(
        &self,
        value: &Value,
        ctx: &mut SerCtx,
    ) -> Result<CodecSignal, SerializationError> {
        let _ = (value, ctx);
        Ok(CodecSignal::Nevermind)
    }

    /// Invoked on matching nodes during deserialization.
    fn deserialize(
        &self,
        value: &Value,
        ctx: &mut DesCtx<'_>,
    ) -> Result<CodecSignal, SerializationError> {
        let _ = (value, ctx);
        Ok(CodecSignal::Nevermind)
    }
}

/// A serialize-side predicate over the value at a node.
pub type ValueGuard = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Chooses which nodes a codec is invoked on.
#[derive(Clone)]
pub enum CodecSelector {
    /// Nodes whose full path matches (``*`` segments match any one
    /// segment; the empty path is the root).
    Path(Vec<PathMatcher>),
    /// Top-level fields with this name (shorthand for a one-segment path).
    Name(String),
    /// Deserialize only: columns whose schema-declared type has this kind.
    Type(ColumnKind),
    /// Nodes whose value satisfies the guard.
    Guard(ValueGuard),
}

impl CodecSelector {
    pub(crate) fn matches_ser(&self, value: &Value, ctx: &SerCtx) -> bool {
        match self {
            CodecSelector::Path(matchers) => path_matches(matchers, &ctx.path),
            CodecSelector::Name(name) => {
                matches!(ctx.path.as_slice(), [super::ctx::PathSegment::Key(key)] if key == name)
            }
            CodecSelector::Type(_) => false,
            CodecSelector::Guard(guard) => guard(value),
        }
    }

    pub(crate) fn matches_des(&self, value: &Value, ctx: &DesCtx<'_>) -> bool {
        match self {
            CodecSelector::Path(matchers) => path_matches(matchers, &ctx.path),
            CodecSelector::Name(name) => {
                matches!(ctx.path.as_slice(), [super::ctx::PathSegment::Key(key)] if key == name)
            }
            CodecSelector::Type(kind) => {
                ctx.at_column_root() && ctx.column().map(|c| c.kind) == Some(*kind)
            }
            CodecSelector::Guard(guard) => guard(value),
        }
    }
}

impl std::fmt::Debug for CodecSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecSelector::Path(matchers) => f.debug_tuple("Path").field(matchers).finish(),
            CodecSelector::Name(name) => f.debug_tuple("Name").field(name).finish(),
            CodecSelector::Type(kind) => f.debug_tuple("Type").field(kind).finish(),
            CodecSelector::Guard(_) => f.write_str("Guard(..)"),
        }
    }
}

/// An ordered list of `(selector, codec)` entries.
///
/// The walker tries matching entries in registration order and exits early
/// on [`CodecSignal::Done`] / [`CodecSignal::Replace`]; entries registered
/// first therefore take precedence.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    entries: Vec<(CodecSelector, Arc<dyn Codec>)>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a codec under a selector.
    pub fn push(&mut self, selector: CodecSelector, codec: Arc<dyn Codec>) {
        self.entries.push((selector, codec));
    }

    /// Registers a codec for an exact path.
    pub fn for_path<I>(mut self, path: I, codec: Arc<dyn Codec>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathMatcher>,
    {
        self.push(
            CodecSelector::Path(path.into_iter().map(Into::into).collect()),
            codec,
        );
        self
    }

    /// Registers a codec for a top-level field name.
    pub fn for_name(mut self, name: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        self.push(CodecSelector::Name(name.into()), codec);
        self
    }

    /// Registers a deserialize codec for a server column type.
    pub fn for_type(mut self, kind: ColumnKind, codec: Arc<dyn Codec>) -> Self {
        self.push(CodecSelector::Type(kind), codec);
        self
    }

    /// Registers a serialize codec keyed by a value guard.
    pub fn for_guard<F>(mut self, guard: F, codec: Arc<dyn Codec>) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.push(CodecSelector::Guard(Arc::new(guard)), codec);
        self
    }

    /// Appends all of `other`'s entries after this registry's.
    pub fn extend(&mut self, other: &CodecRegistry) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no codecs are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &(CodecSelector, Arc<dyn Codec>)> {
        self.entries.iter()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
