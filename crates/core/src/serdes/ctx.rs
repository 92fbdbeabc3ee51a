//! Traversal contexts for the codec engine.

use astra_protocol::schema::{ColumnDesc, ProjectionSchema};
use serde_json::Value;

use crate::errors::SerializationError;

/// One step of a document path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    /// The segment as text (indices render as decimal).
    pub fn render(&self) -> String {
        match self {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(index) => index.to_string(),
        }
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Renders a path for error reporting.
pub(crate) fn render_path(path: &[PathSegment]) -> Vec<String> {
    path.iter().map(PathSegment::render).collect()
}

/// One step of a path *selector*; `Wildcard` matches any single segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatcher {
    Key(String),
    Index(usize),
    Wildcard,
}

impl PathMatcher {
    fn matches(&self, segment: &PathSegment) -> bool {
        match (self, segment) {
            (PathMatcher::Wildcard, _) => true,
            (PathMatcher::Key(a), PathSegment::Key(b)) => a == b,
            (PathMatcher::Index(a), PathSegment::Index(b)) => a == b,
            // A wildcard-free numeric matcher also accepts the same number
            // as a string key, so `['nums', 0]` matches both arrays and
            // numerically-keyed objects.
            (PathMatcher::Index(a), PathSegment::Key(b)) => a.to_string() == *b,
            (PathMatcher::Key(_), PathSegment::Index(_)) => false,
        }
    }
}

impl From<&str> for PathMatcher {
    fn from(key: &str) -> Self {
        if key == "*" {
            PathMatcher::Wildcard
        } else {
            PathMatcher::Key(key.to_string())
        }
    }
}

impl From<usize> for PathMatcher {
    fn from(index: usize) -> Self {
        PathMatcher::Index(index)
    }
}

/// True when the matcher list covers the full path, segment for segment.
pub(crate) fn path_matches(matchers: &[PathMatcher], path: &[PathSegment]) -> bool {
    matchers.len() == path.len()
        && matchers
            .iter()
            .zip(path)
            .all(|(matcher, segment)| matcher.matches(segment))
}

/// What part of a command a value is being transformed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdesTarget {
    /// A document or row body.
    Record,
    /// A filter expression.
    Filter,
    /// A sort expression.
    Sort,
    /// A projection expression.
    Projection,
    /// A server-returned inserted id.
    InsertedId,
}

/// Context carried through a serialize traversal.
#[derive(Debug)]
pub struct SerCtx {
    /// Path from the root to the node being visited (stack-disciplined).
    pub path: Vec<PathSegment>,
    /// What the value is for.
    pub target: SerdesTarget,
    /// Whether arbitrary-precision numbers may be emitted.
    pub big_numbers: bool,
}

/// A post-processing hook applied to a deserialized subtree after its
/// children complete.
pub type MapAfterFn = Box<dyn FnOnce(Value) -> Result<Value, SerializationError> + Send>;

/// Context carried through a deserialize traversal.
pub struct DesCtx<'a> {
    /// Path from the root to the node being visited (stack-disciplined).
    pub path: Vec<PathSegment>,
    /// What the value is for.
    pub target: SerdesTarget,
    /// Whether arbitrary-precision numbers surface as such.
    pub big_numbers: bool,
    /// The server-returned projection schema, when the response carried one.
    pub schema: Option<&'a ProjectionSchema>,
    pub(crate) map_after: Vec<MapAfterFn>,
}

impl<'a> DesCtx<'a> {
    pub(crate) fn new(
        target: SerdesTarget,
        big_numbers: bool,
        schema: Option<&'a ProjectionSchema>,
    ) -> Self {
        Self {
            path: Vec::new(),
            target,
            big_numbers,
            schema,
            map_after: Vec::new(),
        }
    }

    /// Registers a hook to run on this node's subtree once its children
    /// have been processed.
    pub fn map_after<F>(&mut self, f: F)
    where
        F: FnOnce(Value) -> Result<Value, SerializationError> + Send + 'static,
    {
        self.map_after.push(Box::new(f));
    }

    /// The schema descriptor for the column this node belongs to (the
    /// top-level key of the current path).
    pub fn column(&self) -> Option<&'a ColumnDesc> {
        let schema = self.schema?;
        match self.path.first() {
            Some(PathSegment::Key(column)) => schema.get(column),
            _ => None,
        }
    }

    /// True when visiting a column's own value (depth one).
    pub fn at_column_root(&self) -> bool {
        self.path.len() == 1
    }
}

impl std::fmt::Debug for DesCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesCtx")
            .field("path", &self.path)
            .field("target", &self.target)
            .field("pending_map_after", &self.map_after.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(path: &[&str]) -> Vec<PathSegment> {
        path.iter().map(|s| PathSegment::from(*s)).collect()
    }

    #[test]
    fn wildcard_matches_any_single_segment() {
        let matchers = vec![PathMatcher::from("cars"), PathMatcher::Wildcard];
        assert!(path_matches(&matchers, &seg(&["cars", "vw"])));
        assert!(path_matches(
            &matchers,
            &[PathSegment::from("cars"), PathSegment::Index(3)]
        ));
        assert!(!path_matches(&matchers, &seg(&["cars"])));
        assert!(!path_matches(&matchers, &seg(&["cars", "vw", "golf"])));
    }

    #[test]
    fn index_matcher_accepts_numeric_keys() {
        let matchers = vec![PathMatcher::from("nums"), PathMatcher::from(0usize)];
        assert!(path_matches(
            &matchers,
            &[PathSegment::from("nums"), PathSegment::Index(0)]
        ));
        assert!(path_matches(&matchers, &seg(&["nums", "0"])));
        assert!(!path_matches(
            &matchers,
            &[PathSegment::from("nums"), PathSegment::Index(1)]
        ));
    }

    #[test]
    fn empty_matcher_is_the_root() {
        assert!(path_matches(&[], &[]));
        assert!(!path_matches(&[], &seg(&["a"])));
    }

    #[test]
    fn column_lookup_uses_the_top_level_key() {
        use astra_protocol::schema::{ColumnDesc, ColumnKind};
        let schema: ProjectionSchema =
            [("age".to_string(), ColumnDesc::of(ColumnKind::Int))].into();

        let mut ctx = DesCtx::new(SerdesTarget::Record, false, Some(&schema));
        assert!(ctx.column().is_none());

        ctx.path.push(PathSegment::from("age"));
        assert_eq!(ctx.column().map(|c| c.kind), Some(ColumnKind::Int));
        assert!(ctx.at_column_root());

        ctx.path.push(PathSegment::Index(0));
        assert_eq!(ctx.column().map(|c| c.kind), Some(ColumnKind::Int));
        assert!(!ctx.at_column_root());
    }
}
